//! Responder configuration

use std::net::{Ipv4Addr, SocketAddr};

/// Default listen address for the responder.
pub const DEFAULT_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    8080,
);

/// Responder configuration
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Address to bind the listener on
    pub addr: SocketAddr,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self { addr: DEFAULT_ADDR }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addr() {
        let cfg = ResponderConfig::default();
        assert_eq!(cfg.addr.to_string(), "127.0.0.1:8080");
    }
}
