//! WebDriver endpoint management
//!
//! Local runs spawn a chromedriver process on a free port. CI runs point at
//! a driver that the job already started on `127.0.0.1:9515`; the `CI`
//! environment flag picks between the two.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::retry::Backoff;
use crate::server::{find_free_port, forward_output, terminate, wait_for_child, NotReady};

/// Driver endpoint used in CI mode
pub const CI_DRIVER_URL: &str = "http://127.0.0.1:9515";

/// Environment flag selecting CI mode
pub const CI_ENV: &str = "CI";

/// Where the remote automation endpoint comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverMode {
    /// Spawn a driver binary; port 0 picks a free one
    Local { binary: PathBuf, port: u16 },
    /// Use an endpoint somebody else started
    Remote { url: String },
}

/// Configuration for the WebDriver endpoint
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub mode: DriverMode,

    /// How long a local driver may take to start listening
    pub startup_timeout: Duration,

    /// X display handed to a local driver (e.g. an Xvfb `:99`)
    pub display: Option<String>,
}

impl DriverConfig {
    /// Pick the driver mode from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mode = if lookup(CI_ENV).as_deref().map(is_truthy).unwrap_or(false) {
            DriverMode::Remote {
                url: CI_DRIVER_URL.to_string(),
            }
        } else {
            DriverMode::Local {
                binary: lookup("CHROMEDRIVER_PATH")
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("chromedriver")),
                port: 0,
            }
        };

        Self {
            mode,
            display: lookup("DISPLAY").filter(|v| !v.trim().is_empty()),
            ..Default::default()
        }
    }

    /// Apply command-line overrides.
    ///
    /// An explicit endpoint always wins. A chromedriver path only applies to
    /// local mode; in CI mode it is ignored with a warning.
    pub fn with_overrides(mut self, driver_url: Option<String>, chromedriver: Option<PathBuf>) -> Self {
        if let Some(url) = driver_url {
            self.mode = DriverMode::Remote { url };
            return self;
        }

        if let Some(path) = chromedriver {
            match &mut self.mode {
                DriverMode::Local { binary, .. } => *binary = path,
                DriverMode::Remote { url } => warn!(
                    "Ignoring chromedriver {}: {} is set, using existing endpoint {}",
                    path.display(),
                    CI_ENV,
                    url
                ),
            }
        }

        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            mode: DriverMode::Local {
                binary: PathBuf::from("chromedriver"),
                port: 0,
            },
            startup_timeout: Duration::from_secs(10),
            display: None,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// A usable WebDriver endpoint, plus the process behind it when we own one
pub struct DriverHandle {
    url: String,
    child: Option<Child>,
}

impl DriverHandle {
    /// Bring up (or adopt) the driver endpoint
    pub async fn start(config: DriverConfig) -> E2eResult<Self> {
        match config.mode {
            DriverMode::Remote { url } => {
                info!("Using existing WebDriver endpoint {}", url);
                Ok(Self { url, child: None })
            }
            DriverMode::Local { binary, port } => {
                let port = if port == 0 { find_free_port()? } else { port };
                let addr = SocketAddr::from(([127, 0, 0, 1], port));

                info!("Spawning {} on port {}", binary.display(), port);

                let mut cmd = Command::new(&binary);
                cmd.arg(format!("--port={}", port))
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true);
                if let Some(display) = &config.display {
                    cmd.env("DISPLAY", display);
                }

                let mut child = cmd.spawn().map_err(|e| {
                    E2eError::DriverStartup(format!("Failed to spawn {}: {}", binary.display(), e))
                })?;
                forward_output(&mut child, "chromedriver");

                let ready = wait_for_child(
                    &mut child,
                    addr,
                    Backoff::fixed(Duration::from_millis(100), config.startup_timeout),
                )
                .await;

                let mut handle = Self {
                    url: format!("http://{}", addr),
                    child: Some(child),
                };

                if let Err(e) = ready {
                    if let Err(stop_err) = handle.stop().await {
                        warn!("Failed to stop driver after startup failure: {}", stop_err);
                    }
                    let reason = match e {
                        NotReady::Exited(status) => format!(
                            "{} exited before listening on {}: {}",
                            binary.display(),
                            addr,
                            status
                        ),
                        NotReady::TimedOut { attempts, last } => format!(
                            "{} never listened on {} ({} attempts): {}",
                            binary.display(),
                            addr,
                            attempts,
                            last
                        ),
                    };
                    return Err(E2eError::DriverStartup(reason));
                }

                info!("WebDriver ready at {}", handle.url);
                Ok(handle)
            }
        }
    }

    /// Endpoint URL for session creation
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether we own a driver process that has not been stopped yet
    pub fn owns_process(&self) -> bool {
        self.child.is_some()
    }

    /// Stop a local driver. No-op for remote endpoints and on repeat calls.
    pub async fn stop(&mut self) -> E2eResult<()> {
        match self.child.take() {
            Some(mut child) => terminate(&mut child, "chromedriver").await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn config_with(vars: &[(&str, &str)]) -> DriverConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DriverConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test_case("1" ; "one")]
    #[test_case("true" ; "lowercase true")]
    #[test_case("TRUE" ; "uppercase true")]
    #[test_case("yes" ; "yes")]
    fn test_ci_flag_selects_remote(value: &str) {
        let cfg = config_with(&[(CI_ENV, value)]);
        assert_eq!(
            cfg.mode,
            DriverMode::Remote {
                url: CI_DRIVER_URL.to_string()
            }
        );
    }

    #[test_case("" ; "empty")]
    #[test_case("0" ; "zero")]
    #[test_case("false" ; "false")]
    fn test_non_ci_spawns_locally(value: &str) {
        let cfg = config_with(&[(CI_ENV, value)]);
        assert!(matches!(cfg.mode, DriverMode::Local { .. }));
    }

    #[test]
    fn test_local_binary_from_env() {
        let cfg = config_with(&[("CHROMEDRIVER_PATH", "/opt/bin/chromedriver"), ("DISPLAY", ":99")]);
        assert_eq!(
            cfg.mode,
            DriverMode::Local {
                binary: PathBuf::from("/opt/bin/chromedriver"),
                port: 0
            }
        );
        assert_eq!(cfg.display.as_deref(), Some(":99"));
    }

    #[test]
    fn test_driver_url_override_wins() {
        let cfg = config_with(&[]).with_overrides(
            Some("http://10.0.0.5:4444".into()),
            Some(PathBuf::from("/opt/bin/chromedriver")),
        );
        assert_eq!(
            cfg.mode,
            DriverMode::Remote {
                url: "http://10.0.0.5:4444".into()
            }
        );
    }

    #[test]
    fn test_chromedriver_override_applies_locally() {
        let cfg = config_with(&[]).with_overrides(None, Some(PathBuf::from("/opt/bin/chromedriver")));
        assert_eq!(
            cfg.mode,
            DriverMode::Local {
                binary: PathBuf::from("/opt/bin/chromedriver"),
                port: 0
            }
        );
    }

    #[test]
    fn test_chromedriver_override_ignored_in_ci() {
        let cfg = config_with(&[(CI_ENV, "true")])
            .with_overrides(None, Some(PathBuf::from("/opt/bin/chromedriver")));
        assert_eq!(
            cfg.mode,
            DriverMode::Remote {
                url: CI_DRIVER_URL.to_string()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_driver_that_exits_fails_fast_with_status() {
        let started = std::time::Instant::now();
        let err = DriverHandle::start(DriverConfig {
            mode: DriverMode::Local {
                binary: PathBuf::from("/bin/false"),
                port: 0,
            },
            startup_timeout: Duration::from_secs(10),
            ..Default::default()
        })
        .await
        .err()
        .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(err.is_setup());
        let msg = err.to_string();
        assert!(msg.contains("exited before listening"), "{}", msg);
        assert!(msg.contains("exit code 1"), "{}", msg);
    }

    #[tokio::test]
    async fn test_remote_mode_has_no_process() {
        let mut handle = DriverHandle::start(config_with(&[(CI_ENV, "1")])).await.unwrap();
        assert_eq!(handle.url(), CI_DRIVER_URL);
        assert!(!handle.owns_process());
        handle.stop().await.unwrap();
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_driver_binary_is_setup_failure() {
        let err = DriverHandle::start(DriverConfig {
            mode: DriverMode::Local {
                binary: PathBuf::from("/nonexistent/chromedriver"),
                port: 0,
            },
            ..Default::default()
        })
        .await
        .err()
        .unwrap();

        assert!(matches!(err, E2eError::DriverStartup(_)));
        assert!(err.is_setup());
    }
}
