//! Error types for E2E testing

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {attempts} attempts: {last}")]
    ServerHealthCheck { attempts: usize, last: String },

    #[error("Server exited before becoming ready: {0}")]
    ServerExited(String),

    #[error("Address {0} is already accepting connections; refusing to start a second responder")]
    PortInUse(SocketAddr),

    #[error("WebDriver failed to start: {0}")]
    DriverStartup(String),

    #[error("Failed to open browser session: {0}")]
    Session(String),

    #[error("WebDriver command failed: {0}")]
    WebDriver(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Assertion failed on {what}: expected {expected:?}, got {actual:?}")]
    AssertionFailed {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether this error means a resource never reached a ready state,
    /// as opposed to the page under test misbehaving.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            E2eError::ServerStartup(_)
                | E2eError::ServerHealthCheck { .. }
                | E2eError::ServerExited(_)
                | E2eError::PortInUse(_)
                | E2eError::DriverStartup(_)
                | E2eError::Session(_)
        )
    }
}

impl From<fantoccini::error::NewSessionError> for E2eError {
    fn from(e: fantoccini::error::NewSessionError) -> Self {
        E2eError::Session(e.to_string())
    }
}

impl From<fantoccini::error::CmdError> for E2eError {
    fn from(e: fantoccini::error::CmdError) -> Self {
        E2eError::WebDriver(e.to_string())
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
