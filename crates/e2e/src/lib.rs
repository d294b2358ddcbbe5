//! Hello World acceptance harness
//!
//! This crate runs a headless browser acceptance test against the
//! `hello-web` responder:
//! - Brings up a WebDriver endpoint (spawned chromedriver, or the CI one)
//! - Spawns the responder as a subprocess and probes its port until ready
//! - Opens a remote browser session and loads the page
//! - Checks the reported URL and page text with a bounded wait
//! - Tears everything down whatever happened
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TestRunner::run() -> RunReport             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  setup     DriverHandle::start   -> endpoint URL            │
//! │            ServerHandle::spawn   -> base URL (probed)       │
//! │            SessionOpener::open   -> browser session         │
//! │  scenario  goto(target)                                     │
//! │            retry: current_url == expected                   │
//! │            retry: text(selector) == expect_text             │
//! │  teardown  session.close -> driver.stop -> responder.stop   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod driver;
pub mod error;
pub mod retry;
pub mod runner;
pub mod scenario;
pub mod server;

pub use browser::{BrowserSession, SessionOpener, WebDriverSession};
pub use error::{E2eError, E2eResult};
pub use runner::{RunReport, TestRunner};
pub use scenario::Scenario;
