//! Main test runner that orchestrates driver, responder, and browser session

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::browser::{BrowserOptions, BrowserSession, SessionOpener, WebDriverOpener};
use crate::driver::{DriverConfig, DriverHandle};
use crate::error::{E2eError, E2eResult};
use crate::scenario::{self, Scenario};
use crate::server::{ServerConfig, ServerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A resource never reached a ready state
    Setup,
    /// The page did not match expectations
    Assertion,
    /// Only cleanup went wrong
    Teardown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub cause: String,
}

impl Failure {
    fn setup(e: E2eError) -> Self {
        Self {
            kind: FailureKind::Setup,
            cause: e.to_string(),
        }
    }

    fn from_scenario(e: E2eError) -> Self {
        let kind = if e.is_setup() {
            FailureKind::Setup
        } else {
            FailureKind::Assertion
        };
        Self {
            kind,
            cause: e.to_string(),
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub failure: Option<Failure>,
    pub teardown_errors: Vec<String>,
}

impl RunReport {
    fn new(
        name: &str,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        outcome: Result<(), Failure>,
        teardown_errors: Vec<String>,
    ) -> Self {
        // Teardown problems only become the reported cause when nothing else failed.
        let failure = match outcome {
            Err(f) => Some(f),
            Ok(()) if !teardown_errors.is_empty() => Some(Failure {
                kind: FailureKind::Teardown,
                cause: teardown_errors.join("; "),
            }),
            Ok(()) => None,
        };

        Self {
            name: name.to_string(),
            started_at,
            duration_ms,
            status: if failure.is_none() {
                RunStatus::Pass
            } else {
                RunStatus::Fail
            },
            failure,
            teardown_errors,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == RunStatus::Pass
    }

    /// 0 on pass, 2 on setup failure, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match &self.failure {
            None => 0,
            Some(f) if f.kind == FailureKind::Setup => 2,
            Some(_) => 1,
        }
    }
}

/// Everything a run acquires. Each slot is released at most once.
#[derive(Default)]
pub struct Resources {
    pub driver: Option<DriverHandle>,
    pub responder: Option<ServerHandle>,
    pub session: Option<Box<dyn BrowserSession>>,
}

impl Resources {
    /// Release the session, then the driver, then the responder.
    ///
    /// Every step runs even if an earlier one fails; the errors are returned.
    pub async fn teardown(&mut self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Failed to close browser session: {}", e);
                errors.push(format!("session: {}", e));
            }
        }

        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.stop().await {
                warn!("Failed to stop WebDriver: {}", e);
                errors.push(format!("driver: {}", e));
            }
        }

        if let Some(mut responder) = self.responder.take() {
            if let Err(e) = responder.stop().await {
                warn!("Failed to stop responder: {}", e);
                errors.push(format!("responder: {}", e));
            }
        }

        errors
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub server: ServerConfig,
    pub driver: DriverConfig,
    pub browser: BrowserOptions,
    pub scenario: Scenario,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            driver: DriverConfig::from_env(),
            browser: BrowserOptions::default(),
            scenario: Scenario::default(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,
    opener: Arc<dyn SessionOpener>,
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            opener: Arc::new(WebDriverOpener),
        }
    }

    /// Open browser sessions through `opener` instead of fantoccini
    pub fn with_opener(mut self, opener: impl SessionOpener + 'static) -> Self {
        self.opener = Arc::new(opener);
        self
    }

    /// Run the scenario once, tearing everything down regardless of outcome
    pub async fn run(&self) -> RunReport {
        let name = self.config.scenario.name.clone();
        let started_at = Utc::now();
        let start = Instant::now();
        info!("Running scenario '{}'", name);

        let mut resources = Resources::default();
        let outcome = self.run_with(&mut resources).await;
        let teardown_errors = resources.teardown().await;

        let report = RunReport::new(
            &name,
            started_at,
            start.elapsed().as_millis() as u64,
            outcome,
            teardown_errors,
        );

        match &report.failure {
            None => info!("✓ {} ({} ms)", report.name, report.duration_ms),
            Some(f) => error!("✗ {} - {:?}: {}", report.name, f.kind, f.cause),
        }

        report
    }

    /// Acquire driver, responder and session into `resources`, then run the
    /// scenario. Stops at the first failure; cleanup is the caller's job.
    async fn run_with(&self, resources: &mut Resources) -> Result<(), Failure> {
        let driver = DriverHandle::start(self.config.driver.clone())
            .await
            .map_err(Failure::setup)?;
        let endpoint = driver.url().to_string();
        resources.driver = Some(driver);

        let responder = ServerHandle::spawn(self.config.server.clone())
            .await
            .map_err(Failure::setup)?;
        let base_url = responder.base_url().to_string();
        resources.responder = Some(responder);

        let session = self
            .opener
            .open(&endpoint, &self.config.browser)
            .await
            .map_err(Failure::setup)?;
        let session = resources.session.insert(session);

        scenario::execute(session.as_ref(), &self.config.scenario, &base_url)
            .await
            .map_err(Failure::from_scenario)
    }

    /// Write the run report to `<output_dir>/report.json`
    pub fn write_report(&self, report: &RunReport) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("report.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Report written to: {}", path.display());
        Ok(path)
    }

    /// Write the report and return the process exit code.
    ///
    /// A report that cannot be written is logged; the exit code always
    /// reflects the run itself.
    pub fn finish(&self, report: &RunReport) -> i32 {
        if let Err(e) = self.write_report(report) {
            error!("Failed to write report: {}", e);
        }
        report.exit_code()
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}
