//! Acceptance scenario: one navigation followed by URL and text checks

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::browser::BrowserSession;
use crate::error::{E2eError, E2eResult};
use crate::retry::{retry, Backoff};

/// What to load and what the page must look like afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Name used in logs and the run report
    #[serde(default = "default_name")]
    pub name: String,

    /// Path relative to the responder's base URL
    #[serde(default = "default_path")]
    pub path: String,

    /// Element whose text is checked
    #[serde(default = "default_selector")]
    pub selector: String,

    /// URL the browser must report; defaults to the navigation target
    #[serde(default)]
    pub expect_url: Option<String>,

    /// Exact text of `selector`; surrounding whitespace is ignored on both sides
    #[serde(default = "default_text")]
    pub expect_text: String,

    #[serde(default)]
    pub wait: WaitConfig,
}

fn default_name() -> String {
    "hello-world".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_selector() -> String {
    "html".to_string()
}

fn default_text() -> String {
    "Hello World".to_string()
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: default_name(),
            path: default_path(),
            selector: default_selector(),
            expect_url: None,
            expect_text: default_text(),
            wait: WaitConfig::default(),
        }
    }
}

/// Bounded wait for page assertions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
        }
    }
}

impl WaitConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::exponential(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            Duration::from_millis(self.timeout_ms),
        )
    }
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        if !scenario.path.starts_with('/') {
            return Err(E2eError::ScenarioParse(format!(
                "path must start with '/': {}",
                scenario.path
            )));
        }
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn load(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Absolute URL to navigate to
    pub fn target_url(&self, base_url: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    /// The URL the browser has to report once the page is loaded
    pub fn expected_url(&self, base_url: &str) -> String {
        self.expect_url
            .clone()
            .unwrap_or_else(|| self.target_url(base_url))
    }
}

/// Drive `session` through the scenario.
///
/// Navigation happens exactly once; the checks are retried within the
/// scenario's wait budget and the last mismatch is reported.
pub async fn execute(
    session: &dyn BrowserSession,
    scenario: &Scenario,
    base_url: &str,
) -> E2eResult<()> {
    let target = scenario.target_url(base_url);
    let expected_url = scenario.expected_url(base_url);

    info!("[{}] navigating to {}", scenario.name, target);
    session.goto(&target).await?;

    let backoff = scenario.wait.backoff();

    retry(backoff, || async {
        let actual = session.current_url().await?;
        if actual == expected_url {
            Ok(())
        } else {
            Err(E2eError::AssertionFailed {
                what: "current URL".to_string(),
                expected: expected_url.clone(),
                actual,
            })
        }
    })
    .await
    .map_err(|e| e.last)?;
    debug!("[{}] URL is {}", scenario.name, expected_url);

    retry(backoff, || async {
        let actual = session.text(&scenario.selector).await?;
        if actual.trim() == scenario.expect_text.trim() {
            Ok(())
        } else {
            Err(E2eError::AssertionFailed {
                what: format!("text of {}", scenario.selector),
                expected: scenario.expect_text.clone(),
                actual,
            })
        }
    })
    .await
    .map_err(|e| e.last)?;

    info!("[{}] page text matches {:?}", scenario.name, scenario.expect_text);
    Ok(())
}
