//! Remote browser sessions over WebDriver

use async_trait::async_trait;
use fantoccini::wd::Capabilities;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};

/// The subset of browser control a scenario needs
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate the page to `url`
    async fn goto(&self, url: &str) -> E2eResult<()>;

    /// URL the browser reports for the current page
    async fn current_url(&self) -> E2eResult<String>;

    /// Rendered text of the first element matching a CSS selector
    async fn text(&self, selector: &str) -> E2eResult<String>;

    /// Release the session. Repeat calls must be no-ops.
    async fn close(&mut self) -> E2eResult<()>;
}

/// Creates sessions on a WebDriver endpoint
#[async_trait]
pub trait SessionOpener: Send + Sync {
    async fn open(
        &self,
        endpoint: &str,
        options: &BrowserOptions,
    ) -> E2eResult<Box<dyn BrowserSession>>;
}

/// Browser launch options
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Appended to the Chrome command line
    pub extra_args: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            extra_args: Vec::new(),
        }
    }
}

/// Capability set for session creation.
///
/// GPU and sandbox are always disabled; containers tend to have neither.
pub fn capabilities(options: &BrowserOptions) -> Capabilities {
    let mut args = vec!["--disable-gpu".to_string(), "--no-sandbox".to_string()];
    if options.headless {
        args.push("--headless".to_string());
    }
    args.extend(options.extra_args.iter().cloned());

    let mut caps = Capabilities::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
    caps
}

/// A session on a WebDriver endpoint
pub struct WebDriverSession {
    client: Option<Client>,
}

impl WebDriverSession {
    /// Create a new session on `endpoint`
    pub async fn open(endpoint: &str, options: &BrowserOptions) -> E2eResult<Self> {
        info!("Opening browser session on {}", endpoint);

        let client = ClientBuilder::native()
            .capabilities(capabilities(options))
            .connect(endpoint)
            .await?;

        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&self) -> E2eResult<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| E2eError::WebDriver("session already closed".into()))
    }
}

/// Opens [`WebDriverSession`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct WebDriverOpener;

#[async_trait]
impl SessionOpener for WebDriverOpener {
    async fn open(
        &self,
        endpoint: &str,
        options: &BrowserOptions,
    ) -> E2eResult<Box<dyn BrowserSession>> {
        Ok(Box::new(WebDriverSession::open(endpoint, options).await?))
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        debug!("goto {}", url);
        self.client()?.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        Ok(self.client()?.current_url().await?.to_string())
    }

    async fn text(&self, selector: &str) -> E2eResult<String> {
        let element = self.client()?.find(Locator::Css(selector)).await?;
        Ok(element.text().await?)
    }

    async fn close(&mut self) -> E2eResult<()> {
        if let Some(client) = self.client.take() {
            info!("Closing browser session");
            client.close().await?;
        }
        Ok(())
    }
}
