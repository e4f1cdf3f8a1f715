use std::time::Duration;

use async_trait::async_trait;

use crate::proxy::rotator::BrowserProxy;
use crate::scraper::config::{AntiBotSettings, ScraperConfig};
use crate::scraper::error::ScrapeError;

/// Options used to open a browser session for one run
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub anti_bot: AntiBotSettings,

    /// Host used for cookies that do not name a domain
    pub cookie_domain: Option<String>,

    /// Proxy for engines that configure it per context
    pub proxy: Option<BrowserProxy>,

    /// Extra launch arguments (e.g. `--proxy-server=`)
    pub launch_args: Vec<String>,

    pub navigation_timeout: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &ScraperConfig) -> Self {
        let cookie_domain = url::Url::parse(&config.hotel_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()));

        Self {
            anti_bot: config.anti_bot.clone(),
            cookie_domain,
            proxy: None,
            launch_args: Vec::new(),
            navigation_timeout: Duration::from_millis(config.page.navigation_timeout_ms),
        }
    }
}

/// A single open page
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the load event
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Wait until network activity settles
    async fn wait_for_idle(&self, timeout: Duration) -> Result<(), ScrapeError>;

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), ScrapeError>;

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<(), ScrapeError>;

    async fn select_option(&self, selector: &str, value: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Wait until an element matching `selector` is displayed
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// PNG screenshot of the viewport, or the full page
    async fn screenshot_png(&self, full_page: bool) -> Result<Vec<u8>, ScrapeError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScrapeError>;

    /// Current page markup
    async fn content(&self) -> Result<String, ScrapeError>;

    async fn close(self: Box<Self>) -> Result<(), ScrapeError>;
}

/// A browser that hands out pages
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, ScrapeError>;

    async fn close(&self) -> Result<(), ScrapeError>;
}

/// Opens browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &SessionOptions) -> Result<Box<dyn BrowserHandle>, ScrapeError>;
}
