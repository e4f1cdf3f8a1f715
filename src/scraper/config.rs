use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::browser::steps::BrowserStep;
use crate::extract::rooms::validate_selectors;
use crate::proxy::rotator::ProxyDescriptor;
use crate::scraper::error::ScrapeError;
use crate::scraper::types::RoomType;

pub const DEFAULT_STRATEGY: &str = "browser";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Configuration for one scrape run
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScraperConfig {
    /// Listing page to monitor
    pub hotel_url: String,

    /// Name of the fetch strategy to use
    pub strategy: String,

    /// Number of check-in dates to scrape, starting at the context's start date
    pub days_forward: u32,

    /// Room types of interest (must not be empty)
    pub room_types: Vec<RoomType>,

    /// Scripted interactions replayed after navigation
    pub steps: Vec<BrowserStep>,

    /// Proxy descriptors, rotated by request count
    pub proxies: Vec<ProxyDescriptor>,

    pub retry: RetrySettings,

    /// Path into embedded page JSON holding the price
    pub embedded_path: Option<String>,

    pub change_detection: ChangeDetectionSettings,
    pub screenshot: ScreenshotSettings,
    pub selectors: SelectorSettings,
    pub anti_bot: AntiBotSettings,
    pub rate_limit: RateLimitSettings,
    pub page: PageSettings,

    /// Currency assumed when the page shows no recognizable symbol
    pub base_currency: String,

    /// Attach extraction diagnostics to results
    pub debug_extraction: bool,
}

/// Retry settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub retry_on_status: Vec<u16>,
}

/// Change detection settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ChangeDetectionSettings {
    pub enabled: bool,

    /// Minimum absolute percentage move flagged as significant
    pub minimum_change_percent: f64,

    pub notify_on_increase: bool,
    pub notify_on_decrease: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    #[default]
    Png,
}

/// Screenshot capture settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScreenshotSettings {
    pub enabled: bool,
    pub full_page: bool,

    /// Drop screenshots of results whose price was compared and did not
    /// change significantly. First observations keep theirs.
    pub only_on_change: bool,

    pub format: ScreenshotFormat,
}

/// CSS selectors used for room-block extraction
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SelectorSettings {
    pub room_blocks: Vec<String>,
    pub price: Vec<String>,
    pub room_name: Vec<String>,

    /// Elements whose presence means the date is sold out
    pub availability: Vec<String>,
}

/// Browser viewport size
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Cookie injected into the browser session
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,

    /// Defaults to the target host
    #[serde(default)]
    pub domain: Option<String>,
}

/// Anti-bot settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AntiBotSettings {
    pub user_agent: String,
    pub viewport: Viewport,
    pub locale: String,
    pub timezone: String,
    pub headers: HashMap<String, String>,
    pub cookies: Vec<CookieSpec>,

    /// Script evaluated on the page right before extraction
    pub pre_extraction_script: Option<String>,

    pub headless: bool,
}

/// Rate limiting settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Delay between dates in milliseconds
    pub delay_between_requests_ms: u64,

    /// Upper bound on concurrent runs issued by a batch caller
    pub max_concurrent: usize,
}

/// Page load timing
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PageSettings {
    pub navigation_timeout_ms: u64,
    pub idle_timeout_ms: u64,

    /// Pause after navigation and steps before reading the page
    pub settle_delay_ms: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            hotel_url: String::new(),
            strategy: DEFAULT_STRATEGY.to_string(),
            days_forward: 60,
            room_types: vec![RoomType::RoomOnly, RoomType::WithBreakfast],
            steps: Vec::new(),
            proxies: Vec::new(),
            retry: RetrySettings::default(),
            embedded_path: None,
            change_detection: ChangeDetectionSettings::default(),
            screenshot: ScreenshotSettings::default(),
            selectors: SelectorSettings::default(),
            anti_bot: AntiBotSettings::default(),
            rate_limit: RateLimitSettings::default(),
            page: PageSettings::default(),
            base_currency: "ILS".to_string(),
            debug_extraction: false,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetrySettings {
    /// Longer backoff for important runs
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 2000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.5,
            ..Self::default()
        }
    }
}

impl Default for ChangeDetectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            minimum_change_percent: 5.0,
            notify_on_increase: true,
            notify_on_decrease: true,
        }
    }
}

impl Default for ScreenshotSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            full_page: false,
            only_on_change: true,
            format: ScreenshotFormat::Png,
        }
    }
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            room_blocks: vec![
                "[data-testid=\"property-card-container\"]".to_string(),
                ".hprt-table-row".to_string(),
                "[data-block-id]".to_string(),
                ".room-block".to_string(),
            ],
            price: vec![
                "[data-testid=\"price-and-discounted-price\"]".to_string(),
                ".prco-valign-middle-helper".to_string(),
                ".bui-price-display__value".to_string(),
                ".prco-text-nowrap-helper".to_string(),
                "span[aria-hidden=\"true\"]".to_string(),
            ],
            room_name: vec![
                ".hprt-roomtype-icon-link".to_string(),
                "[data-testid=\"title\"]".to_string(),
                ".room-name".to_string(),
            ],
            availability: Vec::new(),
        }
    }
}

impl Default for AntiBotSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: Viewport {
                width: 1920,
                height: 1080,
            },
            locale: "he-IL".to_string(),
            timezone: "Asia/Jerusalem".to_string(),
            headers: HashMap::new(),
            cookies: Vec::new(),
            pre_extraction_script: None,
            headless: true,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            delay_between_requests_ms: 1000,
            max_concurrent: 1,
        }
    }
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            idle_timeout_ms: 10_000,
            settle_delay_ms: 2000,
        }
    }
}

impl ScraperConfig {
    /// Default configuration for the given listing page
    pub fn new(hotel_url: impl Into<String>) -> Self {
        Self {
            hotel_url: hotel_url.into(),
            ..Self::default()
        }
    }

    pub fn with_days_forward(mut self, days: u32) -> Self {
        self.days_forward = days;
        self
    }

    pub fn with_room_types(mut self, room_types: Vec<RoomType>) -> Self {
        self.room_types = room_types;
        self
    }

    pub fn with_steps(mut self, steps: Vec<BrowserStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyDescriptor) -> Self {
        self.proxies.push(proxy);
        self
    }

    pub fn with_embedded_path(mut self, path: impl Into<String>) -> Self {
        self.embedded_path = Some(path.into());
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Whether a result for `room_type` belongs in this run
    pub fn wants(&self, room_type: RoomType) -> bool {
        self.room_types.contains(&room_type)
    }

    /// Room type used for date-level placeholder results
    pub fn primary_room_type(&self) -> RoomType {
        self.room_types.first().copied().unwrap_or(RoomType::RoomOnly)
    }

    /// Check for configuration errors that no amount of retrying can fix.
    pub fn validate(&self) -> Result<(), ScrapeError> {
        let url = Url::parse(&self.hotel_url)
            .map_err(|e| ScrapeError::Config(format!("invalid hotel URL {:?}: {}", self.hotel_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScrapeError::Config(format!(
                "hotel URL must be http(s): {}",
                self.hotel_url
            )));
        }

        if self.strategy.trim().is_empty() {
            return Err(ScrapeError::Config("strategy name is empty".to_string()));
        }

        if self.room_types.is_empty() {
            return Err(ScrapeError::Config(
                "at least one room type is required".to_string(),
            ));
        }

        if self.days_forward == 0 {
            return Err(ScrapeError::Config(
                "days_forward must be at least 1".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ScrapeError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if !(self.retry.backoff_multiplier >= 1.0) {
            return Err(ScrapeError::Config(format!(
                "retry.backoff_multiplier must be >= 1, got {}",
                self.retry.backoff_multiplier
            )));
        }

        for (i, step) in self.steps.iter().enumerate() {
            step.validate()
                .map_err(|reason| ScrapeError::Config(format!("step {}: {}", i + 1, reason)))?;
        }

        for list in [
            &self.selectors.room_blocks,
            &self.selectors.price,
            &self.selectors.room_name,
            &self.selectors.availability,
        ] {
            validate_selectors(list).map_err(ScrapeError::Config)?;
        }

        for proxy in &self.proxies {
            proxy.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::rotator::ProxyProvider;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r##"
hotel_url: "https://www.booking.com/hotel/il/example.html"
days_forward: 7
room_types: [room_only]
retry:
  max_attempts: 5
steps:
  - type: click
    selector: "#accept"
  - type: wait
    duration_ms: 500
    description: settle
"##;
        let config: ScraperConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.strategy, "browser");
        assert_eq!(config.days_forward, 7);
        assert_eq!(config.room_types, vec![RoomType::RoomOnly]);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.rate_limit.delay_between_requests_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let base = ScraperConfig::new("https://example.com/hotel");
        assert!(base.validate().is_ok());

        let no_rooms = base.clone().with_room_types(Vec::new());
        assert!(matches!(no_rooms.validate(), Err(ScrapeError::Config(_))));

        let bad_url = ScraperConfig::new("not a url");
        assert!(matches!(bad_url.validate(), Err(ScrapeError::Config(_))));

        let ftp = ScraperConfig::new("ftp://example.com/hotel");
        assert!(ftp.validate().is_err());

        let no_days = base.clone().with_days_forward(0);
        assert!(no_days.validate().is_err());

        let empty_click = base.clone().with_steps(vec![BrowserStep::click("")]);
        let err = empty_click.validate().unwrap_err();
        assert!(err.to_string().contains("step 1"));

        let mut bad_selector = base.clone();
        bad_selector.selectors.price = vec!["span[".to_string()];
        assert!(matches!(bad_selector.validate(), Err(ScrapeError::Config(_))));

        let proxy_without_url = base.with_proxy(ProxyDescriptor::new(ProxyProvider::Http));
        assert!(proxy_without_url.validate().is_err());
    }

    #[test]
    fn test_aggressive_retry_preset() {
        let retry = RetrySettings::aggressive();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.backoff_multiplier, 2.5);
        assert_eq!(retry.retry_on_status, RetrySettings::default().retry_on_status);
    }
}
