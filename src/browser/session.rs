use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info};

use crate::browser::driver::{BrowserHandle, BrowserLauncher, PageHandle, SessionOptions};
use crate::browser::extension::proxy_auth_extension;
use crate::browser::fingerprint::StealthProfile;
use crate::scraper::error::ScrapeError;

/// Default WebDriver endpoint
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

/// Interval between element and idle polls
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches Chrome sessions through a WebDriver server
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    server_url: String,
}

impl WebDriverLauncher {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

/// Auth extension for a proxy that needs credentials
fn proxy_extension(options: &SessionOptions) -> Result<Option<String>, ScrapeError> {
    let Some(proxy) = &options.proxy else {
        return Ok(None);
    };
    let (Some(username), Some(password)) = (&proxy.username, &proxy.password) else {
        return Ok(None);
    };

    if proxy.server.starts_with("socks") {
        return Err(ScrapeError::Config(format!(
            "Chrome cannot authenticate to SOCKS proxy {}",
            proxy.server
        )));
    }

    proxy_auth_extension(username, password).map(Some)
}

impl Default for WebDriverLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_WEBDRIVER_URL)
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, options: &SessionOptions) -> Result<Box<dyn BrowserHandle>, ScrapeError> {
        let profile = StealthProfile::from_settings(&options.anti_bot, options.cookie_domain.as_deref());

        let mut caps = DesiredCapabilities::chrome();
        for arg in profile.launch_args().iter().chain(options.launch_args.iter()) {
            caps.add_chrome_arg(arg)?;
        }
        caps.add_chrome_option("excludeSwitches", json!(["enable-automation"]))?;
        caps.add_chrome_option("useAutomationExtension", json!(false))?;
        if let Some(extension) = proxy_extension(options)? {
            caps.add_encoded_extension(&extension)?;
            debug!("Proxy auth extension added");
        }

        let driver = WebDriver::new(&self.server_url, caps)
            .await
            .map_err(|e| ScrapeError::Browser(format!("failed to connect to WebDriver at {}: {}", self.server_url, e)))?;

        driver.set_page_load_timeout(options.navigation_timeout).await?;
        let home = driver.window().await?;

        info!(
            "Browser session opened ({}x{}, {}, {})",
            profile.viewport.width, profile.viewport.height, profile.locale, profile.timezone
        );

        Ok(Box::new(WebDriverBrowser {
            driver: Mutex::new(Some(driver)),
            home,
            profile,
        }))
    }
}

/// One WebDriver session. Pages are browser tabs.
pub struct WebDriverBrowser {
    driver: Mutex<Option<WebDriver>>,
    home: WindowHandle,
    profile: StealthProfile,
}

impl WebDriverBrowser {
    async fn driver(&self) -> Result<WebDriver, ScrapeError> {
        self.driver
            .lock()
            .await
            .clone()
            .ok_or_else(|| ScrapeError::Browser("browser session already closed".to_string()))
    }

    /// Apply the stealth profile to the current tab
    async fn apply_profile(&self, driver: &WebDriver) -> Result<(), ScrapeError> {
        let dev_tools = ChromeDevTools::new(driver.handle.clone());

        dev_tools
            .execute_cdp_with_params(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": self.profile.init_script() }),
            )
            .await?;
        dev_tools
            .execute_cdp_with_params(
                "Emulation.setTimezoneOverride",
                json!({ "timezoneId": self.profile.timezone }),
            )
            .await?;
        dev_tools
            .execute_cdp_with_params(
                "Network.setUserAgentOverride",
                json!({
                    "userAgent": self.profile.user_agent,
                    "acceptLanguage": self.profile.accept_language,
                }),
            )
            .await?;

        dev_tools.execute_cdp("Network.enable").await?;
        dev_tools
            .execute_cdp_with_params(
                "Network.setExtraHTTPHeaders",
                json!({ "headers": self.profile.headers }),
            )
            .await?;

        if !self.profile.cookies.is_empty() {
            let cookies = self
                .profile
                .cookies
                .iter()
                .map(|c| json!({ "name": c.name, "value": c.value, "domain": c.domain, "path": "/" }))
                .collect::<Vec<_>>();
            dev_tools
                .execute_cdp_with_params("Network.setCookies", json!({ "cookies": cookies }))
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl BrowserHandle for WebDriverBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, ScrapeError> {
        let driver = self.driver().await?;

        let window = driver.new_tab().await?;
        driver.switch_to_window(window).await?;
        if let Err(e) = self.apply_profile(&driver).await {
            if let Err(close_err) = driver.close_window().await {
                error!("Failed to close tab after profile error: {}", close_err);
            }
            driver.switch_to_window(self.home.clone()).await?;
            return Err(e);
        }

        debug!("Opened new page");
        Ok(Box::new(WebDriverPage {
            driver,
            home: self.home.clone(),
        }))
    }

    async fn close(&self) -> Result<(), ScrapeError> {
        if let Some(driver) = self.driver.lock().await.take() {
            driver.quit().await?;
            debug!("Browser session closed");
        }
        Ok(())
    }
}

impl Drop for WebDriverBrowser {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = driver.quit().await {
                        error!("Error closing browser session during drop: {}", e);
                    }
                });
            }
        }
    }
}

/// A browser tab
pub struct WebDriverPage {
    driver: WebDriver,
    home: WindowHandle,
}

impl WebDriverPage {
    async fn find(&self, selector: &str, limit: Duration, displayed: bool) -> Result<WebElement, ScrapeError> {
        let query = self.driver.query(By::Css(selector)).wait(limit, POLL_INTERVAL);
        let query = if displayed { query.and_displayed() } else { query };

        query
            .first()
            .await
            .map_err(|e| ScrapeError::Browser(format!("element not found: {}: {}", selector, e)))
    }
}

#[async_trait]
impl PageHandle for WebDriverPage {
    async fn goto(&self, url: &str, limit: Duration) -> Result<(), ScrapeError> {
        debug!("Navigating to: {}", url);
        match timeout(limit, self.driver.goto(url)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ScrapeError::timeout("navigation", limit)),
        }
    }

    async fn wait_for_idle(&self, limit: Duration) -> Result<(), ScrapeError> {
        let deadline = Instant::now() + limit;
        let mut last_count: Option<u64> = None;

        loop {
            let state = self
                .driver
                .execute(
                    "return [document.readyState, performance.getEntriesByType('resource').length];",
                    Vec::new(),
                )
                .await?;
            let state = state.json().clone();
            let ready = state.get(0).and_then(Value::as_str) == Some("complete");
            let count = state.get(1).and_then(Value::as_u64);

            if ready && count.is_some() && count == last_count {
                return Ok(());
            }
            last_count = count;

            if Instant::now() >= deadline {
                return Err(ScrapeError::timeout("network idle", limit));
            }
            sleep(POLL_INTERVAL * 2).await;
        }
    }

    async fn click(&self, selector: &str, limit: Duration) -> Result<(), ScrapeError> {
        let element = self.find(selector, limit, true).await?;
        element.scroll_into_view().await?;
        element.click().await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str, limit: Duration) -> Result<(), ScrapeError> {
        let element = self.find(selector, limit, true).await?;
        element.clear().await?;
        element.send_keys(value).await?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str, limit: Duration) -> Result<(), ScrapeError> {
        let element = self.find(selector, limit, false).await?;
        let matched = self
            .driver
            .execute(
                r#"
const select = arguments[0];
const wanted = arguments[1];
const option = Array.from(select.options).find(o => o.value === wanted || o.text.trim() === wanted);
if (!option) { return false; }
select.value = option.value;
select.dispatchEvent(new Event('change', { bubbles: true }));
return true;
"#,
                vec![element.to_json()?, json!(value)],
            )
            .await?;

        if matched.json().as_bool() == Some(true) {
            Ok(())
        } else {
            Err(ScrapeError::Browser(format!("no option {:?} in {}", value, selector)))
        }
    }

    async fn wait_for_visible(&self, selector: &str, limit: Duration) -> Result<(), ScrapeError> {
        self.driver
            .query(By::Css(selector))
            .wait(limit, POLL_INTERVAL)
            .and_displayed()
            .first()
            .await
            .map_err(|_| ScrapeError::timeout(format!("waiting for {}", selector), limit))?;
        Ok(())
    }

    async fn screenshot_png(&self, full_page: bool) -> Result<Vec<u8>, ScrapeError> {
        if !full_page {
            return Ok(self.driver.screenshot_as_png().await?);
        }

        let dev_tools = ChromeDevTools::new(self.driver.handle.clone());
        let shot = dev_tools
            .execute_cdp_with_params(
                "Page.captureScreenshot",
                json!({ "format": "png", "captureBeyondViewport": true }),
            )
            .await?;
        let data = shot
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::Browser("screenshot returned no data".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| ScrapeError::Browser(format!("invalid screenshot payload: {}", e)))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError> {
        let ret = self.driver.execute(script, Vec::new()).await?;
        Ok(ret.json().clone())
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        Ok(self.driver.source().await?)
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        self.driver.close_window().await?;
        self.driver.switch_to_window(self.home.clone()).await?;
        debug!("Page closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::rotator::BrowserProxy;
    use crate::scraper::config::ScraperConfig;

    fn options(proxy: Option<BrowserProxy>) -> SessionOptions {
        SessionOptions {
            proxy,
            ..SessionOptions::from_config(&ScraperConfig::new("https://www.booking.com/hotel/il/carlton.html"))
        }
    }

    fn proxy(server: &str, credentials: Option<(&str, &str)>) -> BrowserProxy {
        BrowserProxy {
            server: server.to_string(),
            username: credentials.map(|(u, _)| u.to_string()),
            password: credentials.map(|(_, p)| p.to_string()),
        }
    }

    #[test]
    fn test_extension_only_for_credentialed_proxies() {
        assert!(proxy_extension(&options(None)).unwrap().is_none());
        assert!(proxy_extension(&options(Some(proxy("http://10.0.0.5:3128", None))))
            .unwrap()
            .is_none());

        let credentialed = options(Some(proxy("http://brd.superproxy.io:22225", Some(("brd-customer-42", "pw")))));
        let encoded = proxy_extension(&credentialed).unwrap().unwrap();
        assert!(base64::engine::general_purpose::STANDARD.decode(encoded).is_ok());
    }

    #[test]
    fn test_socks_credentials_are_rejected() {
        let socks = options(Some(proxy("socks5://127.0.0.1:1080", Some(("scout", "pw")))));
        let err = proxy_extension(&socks).unwrap_err();
        assert!(err.is_config());
    }
}
