//! In-memory browser used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::driver::{BrowserHandle, BrowserLauncher, PageHandle, SessionOptions};
use crate::scraper::error::ScrapeError;

/// Shared record of everything the fake browser was asked to do
#[derive(Debug, Clone, Default)]
pub struct PageLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl PageLog {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    /// Page-level actions, excluding lifecycle entries
    pub fn actions(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.starts_with("goto ") && !LIFECYCLE.contains(&e.as_str()))
            .cloned()
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

const LIFECYCLE: &[&str] = &["launch", "new_page", "close_page", "close_browser", "screenshot"];

/// What the fake server returns for a navigation
#[derive(Debug, Clone)]
pub enum Visit {
    Html(String),
    NetworkError(String),
}

pub type Responder = Arc<dyn Fn(&str) -> Visit + Send + Sync>;

/// A page with canned markup
pub struct ScriptedPage {
    content: Mutex<String>,
    log: PageLog,
    responder: Option<Responder>,
    failing_clicks: HashMap<String, String>,
    hanging_waits: HashSet<String>,
}

impl ScriptedPage {
    pub fn new(content: impl Into<String>, log: PageLog) -> Self {
        Self {
            content: Mutex::new(content.into()),
            log,
            responder: None,
            failing_clicks: HashMap::new(),
            hanging_waits: HashSet::new(),
        }
    }

    fn with_responder(log: PageLog, responder: Responder) -> Self {
        let mut page = Self::new(String::new(), log);
        page.responder = Some(responder);
        page
    }

    pub fn fail_click(mut self, selector: &str, message: &str) -> Self {
        self.failing_clicks.insert(selector.to_string(), message.to_string());
        self
    }

    pub fn hang_on_wait(mut self, selector: &str) -> Self {
        self.hanging_waits.insert(selector.to_string());
        self
    }
}

#[async_trait]
impl PageHandle for ScriptedPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), ScrapeError> {
        self.log.record(format!("goto {}", url));
        if let Some(responder) = &self.responder {
            match responder(url) {
                Visit::Html(html) => *self.content.lock().unwrap() = html,
                Visit::NetworkError(message) => return Err(ScrapeError::Browser(message)),
            }
        }
        Ok(())
    }

    async fn wait_for_idle(&self, _timeout: Duration) -> Result<(), ScrapeError> {
        Ok(())
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> Result<(), ScrapeError> {
        self.log.record(format!("click {}", selector));
        match self.failing_clicks.get(selector) {
            Some(message) => Err(ScrapeError::Browser(message.clone())),
            None => Ok(()),
        }
    }

    async fn fill(&self, selector: &str, value: &str, _timeout: Duration) -> Result<(), ScrapeError> {
        self.log.record(format!("fill {}={}", selector, value));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str, _timeout: Duration) -> Result<(), ScrapeError> {
        self.log.record(format!("select {}={}", selector, value));
        Ok(())
    }

    async fn wait_for_visible(&self, selector: &str, _timeout: Duration) -> Result<(), ScrapeError> {
        if self.hanging_waits.contains(selector) {
            std::future::pending::<()>().await;
        }
        self.log.record(format!("wait_for_visible {}", selector));
        Ok(())
    }

    async fn screenshot_png(&self, _full_page: bool) -> Result<Vec<u8>, ScrapeError> {
        self.log.record("screenshot");
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError> {
        self.log.record(format!("evaluate {}", script));
        Ok(Value::Null)
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        Ok(self.content.lock().unwrap().clone())
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        self.log.record("close_page");
        Ok(())
    }
}

/// Browser whose pages answer navigations through a responder
pub struct FakeBrowser {
    log: PageLog,
    responder: Responder,
    failing_clicks: HashMap<String, String>,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, ScrapeError> {
        self.log.record("new_page");
        let mut page = ScriptedPage::with_responder(self.log.clone(), self.responder.clone());
        page.failing_clicks = self.failing_clicks.clone();
        Ok(Box::new(page))
    }

    async fn close(&self) -> Result<(), ScrapeError> {
        self.log.record("close_browser");
        Ok(())
    }
}

/// Launcher recording the options it was given
#[derive(Clone)]
pub struct FakeLauncher {
    pub log: PageLog,
    responder: Responder,
    failing_clicks: HashMap<String, String>,
    options: Arc<Mutex<Vec<SessionOptions>>>,
}

impl FakeLauncher {
    pub fn new(responder: impl Fn(&str) -> Visit + Send + Sync + 'static) -> Self {
        Self {
            log: PageLog::default(),
            responder: Arc::new(responder),
            failing_clicks: HashMap::new(),
            options: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make every page fail clicks on `selector`
    pub fn with_failing_click(mut self, selector: &str, message: &str) -> Self {
        self.failing_clicks.insert(selector.to_string(), message.to_string());
        self
    }

    pub fn launches(&self) -> Vec<SessionOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, options: &SessionOptions) -> Result<Box<dyn BrowserHandle>, ScrapeError> {
        self.log.record("launch");
        self.options.lock().unwrap().push(options.clone());
        Ok(Box::new(FakeBrowser {
            log: self.log.clone(),
            responder: self.responder.clone(),
            failing_clicks: self.failing_clicks.clone(),
        }))
    }
}

/// Listing page with one room row per `(name, price)` pair
pub fn listing_page(rooms: &[(&str, &str)]) -> String {
    let rows = rooms
        .iter()
        .map(|(name, price)| {
            format!(
                r#"<tr class="hprt-table-row"><td><a class="hprt-roomtype-icon-link">{}</a></td><td><span class="prco-valign-middle-helper">{}</span></td></tr>"#,
                name, price
            )
        })
        .collect::<String>();

    format!(
        r#"<html><head><title>Hotel</title></head><body><table class="hprt-table">{}</table></body></html>"#,
        rows
    )
}

/// Listing page announcing that nothing is available
pub fn sold_out_page() -> String {
    r#"<html><body><div class="bui-alert">No availability on our site for your dates</div></body></html>"#
        .to_string()
}
