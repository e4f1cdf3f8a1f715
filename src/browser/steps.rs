use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::browser::driver::PageHandle;
use crate::scraper::error::ScrapeError;

/// Default timeout for click/fill/select steps
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for waiting on an element
pub const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 30_000;

/// Pause after a click so the page can react
const POST_CLICK_PAUSE: Duration = Duration::from_millis(500);

/// Slack added on top of a step's own timeout
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

fn default_action_timeout() -> u64 {
    DEFAULT_ACTION_TIMEOUT_MS
}

fn default_element_timeout() -> u64 {
    DEFAULT_ELEMENT_TIMEOUT_MS
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    Click {
        selector: String,
        #[serde(default = "default_action_timeout")]
        timeout_ms: u64,
    },
    Fill {
        selector: String,
        value: String,
        #[serde(default = "default_action_timeout")]
        timeout_ms: u64,
    },
    Select {
        selector: String,
        value: String,
        #[serde(default = "default_action_timeout")]
        timeout_ms: u64,
    },
    Wait {
        duration_ms: u64,
    },
    WaitForElement {
        selector: String,
        #[serde(default = "default_element_timeout")]
        timeout_ms: u64,
    },
    Screenshot {
        destination: PathBuf,
    },
    RunScript {
        code: String,
    },
}

/// Step kind, used in error reports and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Click,
    Fill,
    Select,
    Wait,
    WaitForElement,
    Screenshot,
    RunScript,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Click => "click",
            StepKind::Fill => "fill",
            StepKind::Select => "select",
            StepKind::Wait => "wait",
            StepKind::WaitForElement => "wait_for_element",
            StepKind::Screenshot => "screenshot",
            StepKind::RunScript => "run_script",
        };
        f.write_str(name)
    }
}

/// One scripted browser interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserStep {
    #[serde(flatten)]
    pub action: StepAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BrowserStep {
    pub fn new(action: StepAction) -> Self {
        Self {
            action,
            description: None,
        }
    }

    pub fn click(selector: impl Into<String>) -> Self {
        Self::new(StepAction::Click {
            selector: selector.into(),
            timeout_ms: DEFAULT_ACTION_TIMEOUT_MS,
        })
    }

    pub fn fill(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(StepAction::Fill {
            selector: selector.into(),
            value: value.into(),
            timeout_ms: DEFAULT_ACTION_TIMEOUT_MS,
        })
    }

    pub fn select(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(StepAction::Select {
            selector: selector.into(),
            value: value.into(),
            timeout_ms: DEFAULT_ACTION_TIMEOUT_MS,
        })
    }

    pub fn wait(duration_ms: u64) -> Self {
        Self::new(StepAction::Wait { duration_ms })
    }

    pub fn wait_for_element(selector: impl Into<String>, timeout_ms: u64) -> Self {
        Self::new(StepAction::WaitForElement {
            selector: selector.into(),
            timeout_ms,
        })
    }

    pub fn screenshot(destination: impl Into<PathBuf>) -> Self {
        Self::new(StepAction::Screenshot {
            destination: destination.into(),
        })
    }

    pub fn run_script(code: impl Into<String>) -> Self {
        Self::new(StepAction::RunScript { code: code.into() })
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn kind(&self) -> StepKind {
        match self.action {
            StepAction::Click { .. } => StepKind::Click,
            StepAction::Fill { .. } => StepKind::Fill,
            StepAction::Select { .. } => StepKind::Select,
            StepAction::Wait { .. } => StepKind::Wait,
            StepAction::WaitForElement { .. } => StepKind::WaitForElement,
            StepAction::Screenshot { .. } => StepKind::Screenshot,
            StepAction::RunScript { .. } => StepKind::RunScript,
        }
    }

    /// Structural check, run as part of config validation
    pub fn validate(&self) -> Result<(), String> {
        match &self.action {
            StepAction::Click { selector, .. }
            | StepAction::Fill { selector, .. }
            | StepAction::Select { selector, .. }
            | StepAction::WaitForElement { selector, .. } => {
                if selector.trim().is_empty() {
                    return Err(format!("{} step requires a selector", self.kind()));
                }
            }
            StepAction::Screenshot { destination } => {
                if destination.as_os_str().is_empty() {
                    return Err("screenshot step requires a destination".to_string());
                }
            }
            StepAction::RunScript { code } => {
                if code.trim().is_empty() {
                    return Err("run_script step requires code".to_string());
                }
            }
            StepAction::Wait { .. } => {}
        }
        Ok(())
    }
}

/// Replays scripted steps against a live page
pub struct StepReplayer;

impl StepReplayer {
    /// Execute `steps` in order. The first failure aborts the rest and is
    /// reported with the step's 1-based index and kind.
    pub async fn run(page: &dyn PageHandle, steps: &[BrowserStep]) -> Result<(), ScrapeError> {
        info!("Executing {} browser step(s)", steps.len());

        for (i, step) in steps.iter().enumerate() {
            let index = i + 1;
            debug!(
                "Step {}/{}: {} {}",
                index,
                steps.len(),
                step.kind(),
                step.description.as_deref().unwrap_or("")
            );

            Self::run_step(page, step)
                .await
                .map_err(|source| ScrapeError::Step {
                    index,
                    kind: step.kind(),
                    source: Box::new(source),
                })?;
        }

        debug!("All browser steps completed");
        Ok(())
    }

    async fn run_step(page: &dyn PageHandle, step: &BrowserStep) -> Result<(), ScrapeError> {
        match &step.action {
            StepAction::Click {
                selector,
                timeout_ms,
            } => {
                let limit = Duration::from_millis(*timeout_ms);
                bounded("click", limit, page.click(selector, limit)).await?;
                sleep(POST_CLICK_PAUSE).await;
            }
            StepAction::Fill {
                selector,
                value,
                timeout_ms,
            } => {
                let limit = Duration::from_millis(*timeout_ms);
                bounded("fill", limit, page.fill(selector, value, limit)).await?;
            }
            StepAction::Select {
                selector,
                value,
                timeout_ms,
            } => {
                let limit = Duration::from_millis(*timeout_ms);
                bounded("select", limit, page.select_option(selector, value, limit)).await?;
            }
            StepAction::Wait { duration_ms } => {
                debug!("Waiting {}ms", duration_ms);
                sleep(Duration::from_millis(*duration_ms)).await;
            }
            StepAction::WaitForElement {
                selector,
                timeout_ms,
            } => {
                let limit = Duration::from_millis(*timeout_ms);
                bounded("wait_for_element", limit, page.wait_for_visible(selector, limit)).await?;
            }
            StepAction::Screenshot { destination } => {
                let png = page.screenshot_png(false).await?;
                tokio::fs::write(destination, png).await?;
                debug!("Screenshot saved to: {}", destination.display());
            }
            StepAction::RunScript { code } => {
                page.evaluate(code).await?;
            }
        }
        Ok(())
    }
}

/// Run `operation`, converting an overrun of `limit` into a timeout error.
async fn bounded<T, F>(operation: &str, limit: Duration, future: F) -> Result<T, ScrapeError>
where
    F: Future<Output = Result<T, ScrapeError>>,
{
    match timeout(limit + TIMEOUT_GRACE, future).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::timeout(operation, limit)),
    }
}

/// Pre-built step sequences for recurring booking-site flows.
pub mod presets {
    use super::BrowserStep;

    /// Dismiss a cookie consent banner if one is shown
    pub fn accept_cookies() -> Vec<BrowserStep> {
        vec![
            BrowserStep::wait(1000).describe("Wait for cookie banner"),
            BrowserStep::run_script(
                r#"
const candidates = [
  '[data-testid="cookie-banner-accept"]',
  '#onetrust-accept-btn-handler',
  '.cookie-accept',
  '[aria-label*="Accept"]',
  'button[class*="accept"]'
];
for (const selector of candidates) {
  const button = document.querySelector(selector);
  if (button) { button.click(); break; }
}
"#,
            )
            .describe("Accept cookies if banner exists"),
        ]
    }

    /// Close visible modal popups
    pub fn dismiss_popups() -> Vec<BrowserStep> {
        vec![
            BrowserStep::wait(1000).describe("Wait for popups"),
            BrowserStep::run_script(
                r#"
const candidates = [
  '[data-testid="modal-close"]',
  '.modal-close',
  '[aria-label*="Close"]',
  '.close-icon'
];
for (const selector of candidates) {
  const button = document.querySelector(selector);
  if (button && button.offsetParent !== null) { button.click(); break; }
}
"#,
            )
            .describe("Close any visible popups"),
        ]
    }

    /// Populate a booking search form's dates and occupancy
    pub fn search_form(check_in: &str, check_out: &str, adults: u32) -> Vec<BrowserStep> {
        let field = "input[name=\"checkin\"], [data-testid=\"date-display-field-start\"]";

        vec![
            BrowserStep::wait_for_element(field, 10_000).describe("Wait for check-in date picker"),
            BrowserStep::click(field).describe("Open check-in date field"),
            BrowserStep::wait(1000).describe("Wait for calendar to open"),
            BrowserStep::run_script(set_input_script("checkin", check_in))
                .describe("Set check-in date"),
            BrowserStep::run_script(set_input_script("checkout", check_out))
                .describe("Set check-out date"),
            BrowserStep::wait(500).describe("Wait for date update"),
            BrowserStep::run_script(set_input_script("group_adults", &adults.to_string()))
                .describe("Set number of adults"),
            BrowserStep::wait_for_element(
                "[data-testid=\"property-card\"], .hprt-table, .room-block",
                15_000,
            )
            .describe("Wait for rooms to load"),
        ]
    }

    /// Wait for the room table after dismissing consent and popups
    pub fn room_table() -> Vec<BrowserStep> {
        let mut steps = accept_cookies();
        steps.extend(dismiss_popups());
        steps.push(
            BrowserStep::wait_for_element("[data-testid=\"property-card\"], .hprt-table", 15_000)
                .describe("Wait for rooms to load"),
        );
        steps
    }

    /// Consent, popups, then the search form
    pub fn complete_booking_flow(check_in: &str, check_out: &str, adults: u32) -> Vec<BrowserStep> {
        let mut steps = accept_cookies();
        steps.extend(dismiss_popups());
        steps.extend(search_form(check_in, check_out, adults));
        steps
    }

    fn set_input_script(name: &str, value: &str) -> String {
        let selector = serde_json::to_string(&format!("input[name=\"{}\"]", name))
            .unwrap_or_else(|_| "\"\"".to_string());
        let value = serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string());

        format!(
            r#"
const input = document.querySelector({selector});
if (input) {{
  input.value = {value};
  input.dispatchEvent(new Event('input', {{ bubbles: true }}));
  input.dispatchEvent(new Event('change', {{ bubbles: true }}));
}}
"#
        )
    }
}
