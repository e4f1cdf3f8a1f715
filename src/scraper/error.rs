use std::time::Duration;

use thiserror::Error;

use crate::browser::steps::StepKind;

/// Errors raised by the scraping engine.
///
/// Configuration problems (`UnknownStrategy`, `Config`) are never retried.
/// Everything else is routed through the retry policy, which decides
/// eligibility from the variant, the HTTP status or the message text.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("unknown strategy \"{name}\" (available: {available})")]
    UnknownStrategy { name: String, available: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("{operation} timed out after {}ms", .elapsed.as_millis())]
    Timeout { operation: String, elapsed: Duration },

    #[error("blocked by bot defense: {0}")]
    Blocked(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("browser step {index} ({kind}) failed: {source}")]
    Step {
        index: usize,
        kind: StepKind,
        #[source]
        source: Box<ScrapeError>,
    },

    #[error("webdriver error: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    /// Build a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        ScrapeError::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// HTTP status carried by this error, looking through step wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            ScrapeError::Http { status, .. } => Some(*status),
            ScrapeError::Step { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Configuration errors cannot be resolved by waiting.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ScrapeError::UnknownStrategy { .. } | ScrapeError::Config(_)
        )
    }

    /// Whether this error is a connection-level failure.
    pub fn is_transient_network(&self) -> bool {
        match self {
            ScrapeError::Timeout { .. } => true,
            ScrapeError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::NotConnected
            ),
            ScrapeError::Step { source, .. } => {
                source.is_transient_network() || matches_network_signature(&self.to_string())
            }
            ScrapeError::Config(_) | ScrapeError::UnknownStrategy { .. } => false,
            other => matches_network_signature(&other.to_string()),
        }
    }
}

const NETWORK_SIGNATURES: &[&str] = &[
    "connection refused",
    "econnrefused",
    "host not found",
    "enotfound",
    "name or service not known",
    "dns error",
    "timed out",
    "etimedout",
    "connection reset",
    "econnreset",
    "broken pipe",
    "epipe",
    "timeout",
    "net::err_",
];

fn matches_network_signature(message: &str) -> bool {
    let message = message.to_lowercase();
    NETWORK_SIGNATURES.iter().any(|sig| message.contains(sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_through_step_wrapper() {
        let err = ScrapeError::Step {
            index: 2,
            kind: StepKind::Click,
            source: Box::new(ScrapeError::Http {
                status: 503,
                message: "service unavailable".to_string(),
            }),
        };

        assert_eq!(err.status(), Some(503));
        assert_eq!(
            err.to_string(),
            "browser step 2 (click) failed: HTTP 503: service unavailable"
        );
    }

    #[test]
    fn test_network_classification() {
        assert!(ScrapeError::timeout("navigation", Duration::from_secs(30)).is_transient_network());
        assert!(ScrapeError::Browser("net::ERR_CONNECTION_CLOSED".to_string()).is_transient_network());
        assert!(ScrapeError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
            .is_transient_network());
        assert!(!ScrapeError::Browser("element is not interactable".to_string()).is_transient_network());
        assert!(!ScrapeError::Config("timeout must be positive".to_string()).is_transient_network());
    }

    #[test]
    fn test_config_errors() {
        let err = ScrapeError::UnknownStrategy {
            name: "http".to_string(),
            available: "browser".to_string(),
        };
        assert!(err.is_config());
        assert_eq!(err.to_string(), "unknown strategy \"http\" (available: browser)");
        assert!(!ScrapeError::Blocked("captcha".to_string()).is_config());
    }
}
