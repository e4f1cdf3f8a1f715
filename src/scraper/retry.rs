use std::future::Future;
use std::time::Duration;

use rand::{thread_rng, Rng};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::scraper::config::RetrySettings;
use crate::scraper::error::ScrapeError;

/// Response text that usually means an anti-bot layer intervened.
const BOT_DEFENSE_VOCABULARY: &[&str] = &[
    "captcha",
    "challenge",
    "blocked",
    "denied",
    "forbidden",
    "too many requests",
    "rate limit",
];

/// Jitter applied around the computed backoff, as a fraction of it
const JITTER_FRACTION: f64 = 0.2;

/// Retry policy with exponential backoff and bot-detection heuristics.
///
/// The attempt counter lives on the policy value itself. A strategy keeps one
/// policy per run and resets it before each date, so a bad date never eats
/// into the next date's budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    settings: RetrySettings,
    attempts: u32,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            settings,
            attempts: 0,
        }
    }

    /// Run `operation` until it succeeds or the failure is not retry-eligible.
    ///
    /// `operation` receives the 1-based attempt number. `on_retry` is called
    /// with (attempt, error, delay) before each backoff sleep.
    pub async fn execute<T, F, Fut, O>(
        &mut self,
        mut operation: F,
        mut on_retry: O,
    ) -> Result<T, ScrapeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ScrapeError>>,
        O: FnMut(u32, &ScrapeError, Duration),
    {
        loop {
            self.attempts += 1;
            let attempt = self.attempts;

            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.should_retry(&error) {
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    on_retry(attempt, &error, delay);

                    warn!(
                        "Attempt {}/{} failed, retrying in {}ms: {}",
                        attempt,
                        self.settings.max_attempts,
                        delay.as_millis(),
                        error
                    );

                    sleep(delay).await;
                }
            }
        }
    }

    /// Decide whether the failure of the current attempt may be retried.
    pub fn should_retry(&self, error: &ScrapeError) -> bool {
        if self.attempts >= self.settings.max_attempts {
            debug!("Max attempts ({}) reached", self.settings.max_attempts);
            return false;
        }

        if error.is_config() {
            return false;
        }

        if error.is_transient_network() {
            return true;
        }

        if let Some(status) = error.status() {
            if self.settings.retry_on_status.contains(&status) {
                return true;
            }
        }

        if Self::is_bot_defense(error) {
            debug!("Bot defense suspected: {}", error);
            return true;
        }

        false
    }

    /// Whether the error text matches the bot-defense vocabulary.
    pub fn is_bot_defense(error: &ScrapeError) -> bool {
        if matches!(error, ScrapeError::Blocked(_)) {
            return true;
        }

        let message = error.to_string().to_lowercase();
        BOT_DEFENSE_VOCABULARY
            .iter()
            .any(|indicator| message.contains(indicator))
    }

    /// Un-jittered backoff for the given 1-based attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let exponential = self.settings.initial_delay_ms as f64
            * self.settings.backoff_multiplier.powi(exponent);
        let capped = exponential.min(self.settings.max_delay_ms as f64);

        Duration::from_millis(capped.max(0.0).round() as u64)
    }

    /// Backoff for the given attempt with uniform ±20% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_millis() as f64;
        let jitter = if base > 0.0 {
            thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION) * base
        } else {
            0.0
        };

        Duration::from_millis((base + jitter).max(0.0).round() as u64)
    }

    /// Attempts made since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts
    }

    /// Reset the attempt counter
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
