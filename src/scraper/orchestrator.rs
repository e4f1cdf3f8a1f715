use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::browser::steps::{presets, BrowserStep};
use crate::browser::strategy::BrowserFetchStrategy;
use crate::proxy::rotator::{ProxyDescriptor, ProxyProvider};
use crate::scraper::config::{ChangeDetectionSettings, ScraperConfig};
use crate::scraper::error::ScrapeError;
use crate::scraper::strategy::FetchStrategy;
use crate::scraper::types::{ChangeFields, RoomType, ScraperContext, ScraperResult};

/// Requests through one proxy before the factory config rotates
const FACTORY_ROTATION_INTERVAL: u32 = 10;

/// Lookup of previously recorded prices, backed by the caller's store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Last recorded price for (run series, hotel, date, room type).
    /// `None` when nothing was recorded or the record had no price.
    async fn previous_price(
        &self,
        run_id: Option<i64>,
        hotel_id: i64,
        date: NaiveDate,
        room_type: RoomType,
    ) -> Option<f64>;
}

/// History that never has a previous price
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

#[async_trait]
impl PriceHistory for NoHistory {
    async fn previous_price(&self, _: Option<i64>, _: i64, _: NaiveDate, _: RoomType) -> Option<f64> {
        None
    }
}

/// Selects a fetch strategy by name and post-processes its results
pub struct ScrapeOrchestrator {
    strategies: HashMap<String, Arc<dyn FetchStrategy>>,
    history: Arc<dyn PriceHistory>,
}

impl ScrapeOrchestrator {
    /// Orchestrator with the browser strategy registered and no history
    pub fn new() -> Self {
        let mut orchestrator = Self::empty();
        orchestrator.register(Arc::new(BrowserFetchStrategy::default()));
        orchestrator
    }

    /// Orchestrator with no strategies
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            history: Arc::new(NoHistory),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn PriceHistory>) -> Self {
        self.history = history;
        self
    }

    /// Register a strategy, replacing any with the same name
    pub fn register(&mut self, strategy: Arc<dyn FetchStrategy>) {
        info!("Registered strategy: {}", strategy.name());
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    /// Registered strategy names, sorted
    pub fn strategy_names(&self) -> Vec<String> {
        let mut names = self.strategies.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn strategy(&self, name: &str) -> Result<Arc<dyn FetchStrategy>, ScrapeError> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| ScrapeError::UnknownStrategy {
                name: name.to_string(),
                available: self.strategy_names().join(", "),
            })
    }

    /// Run the configured strategy and post-process its results.
    ///
    /// Fails only on configuration errors; per-date failures come back as
    /// results carrying an error string.
    pub async fn scrape(
        &self,
        config: &ScraperConfig,
        context: &ScraperContext,
    ) -> Result<Vec<ScraperResult>, ScrapeError> {
        let span = info_span!("scrape", scrape_id = %Uuid::new_v4(), hotel_id = context.hotel.id);

        async {
            info!(
                "Starting scrape of {} ({}) with {} strategy, {} day(s), room types: {}",
                context.hotel.name,
                config.hotel_url,
                config.strategy,
                config.days_forward,
                config
                    .room_types
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            config.validate()?;
            let strategy = self.strategy(&config.strategy)?;

            let results = match strategy.fetch(&config.hotel_url, config, context).await {
                Ok(results) => results,
                Err(e) => {
                    error!("Scrape failed: {}", e);
                    return Err(e);
                }
            };

            let results = self.post_process(results, config, context).await;
            info!("Scrape completed with {} result(s)", results.len());

            Ok::<_, ScrapeError>(results)
        }
        .instrument(span)
        .await
    }

    async fn post_process(
        &self,
        results: Vec<ScraperResult>,
        config: &ScraperConfig,
        context: &ScraperContext,
    ) -> Vec<ScraperResult> {
        debug!("Post-processing {} result(s)", results.len());
        let settings = &config.change_detection;
        let mut processed = Vec::with_capacity(results.len());

        for mut result in results {
            if !config.wants(result.room_type) {
                debug!("Dropping {} result for {}", result.room_type, result.date);
                continue;
            }

            if settings.enabled && !result.is_error() {
                let previous = self
                    .history
                    .previous_price(context.run_id, context.hotel.id, result.date, result.room_type)
                    .await;

                if let Some(previous) = previous {
                    let change = compare_prices(previous, result.price, settings);
                    if config.screenshot.only_on_change && !change.change_detected {
                        result.screenshot = None;
                    }
                    if change.change_detected {
                        info!(
                            "Price change detected for {} {}: {} -> {} ({:.1}%)",
                            result.date,
                            result.room_type,
                            previous,
                            result.price.unwrap_or_default(),
                            change.price_change_percent.unwrap_or_default()
                        );
                    }
                    result.change = Some(change);
                }
            }

            processed.push(result);
        }

        processed
    }

    /// Default configuration for a listing page
    pub fn default_config(hotel_url: &str, days_forward: u32, room_types: Vec<RoomType>) -> ScraperConfig {
        ScraperConfig::new(hotel_url)
            .with_days_forward(days_forward)
            .with_room_types(room_types)
    }

    /// Default configuration that dismisses consent and popups and waits
    /// for the room table before reading the page
    pub fn with_interaction_script(hotel_url: &str, days_forward: u32) -> ScraperConfig {
        let mut steps = vec![BrowserStep::wait(2000).describe("Wait for page to load")];
        steps.extend(presets::room_table());

        ScraperConfig::new(hotel_url)
            .with_days_forward(days_forward)
            .with_steps(steps)
    }

    /// Default configuration routed through one proxy
    pub fn with_proxy(
        hotel_url: &str,
        proxy_url: &str,
        provider: ProxyProvider,
        credentials: Option<(&str, &str)>,
    ) -> ScraperConfig {
        let mut proxy = ProxyDescriptor::new(provider)
            .with_url(proxy_url)
            .rotate_every(FACTORY_ROTATION_INTERVAL);
        if let Some((username, password)) = credentials {
            proxy = proxy.with_credentials(username, password);
        }

        ScraperConfig::new(hotel_url).with_proxy(proxy)
    }

    /// Default configuration reading the price from embedded JSON
    pub fn with_embedded_extraction(hotel_url: &str, path: &str) -> ScraperConfig {
        ScraperConfig::new(hotel_url).with_embedded_path(path)
    }
}

impl Default for ScrapeOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare a new observation against the previous price.
pub fn compare_prices(previous: f64, current: Option<f64>, settings: &ChangeDetectionSettings) -> ChangeFields {
    let mut change = ChangeFields {
        previous_price: Some(previous),
        ..ChangeFields::default()
    };

    let Some(current) = current else {
        return change;
    };

    let delta = current - previous;
    change.price_change = Some(delta);

    if previous == 0.0 {
        return change;
    }

    let percent = delta / previous * 100.0;
    change.price_change_percent = Some(percent);

    let direction_enabled = (percent > 0.0 && settings.notify_on_increase)
        || (percent < 0.0 && settings.notify_on_decrease);
    change.change_detected = direction_enabled && percent.abs() >= settings.minimum_change_percent;

    change
}
