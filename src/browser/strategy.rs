use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{Days, NaiveDate, Utc};
use tokio::sync::OnceCell;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::driver::{BrowserHandle, BrowserLauncher, PageHandle, SessionOptions};
use crate::browser::session::WebDriverLauncher;
use crate::browser::steps::StepReplayer;
use crate::extract::embedded::{self, EmbeddedPrice};
use crate::extract::rooms::{analyze_page, PageAnalysis};
use crate::proxy::rotator::ProxyRotator;
use crate::scraper::config::ScraperConfig;
use crate::scraper::error::ScrapeError;
use crate::scraper::retry::RetryPolicy;
use crate::scraper::strategy::FetchStrategy;
use crate::scraper::types::{
    PriceSource, RawExtraction, ResultMeta, ScraperContext, ScraperResult,
};

/// Occupancy sent with every date query
const OCCUPANCY: &[(&str, &str)] = &[("group_adults", "2"), ("group_children", "0"), ("no_rooms", "1")];

/// Browser-driven fetch strategy.
///
/// Holds no per-run state: the browser, retry counter and proxy rotator all
/// live inside a single `fetch` call, so concurrent calls never share them.
pub struct BrowserFetchStrategy {
    launcher: Arc<dyn BrowserLauncher>,
}

/// What one successful page visit produced
struct DatePage {
    analysis: PageAnalysis,
    embedded: Option<EmbeddedPrice>,
    screenshot: Option<String>,
}

/// Per-run state threaded through the date loop
struct RunState {
    retry: RetryPolicy,
    session: SessionOptions,
    proxy_slot: Option<usize>,
}

impl BrowserFetchStrategy {
    pub const NAME: &'static str = "browser";

    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { launcher }
    }

    fn prepare_run(config: &ScraperConfig) -> Result<RunState, ScrapeError> {
        let mut session = SessionOptions::from_config(config);
        let mut proxy_slot = None;

        let proxies = config
            .proxies
            .iter()
            .filter(|p| p.enabled)
            .cloned()
            .collect::<Vec<_>>();

        if !proxies.is_empty() {
            let mut rotator = ProxyRotator::new(proxies)?;
            let (slot, proxy) = rotator.next();
            let proxy = proxy.clone();

            session.launch_args = rotator.launch_args(&proxy);
            session.proxy = rotator.browser_proxy(&proxy);
            proxy_slot = Some(slot);

            info!("Proxy enabled: {:?} (slot {})", proxy.provider, slot);
        }

        Ok(RunState {
            retry: RetryPolicy::new(config.retry.clone()),
            session,
            proxy_slot,
        })
    }

    async fn run_dates(
        &self,
        browser: &OnceCell<Box<dyn BrowserHandle>>,
        base_url: &Url,
        config: &ScraperConfig,
        context: &ScraperContext,
        run: &mut RunState,
    ) -> Vec<ScraperResult> {
        let mut results = Vec::new();
        let hotel_id = context.hotel.id;
        let session = &run.session;

        for offset in 0..config.days_forward {
            let date = context.start_date + Days::new(u64::from(offset));
            let date_url = build_date_url(base_url, date);
            let date_url = date_url.as_str();
            let started = Instant::now();

            info!("Processing date {} for hotel {}", date, hotel_id);

            run.retry.reset();
            let outcome = run
                .retry
                .execute(
                    move |attempt| {
                        debug!("Attempt {} for {}", attempt, date);
                        self.scrape_date(browser, session, date_url, config)
                    },
                    |attempt, error, delay| {
                        warn!(
                            "Hotel {} date {}: attempt {} failed, retrying in {}ms: {}",
                            hotel_id,
                            date,
                            attempt,
                            delay.as_millis(),
                            error
                        );
                    },
                )
                .await;

            let meta = ResultMeta {
                fetcher_used: Self::NAME.to_string(),
                proxy_used: run.proxy_slot,
                attempts: run.retry.attempts().max(1),
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
                error: None,
            };

            match outcome {
                Ok(page) => results.extend(build_results(date, page, config, meta)),
                Err(error) => {
                    warn!(
                        "Hotel {} date {} failed after {} attempt(s): {}",
                        hotel_id, date, meta.attempts, error
                    );
                    let meta = ResultMeta {
                        error: Some(error.to_string()),
                        ..meta
                    };
                    results.push(ScraperResult::unavailable(
                        date,
                        config.primary_room_type(),
                        config.base_currency.clone(),
                        meta,
                    ));
                }
            }

            let delay = config.rate_limit.delay_between_requests_ms;
            if delay > 0 && offset + 1 < config.days_forward {
                debug!("Sleeping {}ms before next date", delay);
                sleep(Duration::from_millis(delay)).await;
            }
        }

        results
    }

    /// One attempt at one date: a fresh page on the shared browser.
    async fn scrape_date(
        &self,
        browser: &OnceCell<Box<dyn BrowserHandle>>,
        session: &SessionOptions,
        url: &str,
        config: &ScraperConfig,
    ) -> Result<DatePage, ScrapeError> {
        let browser = browser
            .get_or_try_init(|| async {
                info!("Launching browser");
                self.launcher.launch(session).await
            })
            .await?;

        let page = browser.new_page().await?;
        let outcome = drive_page(page.as_ref(), url, config).await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }

        outcome
    }
}

impl Default for BrowserFetchStrategy {
    fn default() -> Self {
        Self::new(Arc::new(WebDriverLauncher::default()))
    }
}

#[async_trait]
impl FetchStrategy for BrowserFetchStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(
        &self,
        url: &str,
        config: &ScraperConfig,
        context: &ScraperContext,
    ) -> Result<Vec<ScraperResult>, ScrapeError> {
        let base_url = Url::parse(url)
            .map_err(|e| ScrapeError::Config(format!("invalid hotel URL {:?}: {}", url, e)))?;
        let mut run = Self::prepare_run(config)?;

        info!(
            "Starting browser scrape for {} ({} day(s) from {})",
            context.hotel.name, config.days_forward, context.start_date
        );
        let started = Instant::now();

        let browser = OnceCell::new();
        let results = self
            .run_dates(&browser, &base_url, config, context, &mut run)
            .await;

        if let Some(browser) = browser.get() {
            info!("Closing browser");
            if let Err(e) = browser.close().await {
                warn!("Error closing browser: {}", e);
            }
        }

        info!(
            "Completed {} result(s) in {}ms",
            results.len(),
            started.elapsed().as_millis()
        );
        Ok(results)
    }
}

/// Navigate, replay steps and read the page.
async fn drive_page(page: &dyn PageHandle, url: &str, config: &ScraperConfig) -> Result<DatePage, ScrapeError> {
    debug!("Navigating to {}", url);
    page.goto(url, Duration::from_millis(config.page.navigation_timeout_ms))
        .await?;

    if let Err(e) = page
        .wait_for_idle(Duration::from_millis(config.page.idle_timeout_ms))
        .await
    {
        debug!("Network did not settle, continuing: {}", e);
    }

    if !config.steps.is_empty() {
        StepReplayer::run(page, &config.steps).await?;
    }

    if let Some(script) = &config.anti_bot.pre_extraction_script {
        debug!("Running pre-extraction script");
        page.evaluate(script).await?;
    }

    sleep(Duration::from_millis(config.page.settle_delay_ms)).await;

    let markup = page.content().await?;
    let analysis = analyze_page(&markup, &config.selectors, &config.base_currency);

    if let Some(marker) = &analysis.blocked {
        return Err(ScrapeError::Blocked(marker.clone()));
    }

    let embedded = match (&config.embedded_path, analysis.sold_out) {
        (Some(path), false) => embedded::extract_price(&markup, &[path.as_str()]),
        _ => None,
    };

    let screenshot = if config.screenshot.enabled && !analysis.sold_out && !analysis.rooms.is_empty() {
        match page.screenshot_png(config.screenshot.full_page).await {
            Ok(png) => Some(base64::engine::general_purpose::STANDARD.encode(png)),
            Err(e) => {
                warn!("Screenshot capture failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(DatePage {
        analysis,
        embedded,
        screenshot,
    })
}

/// Turn one page visit into results for `date`.
fn build_results(date: NaiveDate, page: DatePage, config: &ScraperConfig, meta: ResultMeta) -> Vec<ScraperResult> {
    if page.analysis.sold_out {
        debug!("No availability for {}", date);
        return vec![ScraperResult::unavailable(
            date,
            config.primary_room_type(),
            config.base_currency.clone(),
            meta,
        )];
    }

    let mut results = Vec::new();
    for room in page.analysis.rooms {
        if !config.wants(room.room_type) {
            continue;
        }

        let (price, raw) = match &page.embedded {
            Some(found) => (
                found.value,
                RawExtraction {
                    source: PriceSource::EmbeddedJson,
                    matched_path: Some(found.path.clone()),
                    block_text: room.text.clone(),
                },
            ),
            None => match room.price {
                Some(price) => (
                    price,
                    RawExtraction {
                        source: PriceSource::Selector,
                        matched_path: None,
                        block_text: room.text.clone(),
                    },
                ),
                None => continue,
            },
        };

        let mut result = ScraperResult::available(date, room.room_type, price, room.currency, meta.clone());
        result.screenshot = page.screenshot.clone();
        if config.debug_extraction {
            result.raw = Some(raw);
        }
        results.push(result);
    }

    if results.is_empty() {
        debug!("No qualifying room blocks for {}", date);
        results.push(ScraperResult::unavailable(
            date,
            config.primary_room_type(),
            config.base_currency.clone(),
            meta,
        ));
    }

    results
}

/// Listing URL for a one-night stay starting on `check_in`.
pub fn build_date_url(base: &Url, check_in: NaiveDate) -> String {
    let check_out = check_in + Days::new(1);
    let mut params = vec![
        ("checkin", check_in.format("%Y-%m-%d").to_string()),
        ("checkout", check_out.format("%Y-%m-%d").to_string()),
    ];
    params.extend(OCCUPANCY.iter().map(|(k, v)| (*k, v.to_string())));

    let kept = base
        .query_pairs()
        .filter(|(key, _)| !params.iter().any(|(name, _)| &**key == *name))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();

    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(params);
    url.to_string()
}
