use anyhow::{Context, Result};
use chrono::{Duration as DateSpan, Local, NaiveDate};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use hotel_price_scout::browser::session::DEFAULT_WEBDRIVER_URL;
use hotel_price_scout::browser::steps::presets;
use hotel_price_scout::browser::{BrowserFetchStrategy, WebDriverLauncher};
use hotel_price_scout::proxy::{self, ProxyRotator};
use hotel_price_scout::{HotelTarget, ScrapeOrchestrator, ScraperConfig, ScraperContext, ScraperResult};

use crate::cli::config::ScoutProfile;
use crate::cli::{ProxyArgs, ScrapeArgs};

/// Results of one hotel, as written to the output file
#[derive(Debug, Serialize)]
struct HotelReport {
    hotel: HotelTarget,
    results: Vec<ScraperResult>,
}

/// Scrape every requested hotel and write the results
pub async fn scrape(args: ScrapeArgs) -> Result<()> {
    let profile = ScoutProfile::resolve(args.profile.as_deref())?;
    let base = apply_overrides(profile.scraper.clone(), &args);

    let urls = if args.urls.is_empty() {
        if base.hotel_url.is_empty() {
            anyhow::bail!("No hotel URL given and the profile does not set one");
        }
        vec![base.hotel_url.clone()]
    } else {
        args.urls.clone()
    };

    let webdriver = args
        .webdriver
        .clone()
        .or(profile.webdriver_url)
        .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());
    info!("Using WebDriver at {}", webdriver);

    let mut orchestrator = ScrapeOrchestrator::empty();
    orchestrator.register(Arc::new(BrowserFetchStrategy::new(Arc::new(WebDriverLauncher::new(webdriver)))));
    let orchestrator = &orchestrator;

    let start = args.start.unwrap_or_else(|| Local::now().date_naive());
    let concurrency = base.rate_limit.max_concurrent.max(1);

    let jobs = urls.iter().enumerate().map(|(i, url)| {
        let config = ScraperConfig {
            hotel_url: url.clone(),
            ..base.clone()
        };
        let hotel = HotelTarget {
            id: args.hotel_id + i as i64,
            name: args.hotel_name.clone().unwrap_or_else(|| hotel_label(url)),
            booking_url: url.clone(),
        };
        let mut context = ScraperContext::new(config.clone(), start, hotel);
        if let Some(run_id) = args.run_id {
            context = context.with_run_id(run_id);
        }

        async move {
            let outcome = orchestrator.scrape(&config, &context).await;
            (context.hotel, outcome)
        }
    });

    let mut outcomes = stream::iter(jobs)
        .buffer_unordered(concurrency)
        .collect::<Vec<_>>()
        .await;
    outcomes.sort_by_key(|(hotel, _)| hotel.id);

    let mut reports = Vec::new();
    let mut failures = 0;
    for (hotel, outcome) in outcomes {
        match outcome {
            Ok(results) => reports.push(HotelReport { hotel, results }),
            Err(e) => {
                error!("Scrape of {} failed: {}", hotel.booking_url, e);
                failures += 1;
            }
        }
    }

    if reports.is_empty() {
        anyhow::bail!("All {} scrape(s) failed", failures);
    }

    let json = serde_json::to_string_pretty(&reports).context("Failed to serialize results")?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).context(format!("Failed to write results: {}", path.display()))?;
            info!("Results written to: {}", path.display());
        }
        None => println!("{}", json),
    }

    // stdout carries the JSON unless --output is set
    for report in &reports {
        let summary = format!(
            "Hotel: {} ({})\n{}",
            report.hotel.name,
            report.hotel.id,
            Summary::from_results(&report.results).render()
        );
        if args.output.is_some() {
            print!("{}", summary);
        } else {
            eprint!("{}", summary);
        }
    }

    if failures > 0 {
        warn!("{} hotel(s) could not be scraped", failures);
    }

    Ok(())
}

/// Command-line values win over the profile
fn apply_overrides(mut config: ScraperConfig, args: &ScrapeArgs) -> ScraperConfig {
    if let Some(days) = args.days {
        config.days_forward = days;
    }

    if !args.room_types.is_empty() {
        config.room_types = args.room_types.clone();
    }

    if let Some(proxy) = args.proxy.descriptor() {
        config.proxies = vec![proxy];
    }

    config
}

/// Page slug used when no hotel name is given
fn hotel_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            let slug = u.path_segments()?.last()?.split('.').next()?.to_string();
            (!slug.is_empty()).then_some(slug)
        })
        .unwrap_or_else(|| url.to_string())
}

/// Counts and price range over one hotel's results
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub results: usize,
    pub priced: usize,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub average_price: Option<f64>,
    pub failed_dates: Vec<NaiveDate>,
}

impl Summary {
    pub fn from_results(results: &[ScraperResult]) -> Self {
        let prices = results.iter().filter_map(|r| r.price).collect::<Vec<_>>();
        let failed_dates = results
            .iter()
            .filter(|r| r.is_error())
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            results: results.len(),
            priced: prices.len(),
            min_price: prices.iter().copied().reduce(f64::min),
            max_price: prices.iter().copied().reduce(f64::max),
            average_price: (!prices.is_empty()).then(|| prices.iter().sum::<f64>() / prices.len() as f64),
            failed_dates,
        }
    }

    fn render(&self) -> String {
        let mut out = format!("Results: {} ({} priced)\n", self.results, self.priced);
        if let (Some(min), Some(max), Some(avg)) = (self.min_price, self.max_price, self.average_price) {
            out.push_str(&format!("Price range: {:.2} - {:.2} (average {:.2})\n", min, max, avg));
        }
        if !self.failed_dates.is_empty() {
            out.push_str("Failed dates:\n");
            for date in &self.failed_dates {
                out.push_str(&format!("  - {}\n", date));
            }
        }
        out
    }
}

/// List all available profiles
pub fn list_profiles() -> Result<()> {
    let profiles = ScoutProfile::list_profiles()?;

    println!("Available profiles:");
    for profile in profiles {
        println!("  - {}", profile);
    }

    Ok(())
}

/// Show a profile, creating it first when `init` is set
pub fn manage_profile(name: &str, init: bool) -> Result<()> {
    match ScoutProfile::load_profile(name) {
        Ok(profile) => {
            if init {
                warn!("Profile '{}' already exists, leaving it unchanged", name);
            }
            println!("Profile: {}", name);
            println!("{}", profile.to_yaml()?);
        }
        Err(_) if init => {
            let path = ScoutProfile::default().save_as_profile(name)?;
            println!("Created default profile: {} ({})", name, path.display());
        }
        Err(e) => {
            return Err(e.context(format!("Run `scout profile {} --init` to create it", name)));
        }
    }

    Ok(())
}

/// Show the default profile
pub fn show_default_profile() -> Result<()> {
    let profile = ScoutProfile::load_default()?;
    println!("Default profile:");
    println!("{}", profile.to_yaml()?);

    Ok(())
}

/// Print the preset booking flow as YAML
pub fn print_steps(check_in: Option<NaiveDate>, check_out: Option<NaiveDate>, adults: u32) -> Result<()> {
    let check_in = check_in.unwrap_or_else(|| Local::now().date_naive());
    let check_out = check_out.unwrap_or(check_in + DateSpan::days(1));
    if check_out <= check_in {
        anyhow::bail!("Check-out {} must be after check-in {}", check_out, check_in);
    }

    let steps = presets::complete_booking_flow(
        &check_in.format("%Y-%m-%d").to_string(),
        &check_out.format("%Y-%m-%d").to_string(),
        adults,
    );
    let yaml = serde_yaml::to_string(&steps).context("Failed to serialize steps")?;
    println!("{}", yaml);

    Ok(())
}

/// Probe every configured proxy against `target`
pub async fn proxy_check(profile: Option<&str>, flags: &ProxyArgs, target: &str, timeout_secs: u64) -> Result<()> {
    let mut proxies = ScoutProfile::resolve(profile)?.scraper.proxies;
    if let Some(proxy) = flags.descriptor() {
        proxies = vec![proxy];
    }

    for proxy in &proxies {
        proxy.validate().context("Invalid proxy configuration")?;
    }

    let rotator = ProxyRotator::new(proxies).context("No proxies configured")?;
    let timeout = Duration::from_secs(timeout_secs);

    let mut reachable = 0;
    for (i, descriptor) in rotator.proxies().iter().enumerate() {
        let server = rotator
            .browser_proxy(descriptor)
            .map(|p| p.server)
            .unwrap_or_else(|| "disabled".to_string());

        if !descriptor.enabled {
            println!("  [{}] {:?} {}: skipped", i, descriptor.provider, server);
            continue;
        }

        let ok = proxy::probe(descriptor, target, timeout).await;
        if ok {
            reachable += 1;
        }
        println!(
            "  [{}] {:?} {}: {}",
            i,
            descriptor.provider,
            server,
            if ok { "ok" } else { "unreachable" }
        );
    }

    if reachable == 0 {
        anyhow::bail!("No proxy could reach {}", target);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hotel_price_scout::scraper::types::ResultMeta;
    use hotel_price_scout::RoomType;

    fn meta(error: Option<&str>) -> ResultMeta {
        ResultMeta {
            fetcher_used: "browser".to_string(),
            proxy_used: None,
            attempts: 1,
            duration_ms: 5,
            timestamp: Utc::now(),
            error: error.map(str::to_string),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[test]
    fn test_summary_over_results() {
        let results = vec![
            ScraperResult::available(day(1), RoomType::RoomOnly, 800.0, "ILS", meta(None)),
            ScraperResult::available(day(1), RoomType::WithBreakfast, 950.0, "ILS", meta(None)),
            ScraperResult::available(day(2), RoomType::RoomOnly, 650.0, "ILS", meta(None)),
            ScraperResult::unavailable(day(3), RoomType::RoomOnly, "ILS", meta(Some("timed out"))),
            ScraperResult::unavailable(day(4), RoomType::RoomOnly, "ILS", meta(None)),
        ];

        let summary = Summary::from_results(&results);
        assert_eq!(summary.results, 5);
        assert_eq!(summary.priced, 3);
        assert_eq!(summary.min_price, Some(650.0));
        assert_eq!(summary.max_price, Some(950.0));
        assert!((summary.average_price.unwrap() - 800.0).abs() < 1e-9);
        assert_eq!(summary.failed_dates, vec![day(3)]);

        let text = summary.render();
        assert!(text.starts_with("Results: 5 (3 priced)\n"));
        assert!(text.contains("Price range: 650.00 - 950.00 (average 800.00)"));
        assert!(text.ends_with("Failed dates:\n  - 2026-05-03\n"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::from_results(&[]);
        assert_eq!(summary.priced, 0);
        assert!(summary.average_price.is_none());
        assert!(summary.failed_dates.is_empty());
    }

    #[test]
    fn test_hotel_label_from_url() {
        assert_eq!(
            hotel_label("https://www.booking.com/hotel/il/dan-panorama-tel-aviv.he.html"),
            "dan-panorama-tel-aviv"
        );
        assert_eq!(hotel_label("not a url"), "not a url");
    }
}
