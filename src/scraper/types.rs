use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::scraper::config::ScraperConfig;

/// Rate category observed on a listing page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    RoomOnly,
    WithBreakfast,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::RoomOnly => "room_only",
            RoomType::WithBreakfast => "with_breakfast",
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoomType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "room_only" => Ok(RoomType::RoomOnly),
            "with_breakfast" => Ok(RoomType::WithBreakfast),
            other => Err(format!("unknown room type: {}", other)),
        }
    }
}

/// Identity of the hotel being scraped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelTarget {
    pub id: i64,
    pub name: String,
    pub booking_url: String,
}

/// Execution context for a single scrape run
#[derive(Debug, Clone)]
pub struct ScraperContext {
    /// Resolved configuration for the run
    pub config: ScraperConfig,

    /// First check-in date of the window
    pub start_date: NaiveDate,

    /// Target hotel
    pub hotel: HotelTarget,

    /// Persisted scan this run belongs to, if any
    pub run_id: Option<i64>,
}

impl ScraperContext {
    pub fn new(config: ScraperConfig, start_date: NaiveDate, hotel: HotelTarget) -> Self {
        Self {
            config,
            start_date,
            hotel,
            run_id: None,
        }
    }

    pub fn with_run_id(mut self, run_id: i64) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Where an extracted price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    EmbeddedJson,
    Selector,
}

/// Extraction diagnostics attached when `debug_extraction` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    pub source: PriceSource,
    pub matched_path: Option<String>,
    pub block_text: String,
}

/// Change-detection enrichment against a previously recorded price
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeFields {
    pub previous_price: Option<f64>,
    pub price_change: Option<f64>,
    pub price_change_percent: Option<f64>,
    pub change_detected: bool,
}

/// Run metadata attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMeta {
    /// Strategy that produced the result
    pub fetcher_used: String,

    /// Proxy slot in use, if any
    pub proxy_used: Option<usize>,

    /// Number of attempts made for the date (at least 1)
    pub attempts: u32,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,

    pub timestamp: DateTime<Utc>,

    pub error: Option<String>,
}

/// One observation for a (date, room type) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperResult {
    pub date: NaiveDate,
    pub room_type: RoomType,
    pub price: Option<f64>,
    pub currency: String,
    pub available: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawExtraction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeFields>,

    pub meta: ResultMeta,
}

impl ScraperResult {
    /// A priced, available observation.
    pub fn available(
        date: NaiveDate,
        room_type: RoomType,
        price: f64,
        currency: impl Into<String>,
        meta: ResultMeta,
    ) -> Self {
        Self {
            date,
            room_type,
            price: Some(price),
            currency: currency.into(),
            available: true,
            screenshot: None,
            raw: None,
            change: None,
            meta,
        }
    }

    /// An unavailable observation. Never carries a price.
    pub fn unavailable(
        date: NaiveDate,
        room_type: RoomType,
        currency: impl Into<String>,
        meta: ResultMeta,
    ) -> Self {
        Self {
            date,
            room_type,
            price: None,
            currency: currency.into(),
            available: false,
            screenshot: None,
            raw: None,
            change: None,
            meta,
        }
    }

    /// Date in ISO `YYYY-MM-DD` form
    pub fn date_iso(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// Price in integer minor currency units (e.g. agorot, cents)
    pub fn price_minor_units(&self) -> Option<i64> {
        self.price.map(|price| (price * 100.0).round() as i64)
    }

    pub fn is_error(&self) -> bool {
        self.meta.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ResultMeta {
        ResultMeta {
            fetcher_used: "browser".to_string(),
            proxy_used: None,
            attempts: 1,
            duration_ms: 10,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn test_unavailable_has_no_price() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let result = ScraperResult::unavailable(date, RoomType::RoomOnly, "ILS", meta());

        assert!(!result.available);
        assert_eq!(result.price, None);
        assert_eq!(result.price_minor_units(), None);
        assert_eq!(result.date_iso(), "2026-03-01");
    }

    #[test]
    fn test_minor_units_rounding() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let result = ScraperResult::available(date, RoomType::WithBreakfast, 649.99, "ILS", meta());

        assert_eq!(result.price_minor_units(), Some(64999));
    }

    #[test]
    fn test_room_type_round_trip_names() {
        assert_eq!("room_only".parse::<RoomType>(), Ok(RoomType::RoomOnly));
        assert_eq!(RoomType::WithBreakfast.to_string(), "with_breakfast");
        assert!("suite".parse::<RoomType>().is_err());

        let yaml = serde_yaml::to_string(&RoomType::WithBreakfast).unwrap();
        assert_eq!(yaml.trim(), "with_breakfast");
    }
}
