//! Per-date hotel room price collection from booking pages.
//!
//! A [`ScrapeOrchestrator`] picks a [`FetchStrategy`] by name and runs it over
//! a forward date window, returning one [`ScraperResult`] per date and room
//! type.

pub mod browser;
pub mod extract;
pub mod proxy;
pub mod scraper;
pub mod utils;

pub use scraper::{
    FetchStrategy, HotelTarget, RoomType, ScrapeError, ScrapeOrchestrator, ScraperConfig, ScraperContext,
    ScraperResult,
};
