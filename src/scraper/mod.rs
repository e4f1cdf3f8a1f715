pub mod config;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod strategy;
pub mod types;

// Re-export common types
pub use config::{RetrySettings, ScraperConfig};
pub use error::ScrapeError;
pub use orchestrator::{PriceHistory, ScrapeOrchestrator};
pub use retry::RetryPolicy;
pub use strategy::FetchStrategy;
pub use types::{HotelTarget, RoomType, ScraperContext, ScraperResult};
