use async_trait::async_trait;

use crate::scraper::config::ScraperConfig;
use crate::scraper::error::ScrapeError;
use crate::scraper::types::{ScraperContext, ScraperResult};

/// A way of fetching prices for one hotel across a date window.
///
/// Implementations isolate failures per date: an exhausted date becomes an
/// unavailable result carrying the error. `Err` is reserved for problems no
/// retry can fix, such as an unusable configuration.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Registry key
    fn name(&self) -> &str;

    async fn fetch(
        &self,
        url: &str,
        config: &ScraperConfig,
        context: &ScraperContext,
    ) -> Result<Vec<ScraperResult>, ScrapeError>;
}
