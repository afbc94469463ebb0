//! Scraper tool: search URL construction, fetch, extraction.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::protocol::{
    ScrapeListingsParams, ScrapedListingsData, ToolRequest, ToolResponse,
};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::fetch::FetchController;
use crate::infrastructure::parsing::ListingParser;
use crate::tools::Tool;

pub const SCRAPER_TOOL_NAME: &str = "ChronoScraperTool";
pub const ACTION_SCRAPE_LISTINGS: &str = "scrape_listings";

/// Fetches one search-result page and extracts its listings.
pub struct ChronoScraperTool {
    fetcher: FetchController,
    parser: ListingParser,
    base_url: String,
    search_path: String,
    cancel: CancellationToken,
}

impl ChronoScraperTool {
    pub fn new(config: &AppConfig, cancel: CancellationToken) -> anyhow::Result<Self> {
        let fetcher =
            FetchController::new(&config.scraper, config.general.request_timeout_seconds)?;
        let parser = ListingParser::new(&config.scraper)?;
        Ok(Self {
            fetcher,
            parser,
            base_url: config.scraper.base_url.trim_end_matches('/').to_string(),
            search_path: config.scraper.search_path.clone(),
            cancel,
        })
    }

    /// Deterministic search URL for a query string; spaces become '+'.
    pub fn search_url(&self, query: &str) -> String {
        let query = query.trim().replace(' ', "+");
        format!(
            "{}{}?dosearch=true&query={}",
            self.base_url, self.search_path, query
        )
    }

    async fn scrape_listings(&self, request: &ToolRequest) -> ToolResponse {
        let params: ScrapeListingsParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(e) => return ToolResponse::error(format!("invalid scrape_listings params: {e}")),
        };

        let url = self.search_url(&params.search_query_string);
        info!(query = %params.search_query_string, url = %url, "scraping listings");

        let page = match self.fetcher.fetch(&url, &self.cancel).await {
            Ok(page) => page,
            Err(e) => {
                error!(url = %url, error = %e, "fetch failed");
                return ToolResponse::error(format!("fetch failed: {e}"));
            }
        };

        // Extraction walks the whole document; keep it off the async I/O path.
        let parser = self.parser.clone();
        let input_attributes = request.original_input_attributes();
        let html = page.html;
        let extracted = tokio::task::spawn_blocking(move || {
            parser.extract(&html, input_attributes.as_ref())
        })
        .await;

        let scraped_items = match extracted {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "extraction task failed");
                return ToolResponse::error(format!("extraction failed: {e}"));
            }
        };

        if scraped_items.is_empty() {
            warn!(url = %url, "scrape produced no listings");
        }

        match serde_json::to_value(ScrapedListingsData { scraped_items }) {
            Ok(data) => ToolResponse::success(data),
            Err(e) => ToolResponse::error(format!("could not encode scraped listings: {e}")),
        }
    }
}

#[async_trait]
impl Tool for ChronoScraperTool {
    fn name(&self) -> &str {
        SCRAPER_TOOL_NAME
    }

    async fn execute(&self, request: ToolRequest) -> ToolResponse {
        match request.action.as_str() {
            ACTION_SCRAPE_LISTINGS => self.scrape_listings(&request).await,
            other => ToolResponse::error(format!(
                "unknown action '{other}' for tool {SCRAPER_TOOL_NAME}"
            )),
        }
    }
}
