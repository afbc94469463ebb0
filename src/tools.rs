//! Action-dispatch tools wrapping the scraping and storage layers.

pub mod database_tool;
pub mod scraper_tool;

pub use database_tool::DatabaseTool;
pub use scraper_tool::ChronoScraperTool;

use async_trait::async_trait;

use crate::domain::protocol::{ToolRequest, ToolResponse};

/// A named tool dispatching on the request's action tag.
///
/// Unknown actions, malformed parameters and downstream failures all answer
/// with an error envelope; `execute` itself never fails.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, request: ToolRequest) -> ToolResponse;
}
