//! Request/response envelope and action payloads for tool dispatch.
//!
//! Every tool exposes one `execute` entry point that receives a
//! [`ToolRequest`] and answers with a [`ToolResponse`]; the action tag
//! selects the operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::listing::ListingRecord;

/// Request dispatched to a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool_name: String,
    pub action: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl ToolRequest {
    /// Input attributes threaded through the request context, if the caller
    /// supplied them.
    pub fn original_input_attributes(&self) -> Option<Value> {
        self.context
            .as_ref()?
            .get("original_input_attributes")
            .cloned()
            .filter(|value| !value.is_null())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Response returned by every tool action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResponse {
    pub fn success(data: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: Some(data),
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Parameters for the `scrape_listings` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeListingsParams {
    pub search_query_string: String,
}

/// Data returned by `scrape_listings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedListingsData {
    pub scraped_items: Vec<ListingRecord>,
}

/// Parameters for the `save_listings` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveListingsParams {
    pub listings_data: Vec<ListingRecord>,
}

/// Data returned by `save_listings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveListingsData {
    pub listings_saved_count: u64,
    pub listings_not_saved_count: u64,
}

fn default_query_limit() -> i64 {
    crate::infrastructure::config::defaults::QUERY_LIMIT
}

/// Parameters for the `query_latest_listings` action.
///
/// `input_attributes` is the fingerprint the stored provenance must match;
/// absent means "rows stored without attributes". All other filters are
/// optional and AND-ed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLatestListingsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_attributes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_year_min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_year_max: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_keywords: Option<Vec<String>>,
    #[serde(default = "default_query_limit")]
    pub limit: i64,
}

impl Default for QueryLatestListingsParams {
    fn default() -> Self {
        Self {
            input_attributes: None,
            target_condition: None,
            target_year_min: None,
            target_year_max: None,
            target_location: None,
            exclude_keywords: None,
            limit: default_query_limit(),
        }
    }
}

/// Data returned by `query_latest_listings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLatestListingsData {
    pub listings: Vec<ListingRecord>,
}
