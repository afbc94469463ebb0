//! Database tool: batch persistence and latest-wins querying.

use async_trait::async_trait;
use tracing::{error, info};

use crate::domain::protocol::{
    QueryLatestListingsData, QueryLatestListingsParams, SaveListingsData, SaveListingsParams,
    ToolRequest, ToolResponse,
};
use crate::infrastructure::listing_repository::ListingRepository;
use crate::tools::Tool;

pub const DATABASE_TOOL_NAME: &str = "DatabaseTool";
pub const ACTION_SAVE_LISTINGS: &str = "save_listings";
pub const ACTION_QUERY_LATEST_LISTINGS: &str = "query_latest_listings";

/// Persists scraped listings and answers latest-wins queries over them.
pub struct DatabaseTool {
    repository: ListingRepository,
}

impl DatabaseTool {
    pub fn new(repository: ListingRepository) -> Self {
        Self { repository }
    }

    async fn save_listings(&self, request: &ToolRequest) -> ToolResponse {
        let params: SaveListingsParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(e) => return ToolResponse::error(format!("invalid save_listings params: {e}")),
        };

        // Context attributes stamp provenance on records that carry none.
        let mut listings = params.listings_data;
        if let Some(attributes) = request.original_input_attributes() {
            for listing in &mut listings {
                if listing.input_attributes.is_none() {
                    listing.input_attributes = Some(attributes.clone());
                }
            }
        }

        match self.repository.save_listings(&listings).await {
            Ok(outcome) => {
                info!(
                    saved = outcome.listings_saved_count,
                    not_saved = outcome.listings_not_saved_count,
                    "save_listings completed"
                );
                let data = SaveListingsData {
                    listings_saved_count: outcome.listings_saved_count,
                    listings_not_saved_count: outcome.listings_not_saved_count,
                };
                match serde_json::to_value(data) {
                    Ok(data) => ToolResponse::success(data),
                    Err(e) => ToolResponse::error(format!("could not encode save outcome: {e}")),
                }
            }
            Err(e) => {
                error!(error = %e, "save_listings failed");
                ToolResponse::error(format!("save_listings failed: {e}"))
            }
        }
    }

    async fn query_latest_listings(&self, request: &ToolRequest) -> ToolResponse {
        let mut params: QueryLatestListingsParams =
            match serde_json::from_value(request.params.clone()) {
                Ok(params) => params,
                Err(e) => {
                    return ToolResponse::error(format!(
                        "invalid query_latest_listings params: {e}"
                    ))
                }
            };

        // The fingerprint may arrive in params or ride along in the context.
        if params.input_attributes.is_none() {
            params.input_attributes = request.original_input_attributes();
        }

        match self.repository.query_latest(&params).await {
            Ok(listings) => {
                info!(count = listings.len(), "query_latest_listings completed");
                match serde_json::to_value(QueryLatestListingsData { listings }) {
                    Ok(data) => ToolResponse::success(data),
                    Err(e) => ToolResponse::error(format!("could not encode listings: {e}")),
                }
            }
            Err(e) => {
                error!(error = %e, "query_latest_listings failed");
                ToolResponse::error(format!("query_latest_listings failed: {e}"))
            }
        }
    }
}

#[async_trait]
impl Tool for DatabaseTool {
    fn name(&self) -> &str {
        DATABASE_TOOL_NAME
    }

    async fn execute(&self, request: ToolRequest) -> ToolResponse {
        match request.action.as_str() {
            ACTION_SAVE_LISTINGS => self.save_listings(&request).await,
            ACTION_QUERY_LATEST_LISTINGS => self.query_latest_listings(&request).await,
            other => ToolResponse::error(format!(
                "unknown action '{other}' for tool {DATABASE_TOOL_NAME}"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use serde_json::json;
    use tempfile::tempdir;

    async fn test_tool(dir: &tempfile::TempDir) -> DatabaseTool {
        let db_path = dir.path().join("tool_test.db");
        let database_url = format!("sqlite:{}", db_path.display());
        let db = DatabaseConnection::new(&database_url, 2).await.unwrap();
        db.migrate().await.unwrap();
        DatabaseTool::new(ListingRepository::new(db.pool().clone(), 50))
    }

    fn listing_json(url: &str, price: serde_json::Value) -> serde_json::Value {
        json!({
            "listing_url": url,
            "listing_title": "Rolex Submariner",
            "price": price,
            "currency": "$"
        })
    }

    #[tokio::test]
    async fn save_reports_counts_and_query_reads_back() {
        let dir = tempdir().unwrap();
        let tool = test_tool(&dir).await;

        let response = tool
            .execute(ToolRequest {
                tool_name: DATABASE_TOOL_NAME.to_string(),
                action: ACTION_SAVE_LISTINGS.to_string(),
                params: json!({"listings_data": [
                    listing_json("/a", json!(1000.0)),
                    listing_json("/b", json!("price on request")),
                    {"listing_url": "/c", "listing_title": "No price"},
                ]}),
                context: None,
            })
            .await;

        assert!(response.is_success(), "{:?}", response.error_message);
        let data: SaveListingsData = serde_json::from_value(response.data.unwrap()).unwrap();
        assert_eq!(data.listings_saved_count, 2);
        assert_eq!(data.listings_not_saved_count, 1);

        let response = tool
            .execute(ToolRequest {
                tool_name: DATABASE_TOOL_NAME.to_string(),
                action: ACTION_QUERY_LATEST_LISTINGS.to_string(),
                params: json!({}),
                context: None,
            })
            .await;
        assert!(response.is_success());
        let data: QueryLatestListingsData =
            serde_json::from_value(response.data.unwrap()).unwrap();
        assert_eq!(data.listings.len(), 2);
    }

    #[tokio::test]
    async fn context_attributes_stamp_saved_rows() {
        let dir = tempdir().unwrap();
        let tool = test_tool(&dir).await;

        let context = json!({"original_input_attributes": {"Brand": "Rolex"}});
        let response = tool
            .execute(ToolRequest {
                tool_name: DATABASE_TOOL_NAME.to_string(),
                action: ACTION_SAVE_LISTINGS.to_string(),
                params: json!({"listings_data": [listing_json("/a", json!(1000.0))]}),
                context: Some(context.clone()),
            })
            .await;
        assert!(response.is_success());

        // Only the matching fingerprint sees the row.
        let response = tool
            .execute(ToolRequest {
                tool_name: DATABASE_TOOL_NAME.to_string(),
                action: ACTION_QUERY_LATEST_LISTINGS.to_string(),
                params: json!({}),
                context: Some(context),
            })
            .await;
        let data: QueryLatestListingsData =
            serde_json::from_value(response.data.unwrap()).unwrap();
        assert_eq!(data.listings.len(), 1);
        assert_eq!(
            data.listings[0].input_attributes,
            Some(json!({"Brand": "Rolex"}))
        );

        let response = tool
            .execute(ToolRequest {
                tool_name: DATABASE_TOOL_NAME.to_string(),
                action: ACTION_QUERY_LATEST_LISTINGS.to_string(),
                params: json!({}),
                context: None,
            })
            .await;
        let data: QueryLatestListingsData =
            serde_json::from_value(response.data.unwrap()).unwrap();
        assert!(data.listings.is_empty());
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let dir = tempdir().unwrap();
        let tool = test_tool(&dir).await;

        let response = tool
            .execute(ToolRequest {
                tool_name: DATABASE_TOOL_NAME.to_string(),
                action: "drop_tables".to_string(),
                params: json!({}),
                context: None,
            })
            .await;
        assert!(!response.is_success());
        assert!(response.error_message.unwrap().contains("unknown action"));
    }

    #[tokio::test]
    async fn malformed_params_are_rejected() {
        let dir = tempdir().unwrap();
        let tool = test_tool(&dir).await;

        let response = tool
            .execute(ToolRequest {
                tool_name: DATABASE_TOOL_NAME.to_string(),
                action: ACTION_SAVE_LISTINGS.to_string(),
                params: json!({"listings_data": "not a list"}),
                context: None,
            })
            .await;
        assert!(!response.is_success());
    }
}
