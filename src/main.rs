//! Command-line pipeline: scrape a search query, persist the results and
//! print the deduplicated latest listings.
//!
//! Usage: chrono-harvester <search query> [config.json]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chrono_harvester::domain::protocol::{ToolRequest, ToolResponse};
use chrono_harvester::infrastructure::config::AppConfig;
use chrono_harvester::infrastructure::database_connection::DatabaseConnection;
use chrono_harvester::infrastructure::listing_repository::ListingRepository;
use chrono_harvester::infrastructure::logging::init_logging;
use chrono_harvester::tools::database_tool::{
    DatabaseTool, ACTION_QUERY_LATEST_LISTINGS, ACTION_SAVE_LISTINGS,
};
use chrono_harvester::tools::scraper_tool::{ChronoScraperTool, ACTION_SCRAPE_LISTINGS};
use chrono_harvester::tools::Tool;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(query) = args.next() else {
        eprintln!("usage: chrono-harvester <search query> [config.json]");
        std::process::exit(2);
    };
    let config_path = args.next().map(PathBuf::from);

    let config = AppConfig::load(config_path.as_deref()).await?;
    init_logging(&config.logging)?;

    let db = DatabaseConnection::new(&config.database.url, config.database.max_connections)
        .await
        .context("failed to open database")?;
    db.migrate().await.context("failed to run migrations")?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            signal_cancel.cancel();
        }
    });

    let scraper = ChronoScraperTool::new(&config, cancel.clone())?;
    let database =
        DatabaseTool::new(ListingRepository::new(db.pool().clone(), config.database.batch_size));

    info!(query = %query, "starting scrape pipeline");

    let scrape_response = scraper
        .execute(ToolRequest {
            tool_name: scraper.name().to_string(),
            action: ACTION_SCRAPE_LISTINGS.to_string(),
            params: json!({"search_query_string": query}),
            context: None,
        })
        .await;
    print_envelope("scrape_listings", &scrape_response)?;
    let Some(scraped) = scrape_response.data else {
        db.close().await;
        bail!("scrape failed, nothing to persist");
    };

    let save_response = database
        .execute(ToolRequest {
            tool_name: database.name().to_string(),
            action: ACTION_SAVE_LISTINGS.to_string(),
            params: json!({"listings_data": scraped["scraped_items"]}),
            context: None,
        })
        .await;
    print_envelope("save_listings", &save_response)?;

    let query_response = database
        .execute(ToolRequest {
            tool_name: database.name().to_string(),
            action: ACTION_QUERY_LATEST_LISTINGS.to_string(),
            params: json!({}),
            context: None,
        })
        .await;
    print_envelope("query_latest_listings", &query_response)?;

    db.close().await;

    if !save_response.is_success() || !query_response.is_success() {
        bail!("pipeline finished with errors");
    }
    Ok(())
}

fn print_envelope(action: &str, response: &ToolResponse) -> Result<()> {
    let rendered = serde_json::to_string_pretty(response)?;
    println!("== {action} ==\n{rendered}");
    Ok(())
}
