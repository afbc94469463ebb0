//! Repository for scraped listing rows.
//!
//! Writes are append-only: a listing URL may appear many times, once per
//! scrape, and `query_latest` resolves the newest observation per URL at
//! read time. Saves run as multi-row batch inserts, one transaction per
//! batch; records missing required fields are excluded before any
//! statement runs so they never poison a batch.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::listing::{ListingRecord, Price};
use crate::domain::protocol::QueryLatestListingsParams;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored input attributes are not valid JSON: {0}")]
    CorruptAttributes(#[from] serde_json::Error),
}

/// Counts reported back to the caller after a batch save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub listings_saved_count: u64,
    pub listings_not_saved_count: u64,
}

const INSERT_COLUMNS: &str = "input_attributes, listing_url, listing_title, brand, model, \
     price, price_on_request, currency, movement, case_material, production_year, \
     condition, location, reference_number, scraped_at";
const BINDS_PER_ROW: usize = 15;

#[derive(Clone)]
pub struct ListingRepository {
    pool: Arc<SqlitePool>,
    batch_size: usize,
}

impl ListingRepository {
    pub fn new(pool: SqlitePool, batch_size: usize) -> Self {
        Self {
            pool: Arc::new(pool),
            batch_size: batch_size.max(1),
        }
    }

    /// Persist listings in transactional batches of `batch_size` rows.
    ///
    /// Records without a URL, title, and price are counted as not saved and
    /// excluded before any statement runs, so they never abort a batch. Each
    /// batch commits or fails as a whole: a statement failure costs that
    /// batch's rows and the next batch proceeds, while connection-level
    /// failures propagate. `scraped_at` is assigned at insert time, one
    /// instant per batch. An empty input returns zero counts without
    /// touching the pool.
    pub async fn save_listings(
        &self,
        listings: &[ListingRecord],
    ) -> Result<SaveOutcome, RepositoryError> {
        if listings.is_empty() {
            return Ok(SaveOutcome {
                listings_saved_count: 0,
                listings_not_saved_count: 0,
            });
        }

        let (valid, skipped): (Vec<&ListingRecord>, Vec<&ListingRecord>) =
            listings.iter().partition(|l| l.has_required_fields());

        for listing in &skipped {
            warn!(url = %listing.listing_url, "skipping listing with missing required fields");
        }

        if valid.is_empty() {
            return Ok(SaveOutcome {
                listings_saved_count: 0,
                listings_not_saved_count: skipped.len() as u64,
            });
        }

        let mut saved: u64 = 0;

        for chunk in valid.chunks(self.batch_size) {
            match self.insert_chunk(chunk).await {
                Ok(rows) => {
                    saved += rows;
                    debug!(rows, "inserted listing chunk");
                }
                Err(RepositoryError::Database(e)) if is_connection_failure(&e) => {
                    return Err(RepositoryError::Database(e));
                }
                Err(e) => {
                    warn!(rows = chunk.len(), error = %e, "listing chunk failed, continuing");
                }
            }
        }

        let outcome = SaveOutcome {
            listings_saved_count: saved,
            listings_not_saved_count: listings.len() as u64 - saved,
        };
        info!(
            saved = outcome.listings_saved_count,
            not_saved = outcome.listings_not_saved_count,
            "saved listing batch"
        );
        Ok(outcome)
    }

    async fn insert_chunk(&self, chunk: &[&ListingRecord]) -> Result<u64, RepositoryError> {
        // One insert-time instant shared by every row of this batch.
        let scraped_at = Utc::now();
        let placeholders =
            vec![format!("({})", vec!["?"; BINDS_PER_ROW].join(", ")); chunk.len()].join(", ");
        let sql = format!("INSERT INTO listings ({INSERT_COLUMNS}) VALUES {placeholders}");

        let mut query = sqlx::query(&sql);
        for listing in chunk {
            let attributes_json = listing.input_attributes.as_ref().map(canonical_json);
            let (price, price_on_request) = match listing.price {
                Some(Price::Amount(amount)) => (Some(amount), false),
                Some(Price::OnRequest) => (None, true),
                None => (None, false),
            };

            query = query
                .bind(attributes_json)
                .bind(&listing.listing_url)
                .bind(&listing.listing_title)
                .bind(&listing.brand)
                .bind(&listing.model)
                .bind(price)
                .bind(price_on_request)
                .bind(&listing.currency)
                .bind(&listing.movement)
                .bind(&listing.case_material)
                .bind(listing.production_year)
                .bind(&listing.condition)
                .bind(&listing.location)
                .bind(&listing.reference_number)
                .bind(scraped_at);
        }

        let mut tx = self.pool.begin().await?;
        let result = query.execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Fetch the newest observation of each listing URL for one scrape
    /// fingerprint, with optional filters applied after deduplication.
    ///
    /// Filters run on the newest row only: an older row matching the filter
    /// never resurfaces when the newest one fails it.
    pub async fn query_latest(
        &self,
        params: &QueryLatestListingsParams,
    ) -> Result<Vec<ListingRecord>, RepositoryError> {
        let fingerprint = params.input_attributes.as_ref().map(canonical_json);

        let mut conditions = vec!["recency_rank = 1".to_string()];

        if params.target_condition.is_some() {
            conditions.push("condition = ? COLLATE NOCASE".to_string());
        }
        if params.target_year_min.is_some() {
            conditions.push("production_year >= ?".to_string());
        }
        if params.target_year_max.is_some() {
            conditions.push("production_year <= ?".to_string());
        }
        if params.target_location.is_some() {
            conditions.push("location = ? COLLATE NOCASE".to_string());
        }
        let exclude_keywords: Vec<String> = params
            .exclude_keywords
            .iter()
            .flatten()
            .map(|kw| format!("%{}%", kw.to_lowercase()))
            .collect();
        for _ in &exclude_keywords {
            conditions
                .push("(listing_title IS NULL OR LOWER(listing_title) NOT LIKE ?)".to_string());
        }

        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT *,
                       ROW_NUMBER() OVER (
                           PARTITION BY listing_url
                           ORDER BY scraped_at DESC, id DESC
                       ) AS recency_rank
                FROM listings
                WHERE ((? IS NULL AND input_attributes IS NULL) OR input_attributes = ?)
            )
            WHERE {}
            ORDER BY price IS NULL, price ASC, id ASC
            LIMIT ?
            "#,
            conditions.join(" AND ")
        );

        let mut query = sqlx::query(&sql).bind(&fingerprint).bind(&fingerprint);
        if let Some(condition) = &params.target_condition {
            query = query.bind(condition);
        }
        if let Some(year_min) = params.target_year_min {
            query = query.bind(year_min);
        }
        if let Some(year_max) = params.target_year_max {
            query = query.bind(year_max);
        }
        if let Some(location) = &params.target_location {
            query = query.bind(location);
        }
        for keyword in &exclude_keywords {
            query = query.bind(keyword);
        }
        query = query.bind(params.limit);

        let rows = query.fetch_all(&*self.pool).await?;

        let mut listings = Vec::with_capacity(rows.len());
        for row in rows {
            listings.push(row_to_listing(&row)?);
        }
        debug!(count = listings.len(), "query_latest returned listings");
        Ok(listings)
    }
}

/// Pool and transport errors end the save; statement errors cost one batch.
fn is_connection_failure(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)
    )
}

/// Canonical JSON text for fingerprint comparison. serde_json renders
/// object keys in sorted order, so equal attribute sets serialize equally.
fn canonical_json(value: &Value) -> String {
    value.to_string()
}

fn row_to_listing(row: &sqlx::sqlite::SqliteRow) -> Result<ListingRecord, RepositoryError> {
    let attributes_json: Option<String> = row.get("input_attributes");
    let input_attributes = attributes_json
        .map(|json| serde_json::from_str(&json))
        .transpose()?;

    let amount: Option<f64> = row.get("price");
    let price_on_request: bool = row.get("price_on_request");
    let price = if price_on_request {
        Some(Price::OnRequest)
    } else {
        amount.map(Price::Amount)
    };

    let scraped_at: DateTime<Utc> = row.get("scraped_at");

    Ok(ListingRecord {
        input_attributes,
        listing_url: row.get("listing_url"),
        listing_title: row.get("listing_title"),
        brand: row.get("brand"),
        model: row.get("model"),
        price,
        currency: row.get("currency"),
        movement: row.get("movement"),
        case_material: row.get("case_material"),
        production_year: row.get("production_year"),
        condition: row.get("condition"),
        location: row.get("location"),
        reference_number: row.get("reference_number"),
        scraped_at: Some(scraped_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use serde_json::json;
    use tempfile::tempdir;

    async fn test_repository(dir: &tempfile::TempDir) -> ListingRepository {
        let db_path = dir.path().join("repo_test.db");
        let database_url = format!("sqlite:{}", db_path.display());
        let db = DatabaseConnection::new(&database_url, 2).await.unwrap();
        db.migrate().await.unwrap();
        ListingRepository::new(db.pool().clone(), 2)
    }

    fn record(url: &str, title: &str, price: Price) -> ListingRecord {
        ListingRecord {
            input_attributes: None,
            listing_url: url.to_string(),
            listing_title: Some(title.to_string()),
            brand: None,
            model: None,
            price: Some(price),
            currency: Some("$".to_string()),
            movement: None,
            case_material: None,
            production_year: None,
            condition: None,
            location: None,
            reference_number: None,
            scraped_at: None,
        }
    }

    #[tokio::test]
    async fn empty_save_reports_zero_counts() {
        let dir = tempdir().unwrap();
        let repo = test_repository(&dir).await;

        let outcome = repo.save_listings(&[]).await.unwrap();
        assert_eq!(outcome.listings_saved_count, 0);
        assert_eq!(outcome.listings_not_saved_count, 0);
    }

    #[tokio::test]
    async fn closed_pool_is_a_hard_failure() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("closed.db");
        let database_url = format!("sqlite:{}", db_path.display());
        let db = DatabaseConnection::new(&database_url, 2).await.unwrap();
        db.migrate().await.unwrap();
        let repo = ListingRepository::new(db.pool().clone(), 50);
        db.close().await;

        let err = repo
            .save_listings(&[record("/a", "Rolex Submariner", Price::Amount(1000.0))])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Database(_)));
    }

    #[tokio::test]
    async fn malformed_records_do_not_poison_the_batch() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("malformed.db");
        let database_url = format!("sqlite:{}", db_path.display());
        let db = DatabaseConnection::new(&database_url, 2).await.unwrap();
        db.migrate().await.unwrap();
        // Batch size exceeds the input so all five records share one
        // transaction; the malformed one must not abort it.
        let repo = ListingRepository::new(db.pool().clone(), 50);

        let mut listings = vec![
            record("/a", "Rolex Submariner", Price::Amount(1000.0)),
            record("/b", "Omega Seamaster", Price::Amount(2000.0)),
            record("/c", "Tudor Black Bay", Price::Amount(3000.0)),
            record("/d", "Cartier Tank", Price::OnRequest),
        ];
        let mut broken = record("/e", "No price", Price::Amount(0.0));
        broken.price = None;
        listings.push(broken);

        let outcome = repo.save_listings(&listings).await.unwrap();
        assert_eq!(outcome.listings_saved_count, 4);
        assert_eq!(outcome.listings_not_saved_count, 1);

        let results = repo
            .query_latest(&QueryLatestListingsParams::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn rows_in_one_batch_share_one_insert_timestamp() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("stamp.db");
        let database_url = format!("sqlite:{}", db_path.display());
        let db = DatabaseConnection::new(&database_url, 2).await.unwrap();
        db.migrate().await.unwrap();
        let repo = ListingRepository::new(db.pool().clone(), 50);

        repo.save_listings(&[
            record("/a", "Omega Seamaster", Price::Amount(1000.0)),
            record("/b", "Omega Railmaster", Price::Amount(2000.0)),
            record("/c", "Omega Globemaster", Price::Amount(3000.0)),
        ])
        .await
        .unwrap();

        let distinct = sqlx::query("SELECT DISTINCT scraped_at FROM listings")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(distinct.len(), 1);
    }

    #[tokio::test]
    async fn newest_observation_wins_per_url() {
        let dir = tempdir().unwrap();
        let repo = test_repository(&dir).await;

        repo.save_listings(&[record("/a", "Rolex Daytona", Price::Amount(30000.0))])
            .await
            .unwrap();
        repo.save_listings(&[record("/a", "Rolex Daytona", Price::Amount(29500.0))])
            .await
            .unwrap();

        let results = repo
            .query_latest(&QueryLatestListingsParams::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].price, Some(Price::Amount(29500.0)));
    }

    #[tokio::test]
    async fn fingerprint_partitions_query_results() {
        let dir = tempdir().unwrap();
        let repo = test_repository(&dir).await;

        let mut tagged = record("/a", "Rolex GMT", Price::Amount(15000.0));
        tagged.input_attributes = Some(json!({"Brand": "Rolex"}));
        repo.save_listings(&[tagged]).await.unwrap();
        repo.save_listings(&[record("/b", "Omega Speedmaster", Price::Amount(4000.0))])
            .await
            .unwrap();

        let untagged = repo
            .query_latest(&QueryLatestListingsParams::default())
            .await
            .unwrap();
        assert_eq!(untagged.len(), 1);
        assert_eq!(untagged[0].listing_url, "/b");

        let params = QueryLatestListingsParams {
            input_attributes: Some(json!({"Brand": "Rolex"})),
            ..Default::default()
        };
        let tagged = repo.query_latest(&params).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].listing_url, "/a");
    }

    #[tokio::test]
    async fn filters_apply_to_the_newest_row_only() {
        let dir = tempdir().unwrap();
        let repo = test_repository(&dir).await;

        let mut old = record("/a", "Rolex Submariner", Price::Amount(10000.0));
        old.condition = Some("New".to_string());
        repo.save_listings(&[old]).await.unwrap();

        let mut newer = record("/a", "Rolex Submariner", Price::Amount(9500.0));
        newer.condition = Some("Used".to_string());
        repo.save_listings(&[newer]).await.unwrap();

        // The newest row is "Used"; the older "New" row must not resurface.
        let params = QueryLatestListingsParams {
            target_condition: Some("new".to_string()),
            ..Default::default()
        };
        assert!(repo.query_latest(&params).await.unwrap().is_empty());

        let params = QueryLatestListingsParams {
            target_condition: Some("used".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.query_latest(&params).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn year_range_and_keyword_filters() {
        let dir = tempdir().unwrap();
        let repo = test_repository(&dir).await;

        let mut a = record("/a", "Rolex Submariner Replica Box", Price::Amount(500.0));
        a.production_year = Some(2015);
        let mut b = record("/b", "Rolex Submariner Date", Price::Amount(12000.0));
        b.production_year = Some(2019);
        let mut c = record("/c", "Rolex Submariner", Price::Amount(11000.0));
        c.production_year = Some(1995);
        repo.save_listings(&[a, b, c]).await.unwrap();

        let params = QueryLatestListingsParams {
            target_year_min: Some(2010),
            target_year_max: Some(2020),
            exclude_keywords: Some(vec!["replica".to_string()]),
            ..Default::default()
        };
        let results = repo.query_latest(&params).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].listing_url, "/b");
    }

    #[tokio::test]
    async fn results_sort_by_price_with_on_request_last() {
        let dir = tempdir().unwrap();
        let repo = test_repository(&dir).await;

        repo.save_listings(&[
            record("/a", "Omega Seamaster", Price::Amount(4000.0)),
            record("/b", "Cartier Crash", Price::OnRequest),
            record("/c", "Tudor Black Bay", Price::Amount(2800.0)),
        ])
        .await
        .unwrap();

        let results = repo
            .query_latest(&QueryLatestListingsParams::default())
            .await
            .unwrap();
        let urls: Vec<&str> = results.iter().map(|l| l.listing_url.as_str()).collect();
        assert_eq!(urls, vec!["/c", "/a", "/b"]);
        assert_eq!(results[2].price, Some(Price::OnRequest));
    }

    #[tokio::test]
    async fn limit_caps_result_count() {
        let dir = tempdir().unwrap();
        let repo = test_repository(&dir).await;

        let listings: Vec<ListingRecord> = (0..5)
            .map(|i| {
                record(
                    &format!("/watch-{i}"),
                    "Seiko Presage",
                    Price::Amount(100.0 * (i + 1) as f64),
                )
            })
            .collect();
        repo.save_listings(&listings).await.unwrap();

        let params = QueryLatestListingsParams {
            limit: 2,
            ..Default::default()
        };
        let results = repo.query_latest(&params).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].price, Some(Price::Amount(100.0)));
    }
}
