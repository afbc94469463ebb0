// SQLite connection pool and schema management using sqlx

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if let Some(parent) = Path::new(db_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the listings table and its indexes.
    ///
    /// listing_url carries no unique constraint: every scrape appends new
    /// rows and the newest observation per URL is resolved at read time.
    pub async fn migrate(&self) -> Result<()> {
        let create_listings_sql = r#"
            CREATE TABLE IF NOT EXISTS listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                input_attributes TEXT,
                listing_url TEXT NOT NULL,
                listing_title TEXT,
                brand TEXT,
                model TEXT,
                price REAL,
                price_on_request INTEGER NOT NULL DEFAULT 0,
                currency TEXT,
                movement TEXT,
                case_material TEXT,
                production_year INTEGER,
                condition TEXT,
                location TEXT,
                reference_number TEXT,
                scraped_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_listings_brand ON listings (brand);
            CREATE INDEX IF NOT EXISTS idx_listings_model ON listings (model);
            CREATE INDEX IF NOT EXISTS idx_listings_url_scraped_at ON listings (listing_url, scraped_at);
        "#;

        sqlx::query(create_listings_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        info!("database schema is up to date");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn connects_and_creates_missing_file() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("test.db");
        let database_url = format!("sqlite:{}", db_path.display());

        let db = DatabaseConnection::new(&database_url, 2).await?;
        assert!(!db.pool().is_closed());
        assert!(db_path.exists());

        db.close().await;
        assert!(db.pool().is_closed());
        Ok(())
    }

    #[tokio::test]
    async fn migration_creates_listings_table() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migration.db");
        let database_url = format!("sqlite:{}", db_path.display());

        let db = DatabaseConnection::new(&database_url, 2).await?;
        db.migrate().await?;

        let table =
            sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='listings'")
                .fetch_optional(db.pool())
                .await?;
        assert!(table.is_some());

        // Re-running the migration must be a no-op
        db.migrate().await?;
        Ok(())
    }
}
