//! Infrastructure layer: configuration, logging, fetching, parsing and storage.

pub mod config;
pub mod database_connection;
pub mod fetch;
pub mod listing_repository;
pub mod logging;
pub mod parsing;

pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use fetch::{FetchController, FetchError, RawPage};
pub use listing_repository::{ListingRepository, RepositoryError, SaveOutcome};
pub use parsing::ListingParser;
