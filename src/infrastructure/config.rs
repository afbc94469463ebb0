//! Typed application configuration.
//!
//! Settings are resolved once at startup with the precedence: environment
//! override > config file value > built-in default. Each component owns a
//! named struct with documented defaults instead of a loose key/value map.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};
use url::Url;

/// Built-in defaults, applied when neither environment nor config file
/// provide a value.
pub mod defaults {
    pub const LOG_LEVEL: &str = "info";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 60;

    pub const BASE_URL: &str = "https://www.chrono24.com";
    pub const SEARCH_PATH: &str = "/search/index.htm";
    pub const REQUEST_DELAY_SECONDS: f64 = 3.0;
    pub const MAX_FETCH_ATTEMPTS: u32 = 3;
    pub const KNOWN_BRANDS: &str = "rolex,cartier,patek philippe,omega";
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

    pub const DATABASE_URL: &str = "sqlite:data/listings.db";
    pub const DB_MAX_CONNECTIONS: u32 = 10;
    pub const DB_BATCH_SIZE: usize = 50;
    pub const QUERY_LIMIT: i64 = 50;

    pub const USER_AGENTS: [&str; 4] = [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    ];

    /// Consent/cookie overlay containers, tried in order.
    pub const CONSENT_SELECTORS: [&str; 2] = ["dialog.gdpr-layer", "div.cookie-consent-layer"];
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub scraper: ScraperConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub log_level: String,

    /// Timeout for a single HTTP navigation in seconds
    pub request_timeout_seconds: u64,
}

/// Settings for the fetch controller and the extraction engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Base URL of the target marketplace; relative listing links are
    /// joined against it.
    pub base_url: String,

    /// Search endpoint path appended to `base_url`
    pub search_path: String,

    /// Base delay between fetch attempts in seconds (linear backoff)
    pub request_delay_seconds: f64,

    /// Maximum fetch attempts per URL (>= 1)
    pub max_fetch_attempts: u32,

    /// User-agent pool; one is picked pseudo-randomly per attempt
    pub user_agents: Vec<String>,

    /// Comma-separated list of known brands for title disambiguation
    pub known_brands: String,

    /// Accept-Language header presented with every fetch
    pub accept_language: String,

    /// Referer header for fetches, if any
    pub referer: Option<String>,

    /// Consent/cookie overlay selectors, tried in order
    pub consent_selectors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database URL
    pub url: String,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// Records per insert transaction
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is not set
    pub level: String,

    /// Emit JSON formatted logs instead of plain text
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable daily-rolling file output under `logs/`
    pub file_output: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            scraper: ScraperConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::LOG_LEVEL.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            search_path: defaults::SEARCH_PATH.to_string(),
            request_delay_seconds: defaults::REQUEST_DELAY_SECONDS,
            max_fetch_attempts: defaults::MAX_FETCH_ATTEMPTS,
            user_agents: defaults::USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            known_brands: defaults::KNOWN_BRANDS.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            referer: Some(defaults::BASE_URL.to_string()),
            consent_selectors: defaults::CONSENT_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
            batch_size: defaults::DB_BATCH_SIZE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
        }
    }
}

impl ScraperConfig {
    /// Known brands as a lowercased, trimmed set; empty entries dropped.
    pub fn known_brands_set(&self) -> Vec<String> {
        self.known_brands
            .split(',')
            .map(|brand| brand.trim().to_lowercase())
            .filter(|brand| !brand.is_empty())
            .collect()
    }
}

impl AppConfig {
    /// Load configuration from an optional JSON file, then apply environment
    /// overrides and validate.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                let config: Self = serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?;
                info!(path = %path.display(), "loaded configuration file");
                config
            }
            Some(path) => {
                warn!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables named `SECTION_KEY` override file values.
    fn apply_env_overrides(&mut self) {
        if let Some(value) = env_string("GENERAL_LOG_LEVEL") {
            self.general.log_level = value;
        }
        if let Some(value) = env_u64("GENERAL_REQUEST_TIMEOUT_SECONDS") {
            self.general.request_timeout_seconds = value;
        }

        if let Some(value) = env_string("SCRAPER_BASE_URL") {
            self.scraper.base_url = value;
        }
        if let Some(value) = env_string("SCRAPER_SEARCH_PATH") {
            self.scraper.search_path = value;
        }
        if let Some(value) = env_f64("SCRAPER_REQUEST_DELAY_SECONDS") {
            self.scraper.request_delay_seconds = value;
        }
        if let Some(value) = env_u32("SCRAPER_MAX_FETCH_ATTEMPTS") {
            self.scraper.max_fetch_attempts = value;
        }
        if let Some(value) = env_string("SCRAPER_KNOWN_BRANDS") {
            self.scraper.known_brands = value;
        }
        if let Some(value) = env_string("SCRAPER_ACCEPT_LANGUAGE") {
            self.scraper.accept_language = value;
        }

        if let Some(value) = env_string("DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = env_u32("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = value;
        }
        if let Some(value) = env_usize("DATABASE_BATCH_SIZE") {
            self.database.batch_size = value;
        }

        if let Some(value) = env_string("LOGGING_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = env_bool("LOGGING_JSON_FORMAT") {
            self.logging.json_format = value;
        }
        if let Some(value) = env_bool("LOGGING_FILE_OUTPUT") {
            self.logging.file_output = value;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.scraper.max_fetch_attempts < 1 {
            anyhow::bail!("scraper.max_fetch_attempts must be at least 1");
        }
        if self.database.batch_size < 1 {
            anyhow::bail!("database.batch_size must be at least 1");
        }
        Url::parse(&self.scraper.base_url)
            .with_context(|| format!("invalid scraper.base_url '{}'", self.scraper.base_url))?;
        Ok(())
    }
}

// Typed accessors per setting kind. A present-but-unparseable value is
// logged and ignored rather than silently coerced.

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_u32(name: &str) -> Option<u32> {
    parse_env(name)
}

fn env_u64(name: &str) -> Option<u64> {
    parse_env(name)
}

fn env_usize(name: &str) -> Option<usize> {
    parse_env(name)
}

fn env_f64(name: &str) -> Option<f64> {
    parse_env(name)
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(name, raw, "ignoring unparseable environment override");
            None
        }
    }
}

/// Boolean parsing accepts case-insensitive true/1/t/y/yes/on.
fn env_bool(name: &str) -> Option<bool> {
    let raw = env_string(name)?;
    Some(parse_bool(&raw))
}

pub(crate) fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "t" | "y" | "yes" | "on"
    )
}
