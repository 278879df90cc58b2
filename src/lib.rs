//! Tumblr-Scraper: an incremental blog mirror
//!
//! This crate walks a list of blogs through a paginated API, resuming each
//! blog from the highest post id seen by the previous run. Progress cursors and
//! the authenticated session's cookies are kept in a local SQLite file.

pub mod config;
pub mod crawler;
pub mod session;
pub mod storage;

use thiserror::Error;

/// Main error type for Tumblr-Scraper operations
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Failed to fetch blog '{blog}': {source}")]
    Fetch {
        blog: String,
        source: crawler::FetchError,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Tumblr-Scraper operations
pub type Result<T> = std::result::Result<T, ScraperError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_batch, BatchOutcome, BatchRunner, CrawlReport, CrawlState};
pub use session::{Session, StoredCookie};
pub use storage::{SqliteStorage, Storage, StorageError};
