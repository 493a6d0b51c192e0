//! Theme Harvester: a marketplace color-theme harvester
//!
//! This crate scrapes theme listings from the extension marketplace, downloads
//! the packaged `.vsix` archives, and extracts the color-theme documents they
//! contribute. Work is spread over pools of browser-driven workers that share
//! job queues, result sinks and failure ledgers, with periodic checkpoints to disk.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Theme Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser session error: {0}")]
    Session(#[from] browser::SessionError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Element '{selector}' not found on {url}")]
    MissingElement { url: String, selector: String },

    #[error("Malformed {field} on {url}: '{value}'")]
    MalformedField {
        url: String,
        field: &'static str,
        value: String,
    },

    #[error("Invalid CSS selector: {0}")]
    Selector(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
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

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Listing URL has no itemName parameter: {0}")]
    MissingItemName(String),
}

/// Result type alias for Theme Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, RunMode, RunReport};
pub use output::{FailureRecord, MetadataRecord, Stage, ThemeFormat, ThemeRecord};
pub use state::{FailureLedger, FetchState, JobQueue, ResultSink};
