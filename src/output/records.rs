//! Record types produced by the harvesting pipeline
//!
//! Records are immutable once created and serialize with camelCase keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Listing metadata scraped from a marketplace item page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub url: String,
    pub name: String,
    pub author: String,
    pub verified: bool,
    pub install_count: u64,
    pub rating_count: u64,
    pub average_rating: f64,
    pub description: String,
    pub price: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub repository_url: Option<String>,
}

/// Document format of a contributed theme file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThemeFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "tmTheme")]
    TmTheme,
}

/// One color theme contributed by a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeRecord {
    /// Package display name, or the unpacked path when the manifest has none
    pub display_name: String,

    /// `vs`, `vs-dark`, `hc-black`... as declared by the manifest, or empty
    pub ui_theme: String,

    /// Theme file path relative to the manifest directory
    pub relative_path: String,

    pub format: ThemeFormat,

    /// The parsed theme document
    pub contents: serde_json::Value,
}

/// Pipeline stage at which a job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Listing page scraping
    Metadata,
    /// Navigation, download and unpacking of the package
    Download,
    /// Manifest and theme file parsing
    Analysis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "Metadata",
            Self::Download => "Download",
            Self::Analysis => "Analysis",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job that did not yield records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub job: String,
    pub stage: Stage,
    pub reason: String,
}

impl FailureRecord {
    pub fn new(job: impl Into<String>, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            stage,
            reason: reason.into(),
        }
    }

    /// Ledger key grouping jobs that failed the same way, e.g. `[Download] Download timed out`
    pub fn key(&self) -> String {
        format!("[{}] {}", self.stage, self.reason)
    }
}
