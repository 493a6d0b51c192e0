//! Output module for harvest records and documents
//!
//! This module handles:
//! - The record types produced by the pipeline
//! - Persisting results, checkpoints and failure ledgers as documents
//! - Summarizing the output files of previous runs

mod records;
pub mod stats;
mod traits;
mod writer;

pub use records::{FailureRecord, MetadataRecord, Stage, ThemeFormat, ThemeRecord};
pub use stats::{load_statistics, print_statistics, OutputStatistics};
pub use traits::{Document, DocumentWriter, FailureIndex, OutputError, OutputResult};
pub use writer::{ensure_output_dir, read_document, JsonDocumentWriter};

/// Listing URLs to harvest, produced by the listing collector
pub const THEME_URLS_FILE: &str = "theme_urls.json";

/// Scraped listing metadata
pub const METADATA_FILE: &str = "theme_metadata.json";

/// Listing pages that could not be scraped
pub const METADATA_FAILURES_FILE: &str = "failed_metadata.json";

/// Extracted theme documents
pub const THEMES_FILE: &str = "themes.json";

/// Packages that yielded no themes, read back in retry mode
pub const PACKAGE_FAILURES_FILE: &str = "failed_vsix.json";

/// Checkpoint of [`METADATA_FILE`]
pub const METADATA_CHECKPOINT: &str = "log.json";

/// Checkpoint of [`METADATA_FAILURES_FILE`]
pub const METADATA_FAILURES_CHECKPOINT: &str = "failed_metadata_log.json";

/// Checkpoint of [`THEMES_FILE`]
pub const THEMES_CHECKPOINT: &str = "vsix_log.json";

/// Checkpoint of [`PACKAGE_FAILURES_FILE`]
pub const PACKAGE_FAILURES_CHECKPOINT: &str = "failed_vsix_log.json";
