//! Output traits and error types
//!
//! Results, checkpoints and failure ledgers all leave the process through a
//! [`DocumentWriter`]. The writer receives a tagged [`Document`] and chooses
//! the encoding per record kind.

use crate::output::records::{MetadataRecord, ThemeRecord};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to persist output: {0}")]
    Persist(String),

    #[error("Failed to encode or decode document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Failure ledger keyed by reason, each holding the jobs that failed that way
pub type FailureIndex = BTreeMap<String, Vec<String>>;

/// A document ready to be persisted
#[derive(Debug, Clone, Copy)]
pub enum Document<'a> {
    Metadata(&'a [MetadataRecord]),
    Themes(&'a [ThemeRecord]),
    Failures(&'a FailureIndex),
    JobList(&'a [String]),
}

impl Document<'_> {
    /// Number of entries in the document
    pub fn len(&self) -> usize {
        match self {
            Self::Metadata(records) => records.len(),
            Self::Themes(records) => records.len(),
            Self::Failures(index) => index.values().map(Vec::len).sum(),
            Self::JobList(jobs) => jobs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sink for persisted documents
///
/// Implementations must replace any previous document with the same name
/// and never leave a half-written file behind.
pub trait DocumentWriter: Send + Sync {
    /// Writes `document` under `file_name`, returning the final path
    fn write(&self, file_name: &str, document: Document<'_>) -> OutputResult<PathBuf>;
}
