//! JSON document writer
//!
//! Writes go through a temp file in the target directory that is then
//! persisted over the destination, so readers only ever see whole documents.

use crate::output::traits::{Document, DocumentWriter, OutputError, OutputResult};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes pretty-printed JSON documents into a directory
#[derive(Debug, Clone)]
pub struct JsonDocumentWriter {
    dir: PathBuf,
}

impl JsonDocumentWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn encode(document: Document<'_>) -> serde_json::Result<Vec<u8>> {
        match document {
            Document::Metadata(records) => serde_json::to_vec_pretty(records),
            Document::Themes(records) => serde_json::to_vec_pretty(records),
            Document::Failures(index) => serde_json::to_vec_pretty(index),
            Document::JobList(jobs) => serde_json::to_vec_pretty(jobs),
        }
    }
}

impl DocumentWriter for JsonDocumentWriter {
    fn write(&self, file_name: &str, document: Document<'_>) -> OutputResult<PathBuf> {
        let encoded = Self::encode(document)?;
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(file_name);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&encoded)?;
        tmp.flush()?;

        tmp.persist(&target)
            .map_err(|e| OutputError::Persist(format!("{}: {}", target.display(), e.error)))?;
        Ok(target)
    }
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> OutputResult<()> {
    if dir.exists() {
        if !fs::metadata(dir)?.is_dir() {
            return Err(OutputError::Persist(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Reads a JSON document written by a previous run
pub fn read_document<T: DeserializeOwned>(path: &Path) -> OutputResult<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
