//! Statistics over the output files of a harvest
//!
//! This module reads the documents a run leaves in the data directory and
//! summarizes them for the `--stats` mode.

use crate::output::records::{MetadataRecord, ThemeFormat, ThemeRecord};
use crate::output::traits::{FailureIndex, OutputResult};
use crate::output::writer::read_document;
use crate::output::{METADATA_FAILURES_FILE, METADATA_FILE, PACKAGE_FAILURES_FILE, THEMES_FILE};
use crate::state::retry_jobs;
use std::collections::HashMap;
use std::path::Path;

/// Output statistics summary
#[derive(Debug, Clone, Default)]
pub struct OutputStatistics {
    /// Number of scraped listings, None if the file is missing
    pub metadata_records: Option<usize>,

    /// Number of extracted themes, None if the file is missing
    pub theme_records: Option<usize>,

    /// Extracted themes per document format
    pub themes_by_format: HashMap<ThemeFormat, usize>,

    /// Number of distinct packages that contributed themes
    pub theme_packages: usize,

    /// Listing pages that could not be scraped, keyed by reason
    pub metadata_failures: FailureIndex,

    /// Packages that yielded no themes, keyed by reason
    pub package_failures: FailureIndex,

    /// Jobs a retry run would re-queue
    pub retryable_jobs: usize,
}

/// Loads statistics from the documents in `data_dir`
///
/// Missing files are treated as empty; unreadable files are errors.
pub fn load_statistics(data_dir: &Path) -> OutputResult<OutputStatistics> {
    let mut stats = OutputStatistics::default();

    let metadata_path = data_dir.join(METADATA_FILE);
    if metadata_path.exists() {
        let records: Vec<MetadataRecord> = read_document(&metadata_path)?;
        stats.metadata_records = Some(records.len());
    }

    let themes_path = data_dir.join(THEMES_FILE);
    if themes_path.exists() {
        let records: Vec<ThemeRecord> = read_document(&themes_path)?;
        for record in &records {
            *stats.themes_by_format.entry(record.format).or_insert(0) += 1;
        }
        let mut packages: Vec<&str> = records.iter().map(|r| r.display_name.as_str()).collect();
        packages.sort_unstable();
        packages.dedup();
        stats.theme_packages = packages.len();
        stats.theme_records = Some(records.len());
    }

    let metadata_failures_path = data_dir.join(METADATA_FAILURES_FILE);
    if metadata_failures_path.exists() {
        stats.metadata_failures = read_document(&metadata_failures_path)?;
    }

    let package_failures_path = data_dir.join(PACKAGE_FAILURES_FILE);
    if package_failures_path.exists() {
        stats.package_failures = read_document(&package_failures_path)?;
    }

    stats.retryable_jobs = retry_jobs(&stats.package_failures).len();

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &OutputStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    match stats.metadata_records {
        Some(count) => println!("  Listings scraped: {}", count),
        None => println!("  Listings scraped: (no metadata file)"),
    }
    match stats.theme_records {
        Some(count) => println!(
            "  Themes extracted: {} from {} packages",
            count, stats.theme_packages
        ),
        None => println!("  Themes extracted: (no themes file)"),
    }
    for (format, count) in &stats.themes_by_format {
        println!("    {:?}: {}", format, count);
    }
    println!();

    print_failures("Metadata failures", &stats.metadata_failures);
    print_failures("Package failures", &stats.package_failures);

    println!(
        "Retry-eligible packages: {} (run with --retry-failed to re-queue them)",
        stats.retryable_jobs
    );
}

fn print_failures(title: &str, index: &FailureIndex) {
    if index.is_empty() {
        return;
    }

    let total: usize = index.values().map(Vec::len).sum();
    println!("{} ({}):", title, total);

    // Sort reasons by count (descending)
    let mut reasons: Vec<_> = index.iter().collect();
    reasons.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    for (reason, jobs) in reasons {
        println!("  {}: {}", reason, jobs.len());
    }
    println!();
}
