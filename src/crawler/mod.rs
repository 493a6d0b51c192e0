//! Harvesting pipeline
//!
//! This module contains the core harvesting logic, including:
//! - Listing page scraping and listing URL collection
//! - Package download, unpacking and theme extraction
//! - Worker pools and checkpoint loggers
//! - Overall run coordination

pub mod artifact_analyzer;
mod checkpoint;
mod coordinator;
mod listing;
pub mod package_fetcher;
pub mod page_analyzer;
mod wait;
mod worker;

pub use artifact_analyzer::{AnalysisFailure, AnalysisResult};
pub use checkpoint::{CheckpointLogger, CheckpointTarget};
pub use coordinator::{Coordinator, PoolReport, RunMode, RunReport};
pub use listing::{collect_listing_urls, extract_listing_urls, LISTING_CARD};
pub use package_fetcher::{DownloadFailure, DownloadResult, PackageFetcher, UnpackedPackage};
pub use page_analyzer::extract_metadata;
pub use wait::{wait_for, TimedOut};
pub use worker::{JobHandler, JobOutcome, MetadataHandler, PackageHandler, WorkerContext, WorkerPool};
