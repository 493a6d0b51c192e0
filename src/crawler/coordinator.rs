//! Harvest coordinator - main run orchestration logic
//!
//! This module contains the top-level run that coordinates all aspects of
//! a harvest, including:
//! - Preparing the temp directory and seeding the job queues
//! - Running the metadata and package pools side by side
//! - Checkpointing each pool's progress
//! - Handling interrupts
//! - Writing the final outputs and the run report

use crate::browser::{ChromeSessionFactory, SessionFactory};
use crate::config::Config;
use crate::crawler::checkpoint::{CheckpointLogger, CheckpointTarget};
use crate::crawler::worker::{JobHandler, MetadataHandler, PackageHandler, WorkerPool};
use crate::output::{
    read_document, Document, DocumentWriter, FailureIndex, JsonDocumentWriter, MetadataRecord,
    ThemeRecord, METADATA_CHECKPOINT, METADATA_FAILURES_CHECKPOINT, METADATA_FAILURES_FILE,
    METADATA_FILE, PACKAGE_FAILURES_CHECKPOINT, PACKAGE_FAILURES_FILE, THEMES_CHECKPOINT,
    THEMES_FILE, THEME_URLS_FILE,
};
use crate::state::{is_terminal_reason, retry_jobs, FailureLedger, JobQueue, ResultSink};
use crate::Result;
use chrono::{DateTime, Utc};
use indicatif::MultiProgress;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Where the jobs of a run come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Harvest every URL in `theme_urls.json`
    Normal,

    /// Re-download the retryable packages of `failed_vsix.json`
    ///
    /// Metadata scraping is skipped and new themes are added to the existing
    /// `themes.json`.
    RetryFailed,
}

impl RunMode {
    pub fn from_config(config: &Config) -> Self {
        if config.run.retry_failed {
            Self::RetryFailed
        } else {
            Self::Normal
        }
    }
}

/// Accounting of one worker pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    pub workers: usize,
    pub seeded: usize,
    pub popped: usize,
    pub completed: usize,
    pub failed: usize,
    pub abandoned: usize,
    pub records: usize,
}

impl PoolReport {
    fn collect<T>(
        workers: usize,
        queue: &JobQueue,
        sink: &ResultSink<T>,
        ledger: &FailureLedger,
        abandoned: usize,
    ) -> Self {
        Self {
            workers,
            seeded: queue.seeded(),
            popped: queue.popped(),
            completed: sink.jobs(),
            failed: ledger.len(),
            abandoned,
            records: sink.len(),
        }
    }

    /// Jobs that never made it out of the queue
    pub fn unprocessed(&self) -> usize {
        self.seeded - self.popped
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Whether the run was stopped before its queues drained
    pub interrupted: bool,

    /// None when metadata scraping did not run
    pub metadata: Option<PoolReport>,

    /// None when package analysis did not run
    pub packages: Option<PoolReport>,
}

impl RunReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Logs the report at info level
    pub fn log(&self) {
        tracing::info!(
            "Run ({:?}) finished in {}s{}",
            self.mode,
            self.duration().num_seconds(),
            if self.interrupted { " (interrupted)" } else { "" }
        );
        for (name, pool) in [("Metadata", &self.metadata), ("Packages", &self.packages)] {
            if let Some(pool) = pool {
                tracing::info!(
                    "{}: {} seeded, {} completed, {} failed, {} abandoned, {} unprocessed, {} records",
                    name,
                    pool.seeded,
                    pool.completed,
                    pool.failed,
                    pool.abandoned,
                    pool.unprocessed(),
                    pool.records
                );
            }
        }
    }
}

/// Main harvest coordinator structure
pub struct Coordinator {
    config: Config,
    mode: RunMode,
    factory: Arc<dyn SessionFactory>,
    data_writer: Arc<dyn DocumentWriter>,
    log_writer: Arc<dyn DocumentWriter>,
    stop: Arc<AtomicBool>,
    progress: Option<MultiProgress>,
}

impl Coordinator {
    /// Creates a coordinator that drives Chrome and writes JSON documents
    /// into the configured data and log directories
    pub fn new(config: Config, mode: RunMode) -> Self {
        Self {
            factory: Arc::new(ChromeSessionFactory::new(config.browser.clone())),
            data_writer: Arc::new(JsonDocumentWriter::new(&config.paths.data_dir)),
            log_writer: Arc::new(JsonDocumentWriter::new(&config.paths.log_dir)),
            stop: Arc::new(AtomicBool::new(false)),
            progress: Some(MultiProgress::new()),
            config,
            mode,
        }
    }

    /// Replaces the browser used by the workers
    pub fn with_session_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Disables the progress bars
    pub fn without_progress(mut self) -> Self {
        self.progress = None;
        self
    }

    /// Flag that makes workers exit after their current job when set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn scrapes_metadata(&self) -> bool {
        self.config.stages.scrape_metadata && self.mode == RunMode::Normal
    }

    fn analyzes_packages(&self) -> bool {
        self.config.stages.analyze_packages
    }

    /// Reads the job list for this run's mode from the data directory
    pub fn load_jobs(&self) -> Result<Vec<String>> {
        let data_dir = &self.config.paths.data_dir;
        match self.mode {
            RunMode::Normal => Ok(read_document(&data_dir.join(THEME_URLS_FILE))?),
            RunMode::RetryFailed => {
                let failures: FailureIndex = read_document(&data_dir.join(PACKAGE_FAILURES_FILE))?;
                Ok(retry_jobs(&failures))
            }
        }
    }

    /// Runs the harvest until every enabled queue is drained or a stop is requested
    ///
    /// Final outputs are written in both cases.
    pub async fn run(self) -> Result<RunReport> {
        let started_at = Utc::now();
        tracing::info!("Starting {:?} run", self.mode);

        reset_dir(&self.config.paths.temp_dir)?;

        let jobs = self.load_jobs()?;
        tracing::info!("Loaded {} jobs", jobs.len());

        // Loaded before the run so that a malformed file fails fast
        let (prior_themes, prior_terminal) = match self.mode {
            RunMode::Normal => (Vec::new(), FailureIndex::new()),
            RunMode::RetryFailed => self.load_prior_results()?,
        };

        let interrupt = {
            let stop = Arc::clone(&self.stop);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, finishing in-flight jobs");
                    stop.store(true, Ordering::SeqCst);
                }
            })
        };

        let metadata = self.scrapes_metadata().then(|| MetadataGroup::new(&jobs));
        let packages = self.analyzes_packages().then(|| PackageGroup::new(&jobs));

        let (metadata_abandoned, packages_abandoned) = tokio::join!(
            async {
                match &metadata {
                    Some(group) => Some(self.run_metadata(group).await),
                    None => None,
                }
            },
            async {
                match &packages {
                    Some(group) => Some(self.run_packages(group).await),
                    None => None,
                }
            },
        );

        interrupt.abort();

        let mut report = RunReport {
            mode: self.mode,
            started_at,
            finished_at: started_at,
            interrupted: self.stop.load(Ordering::SeqCst),
            metadata: None,
            packages: None,
        };

        if let (Some(group), Some(abandoned)) = (&metadata, metadata_abandoned) {
            self.data_writer
                .write(METADATA_FILE, Document::Metadata(&group.records.snapshot()))?;
            self.data_writer
                .write(METADATA_FAILURES_FILE, Document::Failures(&group.failures.index()))?;
            report.metadata = Some(PoolReport::collect(
                self.config.workers.metadata_scrapers,
                &group.queue,
                &group.records,
                &group.failures,
                abandoned,
            ));
        }

        if let (Some(group), Some(abandoned)) = (&packages, packages_abandoned) {
            let mut themes = group.records.snapshot();
            themes.extend(prior_themes);
            self.data_writer.write(THEMES_FILE, Document::Themes(&themes))?;

            let mut failures = group.failures.index();
            for (key, jobs) in prior_terminal {
                failures.entry(key).or_default().extend(jobs);
            }
            self.data_writer
                .write(PACKAGE_FAILURES_FILE, Document::Failures(&failures))?;

            report.packages = Some(PoolReport::collect(
                self.config.workers.package_analyzers,
                &group.queue,
                &group.records,
                &group.failures,
                abandoned,
            ));
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Themes and non-retryable failures of the run being retried
    fn load_prior_results(&self) -> Result<(Vec<ThemeRecord>, FailureIndex)> {
        let data_dir = &self.config.paths.data_dir;

        let themes_path = data_dir.join(THEMES_FILE);
        let themes = if themes_path.exists() {
            read_document(&themes_path)?
        } else {
            Vec::new()
        };

        let failures: FailureIndex = read_document(&data_dir.join(PACKAGE_FAILURES_FILE))?;
        let terminal = failures
            .into_iter()
            .filter(|(key, _)| is_terminal_reason(key))
            .collect();

        Ok((themes, terminal))
    }

    async fn run_metadata(&self, group: &MetadataGroup) -> usize {
        let pool = WorkerPool::new(
            "Metadata",
            self.config.workers.metadata_scrapers,
            MetadataHandler::new(self.config.browser.clone()),
            Arc::clone(&self.factory),
            Arc::clone(&group.queue),
            Arc::clone(&group.records),
            Arc::clone(&group.failures),
            Arc::clone(&self.stop),
        );

        let logger = self.config.stages.checkpoint_metadata.then(|| {
            self.checkpoint_logger("Metadata", &group.queue)
                .with_target(
                    METADATA_CHECKPOINT,
                    CheckpointTarget::Metadata(Arc::clone(&group.records)),
                )
                .with_target(
                    METADATA_FAILURES_CHECKPOINT,
                    CheckpointTarget::Failures(Arc::clone(&group.failures)),
                )
        });

        run_with_checkpoints(pool, logger).await
    }

    async fn run_packages(&self, group: &PackageGroup) -> usize {
        let pool = WorkerPool::new(
            "Packages",
            self.config.workers.package_analyzers,
            PackageHandler::new(self.config.browser.clone(), &self.config.paths.temp_dir),
            Arc::clone(&self.factory),
            Arc::clone(&group.queue),
            Arc::clone(&group.records),
            Arc::clone(&group.failures),
            Arc::clone(&self.stop),
        );

        let logger = self.config.stages.checkpoint_packages.then(|| {
            self.checkpoint_logger("Packages", &group.queue)
                .with_target(
                    THEMES_CHECKPOINT,
                    CheckpointTarget::Themes(Arc::clone(&group.records)),
                )
                .with_target(
                    PACKAGE_FAILURES_CHECKPOINT,
                    CheckpointTarget::Failures(Arc::clone(&group.failures)),
                )
        });

        run_with_checkpoints(pool, logger).await
    }

    fn checkpoint_logger(&self, name: &'static str, queue: &Arc<JobQueue>) -> CheckpointLogger {
        let logger = CheckpointLogger::new(
            name,
            Arc::clone(queue),
            Arc::clone(&self.log_writer),
            self.config.checkpoint.interval(),
        );
        match &self.progress {
            Some(multi) => logger.with_progress(multi),
            None => logger.hidden(),
        }
    }
}

/// Shared state of the metadata pool
struct MetadataGroup {
    queue: Arc<JobQueue>,
    records: Arc<ResultSink<MetadataRecord>>,
    failures: Arc<FailureLedger>,
}

impl MetadataGroup {
    fn new(jobs: &[String]) -> Self {
        Self {
            queue: Arc::new(JobQueue::new(jobs.to_vec())),
            records: Arc::new(ResultSink::new()),
            failures: Arc::new(FailureLedger::new()),
        }
    }
}

/// Shared state of the package pool
struct PackageGroup {
    queue: Arc<JobQueue>,
    records: Arc<ResultSink<ThemeRecord>>,
    failures: Arc<FailureLedger>,
}

impl PackageGroup {
    fn new(jobs: &[String]) -> Self {
        Self {
            queue: Arc::new(JobQueue::new(jobs.to_vec())),
            records: Arc::new(ResultSink::new()),
            failures: Arc::new(FailureLedger::new()),
        }
    }
}

/// Runs a pool and, if given, its checkpoint logger until the pool is done
async fn run_with_checkpoints<H: JobHandler>(
    pool: WorkerPool<H>,
    logger: Option<CheckpointLogger>,
) -> usize {
    let Some(logger) = logger else {
        return pool.run().await;
    };

    let (shutdown, rx) = watch::channel(false);
    let (abandoned, ()) = tokio::join!(
        async {
            let abandoned = pool.run().await;
            let _ = shutdown.send(true);
            abandoned
        },
        logger.run(rx),
    );
    abandoned
}

/// Empties `dir`, creating it if needed
fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}
