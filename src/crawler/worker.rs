//! Worker pools
//!
//! A pool is a fixed number of tokio tasks, each owning one browser session
//! and draining a shared [`JobQueue`]. Every popped job ends in the pool's
//! result sink or failure ledger, except jobs whose handler panicked, which
//! are logged and counted as abandoned.

use crate::browser::{BrowserSession, SessionFactory};
use crate::config::BrowserConfig;
use crate::crawler::artifact_analyzer;
use crate::crawler::package_fetcher::PackageFetcher;
use crate::crawler::page_analyzer;
use crate::output::{FailureRecord, MetadataRecord, Stage, ThemeRecord};
use crate::state::{FailureLedger, JobQueue, ResultSink};
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-worker information handed to a [`JobHandler`]
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub id: usize,
    pub download_dir: Option<PathBuf>,
}

/// What a handler made of one job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<T> {
    Completed(Vec<T>),
    Failed { stage: Stage, reason: String },
}

/// Processes one job with a worker's browser session
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Record: Send + 'static;

    /// Stage recorded when `handle` returns an error
    fn stage(&self) -> Stage;

    /// Directory the session of worker `id` downloads into, if it downloads at all
    fn download_dir(&self, _id: usize) -> Option<PathBuf> {
        None
    }

    /// Designed failures come back as [`JobOutcome::Failed`]; errors are unexpected
    async fn handle(
        &self,
        session: &dyn BrowserSession,
        ctx: &WorkerContext,
        job: &str,
    ) -> crate::Result<JobOutcome<Self::Record>>;
}

/// A fixed-size group of workers sharing one queue, sink and ledger
pub struct WorkerPool<H: JobHandler> {
    name: &'static str,
    size: usize,
    handler: Arc<H>,
    factory: Arc<dyn SessionFactory>,
    queue: Arc<JobQueue>,
    sink: Arc<ResultSink<H::Record>>,
    ledger: Arc<FailureLedger>,
    stop: Arc<AtomicBool>,
    abandoned: Arc<AtomicUsize>,
}

impl<H: JobHandler> WorkerPool<H> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &'static str,
        size: usize,
        handler: H,
        factory: Arc<dyn SessionFactory>,
        queue: Arc<JobQueue>,
        sink: Arc<ResultSink<H::Record>>,
        ledger: Arc<FailureLedger>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name,
            size,
            handler: Arc::new(handler),
            factory,
            queue,
            sink,
            ledger,
            stop,
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Runs all workers to completion and returns the number of abandoned jobs
    pub async fn run(self) -> usize {
        if self.queue.is_empty() {
            tracing::info!("{} pool has no jobs", self.name);
            return 0;
        }

        tracing::info!(
            "Starting {} pool with {} workers for {} jobs",
            self.name,
            self.size,
            self.queue.len()
        );

        let workers = (0..self.size).map(|id| {
            let worker = Worker {
                id,
                pool: self.name,
                handler: Arc::clone(&self.handler),
                factory: Arc::clone(&self.factory),
                queue: Arc::clone(&self.queue),
                sink: Arc::clone(&self.sink),
                ledger: Arc::clone(&self.ledger),
                stop: Arc::clone(&self.stop),
                abandoned: Arc::clone(&self.abandoned),
            };
            tokio::spawn(worker.run())
        });

        for joined in join_all(workers).await {
            if let Err(e) = joined {
                tracing::error!("{} worker task failed: {}", self.name, e);
            }
        }

        let abandoned = self.abandoned.load(Ordering::SeqCst);
        tracing::info!(
            "{} pool finished: {} completed, {} failed, {} abandoned",
            self.name,
            self.sink.jobs(),
            self.ledger.len(),
            abandoned
        );
        abandoned
    }
}

struct Worker<H: JobHandler> {
    id: usize,
    pool: &'static str,
    handler: Arc<H>,
    factory: Arc<dyn SessionFactory>,
    queue: Arc<JobQueue>,
    sink: Arc<ResultSink<H::Record>>,
    ledger: Arc<FailureLedger>,
    stop: Arc<AtomicBool>,
    abandoned: Arc<AtomicUsize>,
}

impl<H: JobHandler> Worker<H> {
    async fn run(self) {
        let ctx = WorkerContext {
            id: self.id,
            download_dir: self.handler.download_dir(self.id),
        };

        if let Some(dir) = &ctx.download_dir {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::error!(
                    "{} worker {} cannot create {}: {}",
                    self.pool,
                    self.id,
                    dir.display(),
                    e
                );
                return;
            }
        }

        let mut session = match self.factory.open(ctx.download_dir.as_deref()).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("{} worker {} has no browser: {}", self.pool, self.id, e);
                return;
            }
        };

        while !self.stop.load(Ordering::SeqCst) {
            let Some(job) = self.queue.pop() else {
                break;
            };
            self.process(session.as_ref(), &ctx, job).await;
        }

        if let Err(e) = session.close().await {
            tracing::warn!("{} worker {} failed to close browser: {}", self.pool, self.id, e);
        }
        tracing::debug!("{} worker {} stopped", self.pool, self.id);
    }

    async fn process(&self, session: &dyn BrowserSession, ctx: &WorkerContext, job: String) {
        let outcome = AssertUnwindSafe(self.handler.handle(session, ctx, &job))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(JobOutcome::Completed(records))) => {
                tracing::debug!("{} {}: {} records", self.pool, job, records.len());
                self.sink.extend(records);
            }
            Ok(Ok(JobOutcome::Failed { stage, reason })) => {
                tracing::debug!("{} {}: [{}] {}", self.pool, job, stage, reason);
                self.ledger.push(FailureRecord::new(job, stage, reason));
            }
            Ok(Err(e)) => {
                tracing::error!("{} {}: unexpected error: {}", self.pool, job, e);
                self.ledger
                    .push(FailureRecord::new(job, self.handler.stage(), e.to_string()));
            }
            Err(_) => {
                tracing::error!("{} {}: handler panicked, job abandoned", self.pool, job);
                self.abandoned.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// Scrapes listing metadata
pub struct MetadataHandler {
    browser: BrowserConfig,
}

impl MetadataHandler {
    pub fn new(browser: BrowserConfig) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl JobHandler for MetadataHandler {
    type Record = MetadataRecord;

    fn stage(&self) -> Stage {
        Stage::Metadata
    }

    async fn handle(
        &self,
        session: &dyn BrowserSession,
        _ctx: &WorkerContext,
        job: &str,
    ) -> crate::Result<JobOutcome<MetadataRecord>> {
        Ok(
            match page_analyzer::analyze(session, job, &self.browser).await {
                Ok(record) => JobOutcome::Completed(vec![record]),
                Err(e) => JobOutcome::Failed {
                    stage: Stage::Metadata,
                    reason: e.to_string(),
                },
            },
        )
    }
}

/// Downloads packages and extracts their themes
pub struct PackageHandler {
    browser: BrowserConfig,
    temp_dir: PathBuf,
}

impl PackageHandler {
    pub fn new(browser: BrowserConfig, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            browser,
            temp_dir: temp_dir.into(),
        }
    }

    /// Download directory of worker `id`, below the run's temp directory
    pub fn worker_dir(&self, id: usize) -> PathBuf {
        self.temp_dir.join(format!("analyzer_{}", id))
    }
}

#[async_trait]
impl JobHandler for PackageHandler {
    type Record = ThemeRecord;

    fn stage(&self) -> Stage {
        Stage::Analysis
    }

    fn download_dir(&self, id: usize) -> Option<PathBuf> {
        Some(self.worker_dir(id))
    }

    async fn handle(
        &self,
        session: &dyn BrowserSession,
        ctx: &WorkerContext,
        job: &str,
    ) -> crate::Result<JobOutcome<ThemeRecord>> {
        let download_dir = ctx
            .download_dir
            .clone()
            .unwrap_or_else(|| self.worker_dir(ctx.id));

        let package = match PackageFetcher::new(session, &download_dir, &self.browser)
            .fetch(job)
            .await
        {
            Ok(package) => package,
            Err(failure) => {
                return Ok(JobOutcome::Failed {
                    stage: Stage::Download,
                    reason: failure.to_string(),
                })
            }
        };

        let _cleanup = UnpackedDir(package.path.clone());
        let path = package.path.clone();
        let analysis =
            tokio::task::spawn_blocking(move || artifact_analyzer::analyze(&path)).await?;

        Ok(match analysis.error {
            None => JobOutcome::Completed(analysis.records),
            Some(failure) => {
                if !analysis.records.is_empty() {
                    tracing::debug!(
                        "{}: discarding {} themes read before: {}",
                        job,
                        analysis.records.len(),
                        failure
                    );
                }
                JobOutcome::Failed {
                    stage: Stage::Analysis,
                    reason: failure.to_string(),
                }
            }
        })
    }
}

/// Removes an unpacked package when dropped, including during a panic
struct UnpackedDir(PathBuf);

impl Drop for UnpackedDir {
    fn drop(&mut self) {
        remove_unpacked(&self.0);
    }
}

fn remove_unpacked(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_dir_all(path) {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
