//! Periodic checkpoints of in-flight progress
//!
//! A logger runs beside each worker pool. Every tick it overwrites one file
//! per target with a snapshot of the shared sinks and ledgers and advances a
//! progress bar by the number of jobs popped since the previous tick.

use crate::output::{Document, DocumentWriter, MetadataRecord, OutputResult, ThemeRecord};
use crate::state::{FailureLedger, JobQueue, ResultSink};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Shared state snapshotted into one checkpoint file
#[derive(Clone)]
pub enum CheckpointTarget {
    Metadata(Arc<ResultSink<MetadataRecord>>),
    Themes(Arc<ResultSink<ThemeRecord>>),
    Failures(Arc<FailureLedger>),
}

impl CheckpointTarget {
    fn write(&self, writer: &dyn DocumentWriter, file_name: &str) -> OutputResult<()> {
        match self {
            Self::Metadata(sink) => {
                writer.write(file_name, Document::Metadata(&sink.snapshot()))?;
            }
            Self::Themes(sink) => {
                writer.write(file_name, Document::Themes(&sink.snapshot()))?;
            }
            Self::Failures(ledger) => {
                writer.write(file_name, Document::Failures(&ledger.index()))?;
            }
        }
        Ok(())
    }
}

/// Periodically persists snapshots of one pool's shared state
pub struct CheckpointLogger {
    name: &'static str,
    queue: Arc<JobQueue>,
    targets: Vec<(&'static str, CheckpointTarget)>,
    writer: Arc<dyn DocumentWriter>,
    interval: Duration,
    progress: ProgressBar,
}

impl CheckpointLogger {
    pub fn new(
        name: &'static str,
        queue: Arc<JobQueue>,
        writer: Arc<dyn DocumentWriter>,
        interval: Duration,
    ) -> Self {
        let progress = ProgressBar::new(queue.len() as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "{prefix:>10} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress.set_prefix(name);

        Self {
            name,
            queue,
            targets: Vec::new(),
            writer,
            interval,
            progress,
        }
    }

    /// Adds a target written to `file_name` on every tick
    pub fn with_target(mut self, file_name: &'static str, target: CheckpointTarget) -> Self {
        self.targets.push((file_name, target));
        self
    }

    /// Draws the progress bar as part of `multi`
    pub fn with_progress(mut self, multi: &MultiProgress) -> Self {
        self.progress = multi.add(self.progress);
        self
    }

    /// Hides the progress bar
    pub fn hidden(self) -> Self {
        self.progress.set_draw_target(ProgressDrawTarget::hidden());
        self
    }

    /// Ticks until the queue is drained or `shutdown` fires
    ///
    /// A final snapshot is written before returning either way. Snapshots are
    /// written on the blocking pool.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut remaining = self.queue.len();
        let this = Arc::new(self);

        loop {
            let stopping = tokio::select! {
                _ = ticker.tick() => false,
                _ = shutdown.changed() => true,
            };

            let logger = Arc::clone(&this);
            if let Err(e) = tokio::task::spawn_blocking(move || logger.snapshot()).await {
                tracing::warn!("{} checkpoint task failed: {}", this.name, e);
            }

            let len = this.queue.len();
            this.progress.inc(remaining.saturating_sub(len) as u64);
            remaining = len;

            if stopping || *shutdown.borrow() || len == 0 {
                break;
            }
        }

        this.progress.finish();
        tracing::debug!("{} checkpoint logger stopped", this.name);
    }

    /// Writes every target once
    fn snapshot(&self) {
        for (file_name, target) in &self.targets {
            if let Err(e) = target.write(self.writer.as_ref(), file_name) {
                tracing::warn!("{} checkpoint {} failed: {}", self.name, file_name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{read_document, FailureIndex, FailureRecord, JsonDocumentWriter, Stage};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};
    use tempfile::TempDir;

    /// Records the thread each write happened on
    #[derive(Default)]
    struct ThreadRecordingWriter {
        threads: Mutex<Vec<ThreadId>>,
    }

    impl DocumentWriter for ThreadRecordingWriter {
        fn write(&self, file_name: &str, _document: Document<'_>) -> OutputResult<PathBuf> {
            self.threads.lock().unwrap().push(thread::current().id());
            Ok(PathBuf::from(file_name))
        }
    }

    fn metadata(url: &str) -> MetadataRecord {
        MetadataRecord {
            url: url.to_string(),
            name: "Theme".to_string(),
            author: "someone".to_string(),
            verified: false,
            install_count: 0,
            rating_count: 0,
            average_rating: 0.0,
            description: String::new(),
            price: "Free".to_string(),
            categories: Vec::new(),
            tags: Vec::new(),
            repository_url: None,
        }
    }

    #[tokio::test]
    async fn test_stops_on_empty_queue_after_writing() {
        let temp = TempDir::new().unwrap();
        let queue = Arc::new(JobQueue::new(Vec::new()));
        let sink = Arc::new(ResultSink::new());
        sink.push(metadata("https://a"));
        let ledger = Arc::new(FailureLedger::new());
        ledger.push(FailureRecord::new(
            "https://b",
            Stage::Metadata,
            "Element 'x' not found",
        ));

        let (_tx, rx) = watch::channel(false);
        CheckpointLogger::new(
            "metadata",
            queue,
            Arc::new(JsonDocumentWriter::new(temp.path())),
            Duration::from_millis(10),
        )
        .with_target("log.json", CheckpointTarget::Metadata(Arc::clone(&sink)))
        .with_target(
            "failed_metadata_log.json",
            CheckpointTarget::Failures(Arc::clone(&ledger)),
        )
        .hidden()
        .run(rx)
        .await;

        let records: Vec<MetadataRecord> = read_document(&temp.path().join("log.json")).unwrap();
        assert_eq!(records, vec![metadata("https://a")]);

        let failures: FailureIndex =
            read_document(&temp.path().join("failed_metadata_log.json")).unwrap();
        assert_eq!(failures["[Metadata] Element 'x' not found"], vec!["https://b"]);
    }

    #[tokio::test]
    async fn test_snapshots_are_written_off_the_runtime_thread() {
        let writer = Arc::new(ThreadRecordingWriter::default());
        let (_tx, rx) = watch::channel(false);

        CheckpointLogger::new(
            "themes",
            Arc::new(JobQueue::new(Vec::new())),
            Arc::clone(&writer) as Arc<dyn DocumentWriter>,
            Duration::from_millis(10),
        )
        .with_target("vsix_log.json", CheckpointTarget::Themes(Arc::new(ResultSink::new())))
        .hidden()
        .run(rx)
        .await;

        let threads = writer.threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], thread::current().id());
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let queue = Arc::new(JobQueue::new(vec!["https://pending".to_string()]));
        let sink = Arc::new(ResultSink::new());

        let (tx, rx) = watch::channel(false);
        let logger = CheckpointLogger::new(
            "themes",
            Arc::clone(&queue),
            Arc::new(JsonDocumentWriter::new(temp.path())),
            Duration::from_secs(3600),
        )
        .with_target("vsix_log.json", CheckpointTarget::Themes(Arc::clone(&sink)))
        .hidden();
        let handle = tokio::spawn(logger.run(rx));

        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(queue.len(), 1);
        let themes: Vec<ThemeRecord> =
            read_document(&temp.path().join("vsix_log.json")).unwrap();
        assert!(themes.is_empty());
    }
}
