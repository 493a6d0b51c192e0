use std::sync::{Mutex, MutexGuard, PoisonError};

/// Append-only collection of completed records
///
/// Tracks how many jobs contributed records separately from the record
/// count, since one package can contribute several themes.
#[derive(Debug)]
pub struct ResultSink<T> {
    inner: Mutex<SinkInner<T>>,
}

#[derive(Debug)]
struct SinkInner<T> {
    records: Vec<T>,
    jobs: usize,
}

impl<T> ResultSink<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                records: Vec::new(),
                jobs: 0,
            }),
        }
    }

    /// Records the single result of one job
    pub fn push(&self, record: T) {
        let mut inner = self.lock();
        inner.records.push(record);
        inner.jobs += 1;
    }

    /// Records every result of one job
    pub fn extend(&self, records: Vec<T>) {
        let mut inner = self.lock();
        inner.records.extend(records);
        inner.jobs += 1;
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Number of jobs that completed into this sink
    pub fn jobs(&self) -> usize {
        self.lock().jobs
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> ResultSink<T> {
    /// Copies the current records
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().records.clone()
    }
}

impl<T> Default for ResultSink<T> {
    fn default() -> Self {
        Self::new()
    }
}
