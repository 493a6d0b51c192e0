use crate::output::{FailureIndex, FailureRecord};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Reason given to packages that contribute no color theme
///
/// Re-downloading such a package cannot change the outcome, so jobs failed
/// with this reason are never re-queued.
pub const NOT_A_THEME_EXTENSION: &str = "Not a theme extension";

/// Append-only collection of failed jobs
#[derive(Debug, Default)]
pub struct FailureLedger {
    entries: Mutex<Vec<FailureRecord>>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, failure: FailureRecord) {
        self.lock().push(failure);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<FailureRecord> {
        self.lock().clone()
    }

    /// Groups the failed jobs by ledger key, keeping append order within a key
    pub fn index(&self) -> FailureIndex {
        let mut index = FailureIndex::new();
        for failure in self.lock().iter() {
            index
                .entry(failure.key())
                .or_default()
                .push(failure.job.clone());
        }
        index
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FailureRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns true if jobs under this ledger key must not be retried
///
/// Accepts both stage-tagged keys (`[Analysis] Not a theme extension`) and
/// bare reasons, compared case-insensitively.
pub fn is_terminal_reason(key: &str) -> bool {
    let reason = key
        .strip_prefix('[')
        .and_then(|rest| rest.split_once("] "))
        .map(|(_, reason)| reason)
        .unwrap_or(key);

    reason.trim().eq_ignore_ascii_case(NOT_A_THEME_EXTENSION)
}

/// Builds the job list of a retry run from a previous failure ledger
pub fn retry_jobs(index: &FailureIndex) -> Vec<String> {
    index
        .iter()
        .filter(|(key, _)| !is_terminal_reason(key))
        .flat_map(|(_, jobs)| jobs.iter().cloned())
        .collect()
}
