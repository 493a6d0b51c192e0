//! Bounded polling
//!
//! Every wait in the pipeline goes through [`wait_for`] so that it has a
//! deadline and a distinguishable failure.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// The probe never produced a value before the deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {waited:?}")]
pub struct TimedOut {
    pub waited: Duration,
}

/// Calls `probe` every `interval` until it yields a value or `timeout` elapses
///
/// The probe always runs at least once, and once more at the deadline, so a
/// zero timeout still gives it a single chance.
pub async fn wait_for<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T, TimedOut>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(value) = probe().await {
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(TimedOut { waited: timeout });
        }

        sleep(interval.min(deadline - now)).await;
    }
}
