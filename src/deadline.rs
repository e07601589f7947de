//! Per-request deadline for cache and store calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Deadline elapsed before the call completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline elapsed")]
pub struct Elapsed;

/// Point in time by which all I/O for one request must finish.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Run `fut`, dropping it if the deadline passes first. Once the deadline
    /// has passed, `fut` is not polled at all.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Elapsed> {
        if self.is_elapsed() {
            return Err(Elapsed);
        }
        tokio::time::timeout_at(self.0, fut)
            .await
            .map_err(|_| Elapsed)
    }
}
