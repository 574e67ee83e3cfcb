use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::StoreError;

/// Bounded retry schedule for transient remote failures.
///
/// Attempt `n` sleeps `base_delay * n` before retrying, so the schedule is a
/// small fixed number of attempts with a growing delay. Non-transient errors
/// and the final attempt's failure propagate unmodified.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Run `op`, retrying transient failures up to the attempt budget.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    let delay = self.base_delay * attempt;
                    debug!(
                        "transient failure (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
