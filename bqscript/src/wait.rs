//! Retrying flaky operations with exponential backoff.

use std::time::Duration;
use tokio::time::sleep;

use crate::common::*;

/// How hard to try before giving up.
#[derive(Clone, Debug)]
pub(crate) struct WaitOptions {
    retry_interval: Duration,
    allowed_errors: usize,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            allowed_errors: 3,
        }
    }
}

impl WaitOptions {
    /// How long to sleep after the first temporary failure. This doubles after
    /// every subsequent failure.
    pub(crate) fn retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// How many temporary failures to tolerate.
    pub(crate) fn allowed_errors(mut self, allowed_errors: usize) -> Self {
        self.allowed_errors = allowed_errors;
        self
    }
}

/// The outcome of a single attempt.
#[derive(Debug)]
pub(crate) enum WaitStatus<T, E> {
    /// We have a result.
    Finished(T),
    /// Worth trying again.
    FailedTemporarily(E),
    /// Retrying won't help.
    FailedPermanently(E),
}

/// Call `f` until it finishes, fails permanently, or fails temporarily more
/// than `options.allowed_errors` times.
pub(crate) async fn wait<T, E, F, Fut>(options: &WaitOptions, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WaitStatus<T, E>>,
{
    let mut errors = 0;
    let mut interval = options.retry_interval;
    loop {
        match f().await {
            WaitStatus::Finished(value) => return Ok(value),
            WaitStatus::FailedPermanently(err) => return Err(err),
            WaitStatus::FailedTemporarily(err) => {
                errors += 1;
                if errors > options.allowed_errors {
                    return Err(err);
                }
                debug!(
                    "temporary failure {}/{}, retrying in {:?}",
                    errors, options.allowed_errors, interval,
                );
                sleep(interval).await;
                interval = interval.saturating_mul(2);
            }
        }
    }
}
