use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::KiraError;

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub retry_not_found: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(10),
            retry_not_found: false,
        }
    }
}

impl RetryPolicy {
    /// Wait inserted after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    pub error: KiraError,
}

/// Runs `op` until it succeeds, fails with an error that is not worth
/// retrying, or `policy.max_attempts` attempts have been spent. Returns the
/// value together with the number of attempts used.
pub fn retry_with_backoff<T, F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    sink: &dyn ProgressSink,
    mut op: F,
) -> Result<(T, u32), Exhausted>
where
    F: FnMut(u32) -> Result<T, KiraError>,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt) {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => {
                if attempt >= policy.max_attempts || !error.is_retryable(policy.retry_not_found) {
                    return Err(Exhausted {
                        attempts: attempt,
                        error,
                    });
                }
                let delay = policy.delay_for(attempt);
                warn!(attempt, delay_secs = delay.as_secs(), %error, "attempt failed, backing off");
                sink.event(ProgressEvent {
                    message: format!(
                        "retry attempt={attempt} failed: {error}; waiting {}s",
                        delay.as_secs()
                    ),
                    elapsed: Some(delay),
                });
                sleeper.sleep(delay);
                attempt += 1;
            }
        }
    }
}
