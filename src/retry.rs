//! Retry with doubling backoff for flaky operations, typically the
//! fetch closures handed to a cache or a task pool.
//!
//! The policy starts from a base delay, doubles it after every
//! failure up to a per-attempt cap, and gives up once the total time
//! spent (including sleeps) would exceed an overall deadline.  The
//! last error is returned as-is when the policy gives up.
use std::time::Duration;
use std::time::Instant;

use tracing::warn;

use crate::error::Result;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Backoff parameters for [`RetryPolicy::run`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    deadline: Duration,
}

impl Default for RetryPolicy {
    /// 1 second base delay, doubling to at most 10 seconds per
    /// attempt, 30 seconds overall.
    fn default() -> RetryPolicy {
        RetryPolicy::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_DEADLINE)
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, deadline: Duration) -> RetryPolicy {
        RetryPolicy {
            base_delay,
            max_delay,
            deadline,
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Calls `op` until it succeeds, sleeping between attempts.  The
    /// first attempt is always made; a retry is only scheduled when
    /// its backoff sleep still fits inside the deadline.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let mut delay = self.base_delay;

        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if start.elapsed() + delay > self.deadline {
                return Err(err);
            }

            warn!(error = %err, delay_ms = delay.as_millis() as u64, "retrying after failure");
            std::thread::sleep(delay);
            delay = std::cmp::min(delay * 2, self.max_delay);
        }
    }
}
