//! Bounded polling shared by every suspension point.
//!
//! Port resolution, HTTP probing and container log waits all go through
//! [`poll_until`] so their cancellation semantics are identical: attempts
//! run at a fixed interval until one reports [`Attempt::Ready`], a hard
//! error aborts immediately, and the budget elapsing produces the caller's
//! own timeout error.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Interval and budget for a polling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay between attempts.
    pub interval: Duration,
    /// Total time allowed before giving up.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given interval and timeout.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Returns a copy with a different timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(crate::constants::DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_millis(crate::constants::DEFAULT_POLL_TIMEOUT_MS),
        }
    }
}

/// Outcome of a single polling attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The condition holds; polling stops with this value.
    Ready(T),
    /// Not yet; the string describes what was observed.
    Pending(String),
}

/// Summary handed to the timeout constructor when the budget runs out.
#[derive(Debug, Clone)]
pub struct Expired {
    /// Budget that elapsed.
    pub timeout: Duration,
    /// Number of attempts made.
    pub attempts: u32,
    /// Observation from the last pending attempt.
    pub last: String,
}

/// Runs `attempt` until it is ready, fails, or the policy's budget elapses.
///
/// At least one attempt is always made, even with a zero timeout. The
/// final sleep is clipped so the call never overruns the budget by more
/// than one attempt's duration.
///
/// # Errors
///
/// Returns the first error produced by `attempt`, or the error built by
/// `on_timeout` once the budget is exhausted.
pub fn poll_until<T>(
    policy: &RetryPolicy,
    mut attempt: impl FnMut() -> Result<Attempt<T>>,
    on_timeout: impl FnOnce(Expired) -> crate::error::BuildproofError,
) -> Result<T> {
    let start = Instant::now();
    let mut attempts = 0_u32;
    let mut last = String::from("no attempt completed");

    loop {
        attempts += 1;
        match attempt()? {
            Attempt::Ready(value) => {
                tracing::debug!(attempts, elapsed = ?start.elapsed(), "poll satisfied");
                return Ok(value);
            }
            Attempt::Pending(observed) => {
                tracing::trace!(attempts, observed = %observed, "poll pending");
                last = observed;
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            break;
        }
        std::thread::sleep(policy.interval.min(policy.timeout - elapsed));
    }

    tracing::debug!(attempts, timeout = ?policy.timeout, last = %last, "poll expired");
    Err(on_timeout(Expired {
        timeout: policy.timeout,
        attempts,
        last,
    }))
}
