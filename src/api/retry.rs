use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::SyncError;

/// Something that can block the current thread for a while.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Extra pause after a transaction-abort before the normal backoff.
    pub transient_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_secs(10),
            transient_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt with zero-based index `attempt` (> 0).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Failed { error: String, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Run `operation` until it succeeds, fails fatally or runs out of attempts.
///
/// Attempt `n` (zero-based, n > 0) is preceded by a wait of
/// `initial_delay * 2^n`. A transient failure adds `transient_delay` before
/// that wait. The final failure is returned as a value, never raised.
pub fn with_retry<T, F>(policy: &RetryPolicy, sleeper: &dyn Sleeper, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut() -> Result<T, SyncError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::from("Max retries exceeded");

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = policy.backoff_delay(attempt);
            info!(
                "Attempt {} of {}, waiting {} seconds...",
                attempt + 1,
                max_attempts,
                delay.as_secs()
            );
            sleeper.sleep(delay);
        }

        match operation() {
            Ok(value) => {
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt + 1,
                }
            }
            Err(e) => {
                warn!("Attempt {} failed: {}", attempt + 1, e);
                last_error = e.to_string();

                if e.is_fatal() {
                    return RetryOutcome::Failed {
                        error: last_error,
                        attempts: attempt + 1,
                    };
                }

                let has_next = attempt + 1 < max_attempts;
                if e.is_transient() && has_next {
                    info!(
                        "Transaction abort detected, waiting {} more seconds...",
                        policy.transient_delay.as_secs()
                    );
                    sleeper.sleep(policy.transient_delay);
                }
            }
        }
    }

    RetryOutcome::Failed {
        error: last_error,
        attempts: max_attempts,
    }
}
