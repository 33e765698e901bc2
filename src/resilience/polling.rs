//! Bounded polling.
//!
//! # Responsibilities
//! - Repeat a probe at a fixed interval until it reports readiness
//! - Enforce the wait budget (max elapsed time, optional)
//! - Abort at once on fatal conditions
//!
//! # Design Decisions
//! - Sleeps before every attempt, including the first; the signal that
//!   started the transition needs time to take effect
//! - The budget is checked only after a pending attempt, so a probe that
//!   succeeds on the last tick still wins
//! - Uses `tokio::time` so paused-clock tests run instantly

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// How often to poll and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the probe settles.
    pub max_wait: Option<Duration>,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_wait: Option<Duration>) -> Self {
        Self { interval, max_wait }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: Some(Duration::from_secs(60)),
        }
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Target state reached.
    Ready(T),
    /// Not there yet; the reason is kept for logging.
    Pending(String),
    /// Stop polling, retrying cannot help.
    Fatal(String),
}

/// A successful poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    pub value: T,
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("gave up after {attempts} attempts ({elapsed:?}): {last}")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last: String,
    },

    #[error("aborted after {attempts} attempts: {reason}")]
    Fatal { attempts: u32, reason: String },
}

/// Poll `attempt` under `policy` until it is ready, fatal, or out of budget.
///
/// The closure receives the 1-based attempt number.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, mut attempt: F) -> Result<Polled<T>, PollError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStep<T>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        tokio::time::sleep(policy.interval).await;
        attempts += 1;

        match attempt(attempts).await {
            PollStep::Ready(value) => {
                return Ok(Polled {
                    value,
                    attempts,
                    elapsed: started.elapsed(),
                });
            }
            PollStep::Fatal(reason) => {
                return Err(PollError::Fatal { attempts, reason });
            }
            PollStep::Pending(reason) => {
                let elapsed = started.elapsed();
                tracing::trace!(attempt = attempts, elapsed_ms = elapsed.as_millis() as u64, reason = %reason, "Still waiting");

                if let Some(max_wait) = policy.max_wait {
                    if elapsed >= max_wait {
                        return Err(PollError::Exhausted {
                            attempts,
                            elapsed,
                            last: reason,
                        });
                    }
                }
            }
        }
    }
}
