use std::{future::Future, time::Duration};

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::{info, warn};

use crate::{Error, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// How many times to attempt a unit of work, and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub base_delay: Duration,

    /// Growth factor applied to the delay after each failed attempt.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Jitter applied to each delay, 0.0 for none.
    pub randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            randomization_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry policy needs at least one attempt".to_owned(),
            ));
        }
        if !(self.multiplier >= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "backoff multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(Error::InvalidConfig(format!(
                "randomization factor must be within 0.0..=1.0, got {}",
                self.randomization_factor
            )));
        }
        Ok(())
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(self.randomization_factor)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Runs fallible work under a [`RetryPolicy`].
///
/// Each attempt reports success, a transient failure (retried after a
/// backoff delay) or a permanent failure (returned as-is). Spending the whole
/// attempt budget on transient failures yields [`Error::RetriesExhausted`]
/// wrapping the last failure.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Result<RetryExecutor> {
        policy.validate()?;
        Ok(RetryExecutor { policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `op`, passing it the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, backoff::Error<Error>>>,
    {
        let mut backoff = self.policy.backoff();
        let mut attempt = 1u32;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "retry successful");
                    }
                    return Ok(value);
                }
                Err(backoff::Error::Permanent(err)) => return Err(err),
                Err(backoff::Error::Transient { err, retry_after }) => {
                    let delay = if attempt < self.policy.max_attempts {
                        retry_after.or_else(|| backoff.next_backoff())
                    } else {
                        None
                    };
                    match delay {
                        Some(delay) => {
                            warn!(?delay, attempt, %err, "retrying");
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            return Err(Error::RetriesExhausted {
                                attempts: attempt,
                                source: Box::new(err),
                            });
                        }
                    }
                }
            }
        }
    }
}
