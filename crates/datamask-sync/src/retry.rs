//! Bounded per-table retry with a fixed delay.
//!
//! The controller is a small state machine: `Attempting(n)` moves to
//! `Succeeded` on success, to `Attempting(n + 1)` after the delay on a
//! retryable error while attempts remain, and to `Failed` otherwise. The
//! outcome is returned as a value; the caller records it and moves on to the
//! next table.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::Settings;
use crate::error::SyncError;

/// Attempt budget and delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,

    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Build the policy from run settings.
    ///
    /// Disabled retries mean a single attempt.
    pub fn from_settings(settings: &Settings) -> Self {
        let max_attempts = if settings.retry_enabled {
            settings.retry_attempts.max(1)
        } else {
            1
        };
        Self {
            max_attempts,
            delay: Duration::from_secs(settings.retry_delay_secs),
        }
    }

    /// State following a failed attempt `attempt` (1-based).
    pub fn after_failure(&self, attempt: u32, error: &SyncError) -> RetryState {
        if error.is_retryable() && attempt < self.max_attempts {
            RetryState::Attempting(attempt + 1)
        } else {
            RetryState::Failed
        }
    }
}

/// Retry controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Running attempt `n` (1-based).
    Attempting(u32),
    Succeeded,
    Failed,
}

/// Result of driving an operation to a terminal state.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Failed { error: SyncError, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    /// Attempts made before reaching the terminal state.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }
}

/// Runs one table's work under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drive `op` until it succeeds or the policy gives up.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, table: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 1;
        loop {
            let error = match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Err(error) => error,
            };

            match self.policy.after_failure(attempt, &error) {
                RetryState::Attempting(next) => {
                    warn!(
                        "{}: attempt {}/{} failed: {}. Retrying in {:?}",
                        table, attempt, self.policy.max_attempts, error, self.policy.delay
                    );
                    if !self.policy.delay.is_zero() {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                    attempt = next;
                }
                RetryState::Succeeded | RetryState::Failed => {
                    return RetryOutcome::Failed {
                        error,
                        attempts: attempt,
                    }
                }
            }
        }
    }
}
