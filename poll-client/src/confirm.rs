//! Bounded waiting for a submitted transaction to become visible.

use crate::error::PollError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        ConfirmPolicy {
            max_attempts: 8,
            initial_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ConfirmPolicy {
    /// No waiting at all, for in-memory chains.
    pub fn immediate(max_attempts: u32) -> Self {
        ConfirmPolicy {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay slept before `attempt` (0-based): doubling from
    /// `initial_delay`, capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Upper bound of the total time spent sleeping.
    pub fn max_wait(&self) -> Duration {
        (0..self.max_attempts).map(|a| self.delay(a)).sum()
    }

    /// Run `check` until it yields a value or the attempts run out.
    ///
    /// Errors of `check` count as "not yet": the chain view often lags the
    /// submission. On exhaustion the last observed reason is returned.
    pub async fn wait_for<T, F, Fut>(&self, mut check: F) -> Result<T, String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, PollError>>,
    {
        let mut reason = "not observed on chain".to_string();
        for attempt in 0..self.max_attempts {
            let delay = self.delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match check().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => tracing::debug!(attempt, "not visible yet"),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "confirmation check failed");
                    reason = e.to_string();
                }
            }
        }
        Err(format!(
            "{} after {} attempts ({:?})",
            reason,
            self.max_attempts,
            self.max_wait()
        ))
    }
}
