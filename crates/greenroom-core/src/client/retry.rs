//! Bounded exponential backoff for transient transport failures.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ClientError, ClientResult};

/// Retry budget for a single logical remote call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay before the second attempt (milliseconds); doubles per attempt.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Run `op` until it succeeds, fails non-transiently, or the budget is spent.
///
/// Only [`ClientError::Unreachable`] is retried. The surfaced error reports
/// the total number of attempts made.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(ClientError::Unreachable {
                endpoint, reason, ..
            }) => {
                if attempt >= max_attempts {
                    return Err(ClientError::Unreachable {
                        endpoint,
                        attempts: attempt,
                        reason,
                    });
                }
                let delay = policy.delay_for(attempt);
                tracing::debug!(%endpoint, attempt, delay_ms = delay.as_millis() as u64, %reason, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
