// SYNOID Transport Retry - Backoff Around the Rewrite Call
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Wraps a single rewrite call in a Try-Wait-Retry loop:
//   1. Timeouts and 5xx back off exponentially (capped)
//   2. Rate limits wait out a fixed cooldown
//   3. Anything else is returned to the caller immediately
// Budget retries live in the orchestrator; this loop only deals with the wire.

use crate::narration::error::{NarrationError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportRetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub rate_limit_cooldown_ms: u64,
}

impl Default for TransportRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            rate_limit_cooldown_ms: 20_000,
        }
    }
}

impl TransportRetryPolicy {
    /// Exponential backoff for the `retry`-th retry (0-based): 1s, 2s, 4s, ...
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    fn delay_for(&self, err: &NarrationError, retry: u32) -> Duration {
        match err {
            NarrationError::RateLimited(_) => Duration::from_millis(self.rate_limit_cooldown_ms),
            _ => self.backoff_delay(retry),
        }
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, runs out
/// of attempts, or `cancel` fires. Cancellation also interrupts an in-flight
/// call or a pending sleep.
pub async fn call_with_transport_retry<T, F, Fut>(
    task_name: &str,
    policy: &TransportRetryPolicy,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NarrationError::Cancelled),
            outcome = call() => outcome,
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    info!("[TRANSPORT] '{}' recovered on attempt {}", task_name, attempt);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            error!("[TRANSPORT] '{}' failed permanently: {}", task_name, err);
            return Err(err);
        }

        if attempt >= max_attempts {
            error!(
                "[TRANSPORT] '{}' exhausted {} attempts. Last error: {}",
                task_name, max_attempts, err
            );
            return Err(err);
        }

        let delay = policy.delay_for(&err, attempt - 1);
        warn!(
            "[TRANSPORT] '{}' attempt {}/{} failed ({}); retrying in {:?}",
            task_name, attempt, max_attempts, err, delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NarrationError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> TransportRetryPolicy {
        TransportRetryPolicy {
            max_attempts: 4,
            base_delay_ms: 1,
            max_delay_ms: 2,
            rate_limit_cooldown_ms: 1,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = TransportRetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(16));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(30));
    }

    #[test]
    fn test_rate_limit_uses_cooldown() {
        let policy = TransportRetryPolicy::default();
        let delay = policy.delay_for(&NarrationError::RateLimited("429".into()), 0);
        assert_eq!(delay, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = call_with_transport_retry("flaky", &fast_policy(), &CancellationToken::new(), move || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(NarrationError::TransientTransport("503".into()))
                } else {
                    Ok("recovered".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: Result<String> =
            call_with_transport_retry("down", &fast_policy(), &CancellationToken::new(), move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(NarrationError::RateLimited("slow down".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(NarrationError::RateLimited(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: Result<String> =
            call_with_transport_retry("rejected", &fast_policy(), &CancellationToken::new(), move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(NarrationError::RequestRejected {
                        status: 401,
                        body: "unauthorized".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(NarrationError::RequestRejected { status: 401, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<String> =
            call_with_transport_retry("cancelled", &fast_policy(), &cancel, || async {
                Ok("never".to_string())
            })
            .await;

        assert!(matches!(result, Err(NarrationError::Cancelled)));
    }
}
