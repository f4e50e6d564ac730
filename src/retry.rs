//! Bounded retry with a fixed backoff.
//!
//! Channel initialization and session bootstrap share this helper: a fixed
//! number of attempts, a fixed pause between them, and the last error
//! returned when every attempt fails.

use std::future::Future;
use std::time::Duration;

/// How many attempts to make and how long to pause between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub attempts: u32,
    /// Fixed pause between consecutive attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Each failed attempt is logged at warn with its attempt number; the final
/// failure is returned unchanged to the caller.
pub async fn with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "attempt failed, giving up"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "attempt failed, backing off"
                );
                attempt += 1;
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    // --- First attempt succeeds ---

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<u32, String> =
            with_backoff(RetryPolicy::new(3, Duration::from_millis(1)), "op", || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // --- Success after transient failures ---

    #[tokio::test]
    async fn test_success_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<&str, String> =
            with_backoff(RetryPolicy::new(3, Duration::from_millis(1)), "op", || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // --- Exhaustion returns the last error ---

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), String> =
            with_backoff(RetryPolicy::new(3, Duration::from_millis(1)), "op", || {
                let c = Arc::clone(&c);
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    Err(format!("failure {}", n + 1))
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // --- Backoff happens between attempts, not after the last ---

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts_only() {
        let start = tokio::time::Instant::now();
        let result: Result<(), String> = with_backoff(
            RetryPolicy::new(3, Duration::from_secs(2)),
            "op",
            || async { Err("always".to_string()) },
        )
        .await;

        assert!(result.is_err());
        // Two pauses for three attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    // --- Zero attempts still runs once ---

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), String> =
            with_backoff(RetryPolicy::new(0, Duration::from_millis(1)), "op", || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("nope".to_string())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
