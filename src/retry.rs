//! Bounded exponential backoff for flaky remote calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::vcs::VcsError;

/// Backoff bounds: the delay doubles from `initial_interval` up to
/// `max_interval`, and retrying stops once `max_elapsed` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    #[serde(with = "millis")]
    pub initial_interval: Duration,
    #[serde(with = "millis")]
    pub max_interval: Duration,
    #[serde(with = "millis")]
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_interval.saturating_mul(factor).min(self.max_interval)
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy's total
/// time budget is spent. The last error is returned on exhaustion.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, VcsError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VcsError>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                let delay = policy.backoff(attempt);
                if started.elapsed() + delay > policy.max_elapsed {
                    tracing::warn!(operation = what, attempts = attempt + 1, error = %err, "giving up after retries");
                    return Err(err);
                }
                tracing::debug!(operation = what, attempt, ?delay, error = %err, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Durations in config files are written as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            max_elapsed: Duration::from_millis(200),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(VcsError::Server(502))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&fast_policy(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(VcsError::Unauthorized)
        })
        .await;
        assert!(matches!(result, Err(VcsError::Unauthorized)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_when_budget_is_spent() {
        let policy = RetryPolicy {
            initial_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_millis(20),
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(VcsError::RateLimited)
        })
        .await;
        assert!(matches!(result, Err(VcsError::RateLimited)));
        let n = calls.load(Ordering::SeqCst);
        assert!((2..=5).contains(&n), "unexpected attempt count {n}");
    }

    #[test]
    fn policy_reads_milliseconds_from_toml() {
        let policy: RetryPolicy = toml::from_str("initial_interval = 250\nmax_elapsed = 1000").unwrap();
        assert_eq!(policy.initial_interval, Duration::from_millis(250));
        assert_eq!(policy.max_interval, Duration::from_secs(5));
        assert_eq!(policy.max_elapsed, Duration::from_secs(1));
    }
}
