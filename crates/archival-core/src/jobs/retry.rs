//! Retry policy: bounded exponential backoff with symmetric jitter, applied
//! uniformly to both workers' job execution paths.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// The single retry shape this service applies: at most `max_retries`
/// additional attempts after the first, doubling delay each time, capped
/// at `max_delay`, with `jitter` applied symmetrically, and an optional
/// overall elapsed-time ceiling that abandons retries early even if
/// attempts remain.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            jitter: 0.3,
            max_elapsed_time: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt` (1-indexed: the first retry is
    /// attempt 1). Returns `None` once `attempt` exceeds `max_retries`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }

        let exponent = (attempt - 1) as f64;
        let delay_secs = self.base_delay.as_secs_f64() * 2f64.powf(exponent);
        let delay_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let jitter_range = delay_secs * self.jitter;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Some(Duration::from_secs_f64((delay_secs + jitter).max(0.0)))
    }
}

/// Run `op` under this policy, sleeping between attempts and stopping
/// early if `max_elapsed_time` is exceeded or the error is not retryable
/// (per `is_retryable`). Returns the last error if all attempts fail.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = tokio::time::Instant::now();
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !is_retryable(&error) {
                    return Err(error);
                }

                attempt += 1;
                let delay = match policy.delay_for_attempt(attempt) {
                    Some(delay) => delay,
                    None => return Err(error),
                };

                if let Some(max_elapsed) = policy.max_elapsed_time {
                    if started.elapsed() + delay > max_elapsed {
                        warn!("abandoning retries: max_elapsed_time would be exceeded");
                        return Err(error);
                    }
                }

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_for_attempt_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            jitter: 0.0,
            max_elapsed_time: None,
        };

        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_delay_for_attempt_exhausted() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for_attempt(0).is_none());
        assert!(policy.delay_for_attempt(policy.max_retries + 1).is_none());
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_failures() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
            max_elapsed_time: None,
        };

        let mut calls = 0;
        let result: Result<u32, &str> = with_retry(&policy, |_| true, || {
            calls += 1;
            async move {
                if calls < 2 {
                    Err("transient")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_non_retryable() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result: Result<u32, &str> = with_retry(&policy, |_| false, || {
            calls += 1;
            async move { Err("fatal") }
        })
        .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls, 1);
    }
}
