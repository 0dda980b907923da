use std::future::Future;
use std::time::Duration;

use wk_types::ErrorKind;

/// Base 1s, factor 2, cap 30s, 3-5 retries per upstream (spec §4.5). Retry
/// set: `{429, 5xx, network}`; everything else is non-retryable.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(30),
            max_retries: 4,
        }
    }
}

/// Runs `attempt` until it succeeds, returns a non-retryable error, or the
/// retry budget is exhausted. The circuit breaker only sees the final
/// outcome of this whole sequence (spec §4.4: "failure = upstream 429 or
/// 5xx *after local retries*").
pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, mut attempt: F) -> Result<T, ErrorKind>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ErrorKind>>,
{
    let mut delay = config.base;
    let mut tries = 0u32;
    loop {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && tries < config.max_retries => {
                tries += 1;
                tracing::warn!(
                    error = %e,
                    attempt = tries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying upstream request"
                );
                tokio::time::sleep(delay).await;
                let next = delay.as_secs_f64() * config.factor;
                delay = Duration::from_secs_f64(next.min(config.cap.as_secs_f64()));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retrying_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&RetryConfig::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ErrorKind>(7)
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_up_to_the_budget() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            max_retries: 2,
            ..RetryConfig::default()
        };
        let result = retry_with_backoff(&cfg, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(ErrorKind::ServerError(503))
        })
        .await;
        assert_eq!(result, Err(ErrorKind::ServerError(503)));
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&RetryConfig::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(ErrorKind::ClientError(404))
        })
        .await;
        assert_eq!(result, Err(ErrorKind::ClientError(404)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&RetryConfig::default(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ErrorKind::RateLimited)
            } else {
                Ok(1)
            }
        })
        .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
