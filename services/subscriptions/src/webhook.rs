//! Outbound webhook delivery (spec §4.10, component C10).
//!
//! A bounded worker pool drains a single FIFO job queue. The queue itself
//! enforces spec §5's drop-oldest backpressure — plain `tokio::mpsc` blocks
//! the producer on a full channel instead, which doesn't match "excess work
//! queued, older entries dropped when queue exceeds cap" — so the queue is a
//! hand-rolled `Mutex<VecDeque<_>>` plus a `Notify` to wake idle workers,
//! mirroring the shape of the teacher's bounded worker pools without reusing
//! channel backpressure semantics that don't fit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::SubscriptionError;
use crate::payload::DeliveryPayload;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub workers: usize,
    pub queue_cap: usize,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_cap: 1000,
            user_agent: "wanderer-kills/0.1".to_owned(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookStats {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub queue_depth: usize,
}

struct WebhookJob {
    url: String,
    payload: DeliveryPayload,
    sub_id: String,
}

struct Inner {
    queue: Mutex<VecDeque<WebhookJob>>,
    notify: Notify,
    client: reqwest::Client,
    config: WebhookConfig,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Bounded-concurrency, best-effort, single-attempt HTTP POST delivery.
pub struct WebhookNotifier {
    inner: Arc<Inner>,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("webhook http client failed to build");
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            client,
            config,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        for _ in 0..inner.config.workers {
            tokio::spawn(worker_loop(inner.clone()));
        }
        Arc::new(Self { inner })
    }

    /// Validate `url`, then enqueue `payload` for delivery to `sub_id`'s
    /// callback. Dropping the oldest queued job on overflow is the only
    /// backpressure behavior (spec §5); this call itself never blocks.
    pub fn notify(&self, url: &str, payload: DeliveryPayload, sub_id: &str) -> Result<(), SubscriptionError> {
        validate_webhook_url(url)?;

        let mut queue = self.inner.queue.lock().unwrap();
        if queue.len() >= self.inner.config.queue_cap {
            queue.pop_front();
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(WebhookJob {
            url: url.to_owned(),
            payload,
            sub_id: sub_id.to_owned(),
        });
        drop(queue);
        self.inner.notify.notify_one();
        Ok(())
    }

    pub fn stats(&self) -> WebhookStats {
        WebhookStats {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            queue_depth: self.inner.queue.lock().unwrap().len(),
        }
    }
}

/// spec §4.10: "validates URL is well-formed http(s)".
fn validate_webhook_url(url: &str) -> Result<(), SubscriptionError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| SubscriptionError::Validation(format!("invalid callback_url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SubscriptionError::Validation(format!(
            "callback_url scheme must be http or https, got {other}"
        ))),
    }
}

async fn worker_loop(inner: Arc<Inner>) {
    loop {
        let job = inner.queue.lock().unwrap().pop_front();
        let Some(job) = job else {
            inner.notify.notified().await;
            continue;
        };
        deliver(&inner, job).await;
    }
}

async fn deliver(inner: &Inner, job: WebhookJob) {
    debug!(url = %job.url, sub_id = %job.sub_id, "webhook.deliver.start");
    let result = inner
        .client
        .post(&job.url)
        .header("User-Agent", &inner.config.user_agent)
        .json(&job.payload)
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => {
            inner.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(resp) => {
            warn!(url = %job.url, status = resp.status().as_u16(), "webhook.deliver.failed");
            inner.failed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            warn!(url = %job.url, error = %e, "webhook.deliver.error");
            inner.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wk_test_support::MockUpstream;

    fn count_update(system_id: u32, count: u64) -> DeliveryPayload {
        DeliveryPayload::KillmailCountUpdate {
            system_id,
            count,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(validate_webhook_url("ftp://host/cb").is_err());
        assert!(validate_webhook_url("not a url").is_err());
        assert!(validate_webhook_url("https://host/cb").is_ok());
    }

    #[tokio::test]
    async fn delivers_posted_payload_to_callback() {
        let upstream = MockUpstream::start().await;
        upstream.set_response("cb", serde_json::json!({"ok": true}));
        let notifier = WebhookNotifier::new(WebhookConfig::default());

        let url = format!("{}/cb", upstream.base_url());
        notifier.notify(&url, count_update(1, 5), "sub_1").unwrap();

        for _ in 0..50 {
            if notifier.stats().delivered == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(notifier.stats().delivered, 1);
        assert_eq!(upstream.call_count("cb"), 1);
    }

    #[tokio::test]
    async fn overflowing_queue_drops_oldest_entry() {
        let notifier = WebhookNotifier::new(WebhookConfig {
            workers: 0,
            queue_cap: 2,
            ..WebhookConfig::default()
        });
        notifier.notify("http://127.0.0.1:1/a", count_update(1, 1), "sub_1").unwrap();
        notifier.notify("http://127.0.0.1:1/b", count_update(1, 2), "sub_1").unwrap();
        notifier.notify("http://127.0.0.1:1/c", count_update(1, 3), "sub_1").unwrap();

        let stats = notifier.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.queue_depth, 2);
    }
}
