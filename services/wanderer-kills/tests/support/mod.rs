//! Shared helpers for the end-to-end scenario tests in this directory.
//! Each test wires a full [`wanderer_kills::App`] against one or two
//! [`MockUpstream`] instances instead of real zKillboard/ESI endpoints.

use std::time::Duration;

use wanderer_kills::config::{Config, PollConfig, UpstreamConfig, WebhookSettings};
use wk_test_support::MockUpstream;

/// A `Config` tuned for fast, deterministic tests: short poll intervals, a
/// generous acceptance window (callers pick `since_hours` per-scenario via
/// [`test_config_with_since_hours`]), and zero webhook workers by default so
/// delivery can be driven and asserted on deliberately where it matters.
pub fn test_config(zkb_url: &str, esi_url: &str) -> Config {
    test_config_with_since_hours(zkb_url, esi_url, 100_000)
}

pub fn test_config_with_since_hours(zkb_url: &str, esi_url: &str, since_hours: i64) -> Config {
    Config {
        zkb: upstream(zkb_url),
        esi: upstream(esi_url),
        poll: PollConfig {
            fast_interval: Duration::from_millis(20),
            idle_interval: Duration::from_millis(20),
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(200),
            backoff_factor: 2.0,
        },
        cache_ttls: Vec::new(),
        store_retention_cap: None,
        gateway_bind: "127.0.0.1:0".to_owned(),
        webhook: WebhookSettings {
            workers: 4,
            queue_cap: 1000,
            timeout: Duration::from_secs(5),
        },
        since_hours,
        strict_enrichment: false,
        queue_id: "test-queue".to_owned(),
    }
}

fn upstream(base_url: &str) -> UpstreamConfig {
    UpstreamConfig {
        base_url: base_url.to_owned(),
        capacity: 50,
        refill_per_sec: 50.0,
        max_queue_depth: 100,
        circuit_failure_threshold: 3,
        circuit_reset_after: Duration::from_millis(100),
    }
}

/// Poll `check` every 20ms for up to `timeout` until it returns `true`.
/// Integration tests drive a real `Poller` loop on a background task, so
/// assertions must wait for ingestion rather than happening synchronously.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn two_upstreams() -> (MockUpstream, MockUpstream) {
    (MockUpstream::start().await, MockUpstream::start().await)
}
