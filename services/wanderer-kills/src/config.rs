//! Process configuration loading (SPEC_FULL.md §10.3).
//!
//! TOML is the sole configuration source; no environment-variable overrides
//! except `LOG_LEVEL`/`RUST_LOG` and the gateway bind address, mirroring the
//! teacher's forwarder config loader (`services/forwarder/src/config.rs`).
//! Unlike that loader, validation errors are *collected* and reported
//! together rather than short-circuiting on the first missing field (spec
//! §10.3: "Validation errors are collected and reported together").

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Config {
    pub zkb: UpstreamConfig,
    pub esi: UpstreamConfig,
    pub poll: PollConfig,
    pub cache_ttls: Vec<(String, Duration)>,
    pub store_retention_cap: Option<usize>,
    pub gateway_bind: String,
    pub webhook: WebhookSettings,
    pub since_hours: i64,
    pub strict_enrichment: bool,
    pub queue_id: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub capacity: u32,
    pub refill_per_sec: f64,
    pub max_queue_depth: usize,
    pub circuit_failure_threshold: u32,
    pub circuit_reset_after: Duration,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub fast_interval: Duration,
    pub idle_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub workers: usize,
    pub queue_cap: usize,
    pub timeout: Duration,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (all-Option, per the teacher's pattern)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    upstreams: Option<RawUpstreams>,
    poll: Option<RawPoll>,
    cache: Option<RawCache>,
    store: Option<RawStore>,
    gateway: Option<RawGateway>,
    webhook: Option<RawWebhook>,
    ingest: Option<RawIngest>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUpstreams {
    zkb: Option<RawUpstream>,
    esi: Option<RawUpstream>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUpstream {
    base_url: Option<String>,
    capacity: Option<u32>,
    refill_rate_per_sec: Option<f64>,
    max_queue_depth: Option<usize>,
    circuit_threshold: Option<u32>,
    circuit_reset_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPoll {
    fast_interval_secs: Option<u64>,
    idle_interval_secs: Option<u64>,
    initial_backoff_secs: Option<u64>,
    max_backoff_secs: Option<u64>,
    backoff_factor: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCache {
    ttls: Option<std::collections::BTreeMap<String, u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStore {
    retention_cap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGateway {
    bind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWebhook {
    workers: Option<usize>,
    queue_cap: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIngest {
    since_hours: Option<i64>,
    strict_enrichment: Option<bool>,
    queue_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration:")?;
        for p in &self.problems {
            write!(f, "\n  - {p}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

pub fn load_config_from_path(path: &Path) -> anyhow::Result<Config> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading config file '{}': {e}", path.display()))?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> anyhow::Result<Config> {
    let raw: RawConfig = toml::from_str(toml_str)?;
    let mut problems = Vec::new();

    let upstreams = raw.upstreams.unwrap_or_default();
    let zkb = build_upstream(upstreams.zkb, "upstreams.zkb", &mut problems);
    let esi = build_upstream(upstreams.esi, "upstreams.esi", &mut problems);

    let raw_poll = raw.poll.unwrap_or_default();
    let poll = PollConfig {
        fast_interval: Duration::from_secs(raw_poll.fast_interval_secs.unwrap_or(1)),
        idle_interval: Duration::from_secs(raw_poll.idle_interval_secs.unwrap_or(5)),
        initial_backoff: Duration::from_secs(raw_poll.initial_backoff_secs.unwrap_or(1)),
        max_backoff: Duration::from_secs(raw_poll.max_backoff_secs.unwrap_or(30)),
        backoff_factor: raw_poll.backoff_factor.unwrap_or(2.0),
    };
    if poll.backoff_factor <= 1.0 {
        problems.push("poll.backoff_factor must be > 1.0".to_owned());
    }

    let cache_ttls = raw
        .cache
        .unwrap_or_default()
        .ttls
        .unwrap_or_default()
        .into_iter()
        .map(|(ns, secs)| (ns, Duration::from_secs(secs)))
        .collect();

    let store_retention_cap = raw.store.unwrap_or_default().retention_cap;

    let gateway_bind = raw
        .gateway
        .unwrap_or_default()
        .bind
        .unwrap_or_else(|| "0.0.0.0:8080".to_owned());

    let raw_webhook = raw.webhook.unwrap_or_default();
    let webhook = WebhookSettings {
        workers: raw_webhook.workers.unwrap_or(4),
        queue_cap: raw_webhook.queue_cap.unwrap_or(1000),
        timeout: Duration::from_secs(raw_webhook.timeout_secs.unwrap_or(10)),
    };

    let raw_ingest = raw.ingest.unwrap_or_default();
    let since_hours = raw_ingest.since_hours.unwrap_or(1);
    if since_hours <= 0 {
        problems.push("ingest.since_hours must be positive".to_owned());
    }
    let strict_enrichment = raw_ingest.strict_enrichment.unwrap_or(false);
    let queue_id = raw_ingest.queue_id.unwrap_or_else(default_queue_id);

    if !problems.is_empty() {
        return Err(ConfigError { problems }.into());
    }

    Ok(Config {
        zkb,
        esi,
        poll,
        cache_ttls,
        store_retention_cap,
        gateway_bind,
        webhook,
        since_hours,
        strict_enrichment,
        queue_id,
    })
}

fn build_upstream(raw: Option<RawUpstream>, section: &str, problems: &mut Vec<String>) -> UpstreamConfig {
    let raw = raw.unwrap_or_default();
    let base_url = raw.base_url.unwrap_or_else(|| {
        problems.push(format!("{section}.base_url is required"));
        String::new()
    });
    UpstreamConfig {
        base_url,
        capacity: raw.capacity.unwrap_or(20),
        refill_per_sec: raw.refill_rate_per_sec.unwrap_or(20.0),
        max_queue_depth: raw.max_queue_depth.unwrap_or(500),
        circuit_failure_threshold: raw.circuit_threshold.unwrap_or(5),
        circuit_reset_after: Duration::from_secs(raw.circuit_reset_secs.unwrap_or(30)),
    }
}

/// A per-instance stable random token (spec §6: "The queueID is a
/// per-instance stable random token").
fn default_queue_id() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let toml = r#"
            [upstreams.zkb]
            base_url = "https://zkillboard.com/api"
            [upstreams.esi]
            base_url = "https://esi.evetech.net/latest"
        "#;
        let cfg = load_config_from_str(toml).unwrap();
        assert_eq!(cfg.zkb.base_url, "https://zkillboard.com/api");
        assert_eq!(cfg.poll.fast_interval, Duration::from_secs(1));
        assert_eq!(cfg.gateway_bind, "0.0.0.0:8080");
        assert_eq!(cfg.queue_id.len(), 16);
    }

    #[test]
    fn collects_every_validation_problem_together() {
        let toml = r#"
            [poll]
            backoff_factor = 0.5
            [ingest]
            since_hours = -1
        "#;
        let err = load_config_from_str(toml).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("upstreams.zkb.base_url"));
        assert!(message.contains("upstreams.esi.base_url"));
        assert!(message.contains("backoff_factor"));
        assert!(message.contains("since_hours"));
    }

    #[test]
    fn explicit_queue_id_overrides_random_default() {
        let toml = r#"
            [upstreams.zkb]
            base_url = "https://zkillboard.com/api"
            [upstreams.esi]
            base_url = "https://esi.evetech.net/latest"
            [ingest]
            queue_id = "fixed-queue-id"
        "#;
        let cfg = load_config_from_str(toml).unwrap();
        assert_eq!(cfg.queue_id, "fixed-queue-id");
    }
}
