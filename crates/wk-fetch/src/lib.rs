//! HTTP fetcher (spec §4.5, component C5): retry-with-backoff wrapper around
//! the upstream gate, plus two specialized adapters (`RefStream`, `Lookups`).

mod error;
mod lookups;
mod refstream;
mod retry;

pub use error::{classify_status, classify_transport};
pub use lookups::{Lookups, NamedEntity};
pub use refstream::{PollOutcome, RefStream};
pub use retry::RetryConfig;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use wk_cache::Cache;
use wk_gate::{ExecuteError, Gate};
use wk_types::{ErrorKind, Priority};

#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "wanderer-kills/0.1".to_owned(),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// GET/POST wrapper with gate-mediated rate limiting, exponential backoff,
/// JSON decoding, and error-taxonomy normalization.
pub struct HttpFetcher {
    client: reqwest::Client,
    gate: Arc<Gate>,
    cache: Arc<Cache>,
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    pub fn new(gate: Arc<Gate>, cache: Arc<Cache>, config: HttpFetcherConfig) -> Result<Self, ErrorKind> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ErrorKind::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            client,
            gate,
            cache,
            config,
        })
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// GET `url`, decode as JSON `T`, under gate + retry + telemetry.
    pub async fn get_json<T>(
        &self,
        url: &str,
        priority: Priority,
        fingerprint: &str,
        coalesce: bool,
    ) -> Result<T, ErrorKind>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        let deadline = Instant::now() + self.config.request_timeout + Duration::from_secs(60);
        let retry_cfg = self.config.retry.clone();
        let client = self.client.clone();
        let url = url.to_owned();

        let outcome = self
            .gate
            .execute(fingerprint, priority, deadline, coalesce, move || {
                let client = client.clone();
                let url = url.clone();
                let retry_cfg = retry_cfg.clone();
                async move { retry::retry_with_backoff(&retry_cfg, || Self::attempt(&client, &url)).await }
            })
            .await;

        match outcome {
            Ok(v) => Ok(v),
            Err(ExecuteError::Upstream(e)) => Err(e),
            Err(ExecuteError::Gate(g)) => Err(Self::gate_error_kind(g)),
        }
    }

    fn gate_error_kind(g: wk_gate::GateError) -> ErrorKind {
        match g {
            wk_gate::GateError::CircuitOpen => ErrorKind::CircuitOpen,
            wk_gate::GateError::QueueFull => ErrorKind::QueueFull,
            wk_gate::GateError::Timeout => ErrorKind::Timeout,
        }
    }

    async fn attempt<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T, ErrorKind> {
        let started = Instant::now();
        debug!(url, "http.request.start");
        let response = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                let kind = classify_transport(&e);
                warn!(url, error = %kind, "http.request.error");
                return Err(kind);
            }
        };
        if let Some(kind) = classify_status(response.status()) {
            warn!(url, status = response.status().as_u16(), "http.request.error");
            return Err(kind);
        }
        let body: T = response
            .json()
            .await
            .map_err(|e| ErrorKind::ParseError(e.to_string()))?;
        debug!(url, elapsed_ms = started.elapsed().as_millis() as u64, "http.request.stop");
        Ok(body)
    }
}
