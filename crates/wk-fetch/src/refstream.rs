//! RefStream adapter: long-poll against upstream A's `listen.php` endpoint
//! (spec §4.5, §6).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use wk_types::{ErrorKind, Priority};

use crate::HttpFetcher;

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    package: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    None,
    NewFormat { killmail: Value, zkb: Value },
    Legacy { kill_id: u64, zkb: Value },
    UnexpectedFormat(Value),
}

#[derive(Clone)]
pub struct RefStream {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
    queue_id: String,
    time_to_wait: u8,
}

impl RefStream {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: impl Into<String>, queue_id: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            queue_id: queue_id.into(),
            time_to_wait: 5,
        }
    }

    pub fn with_time_to_wait(mut self, ttw: u8) -> Self {
        self.time_to_wait = ttw.clamp(1, 10);
        self
    }

    pub async fn poll(&self) -> Result<PollOutcome, ErrorKind> {
        let url = format!(
            "{}/listen.php?queueID={}&ttw={}",
            self.base_url.trim_end_matches('/'),
            self.queue_id,
            self.time_to_wait
        );
        let fingerprint = format!("refstream:{}", self.queue_id);
        let envelope: Envelope = self
            .fetcher
            .get_json(&url, Priority::Realtime, &fingerprint, true)
            .await?;
        Ok(Self::classify(envelope.package))
    }

    fn classify(package: Option<Value>) -> PollOutcome {
        let Some(v) = package else {
            return PollOutcome::None;
        };
        if v.get("killmail").is_some() && v.get("zkb").is_some() {
            return PollOutcome::NewFormat {
                killmail: v["killmail"].clone(),
                zkb: v["zkb"].clone(),
            };
        }
        if let (Some(kill_id), Some(zkb)) = (v.get("killID").and_then(Value::as_u64), v.get("zkb")) {
            return PollOutcome::Legacy {
                kill_id,
                zkb: zkb.clone(),
            };
        }
        PollOutcome::UnexpectedFormat(v)
    }
}
