//! ESI-shaped name lookups, cache-through via [`wk_cache`] (spec §4.1, §4.5).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wk_cache::Namespace;
use wk_types::{ErrorKind, Priority};

use std::sync::Arc;

use crate::HttpFetcher;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NamedEntity {
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct Lookups {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
}

impl Lookups {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    async fn cache_through<T>(&self, ns: Namespace, key: &str, path: &str) -> Result<T, ErrorKind>
    where
        T: Serialize + serde::de::DeserializeOwned + Clone + Send + 'static,
    {
        if let Some(v) = self.fetcher.cache().get::<T>(ns, key) {
            return Ok(v);
        }
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let fingerprint = format!("{}:{}", ns.as_str(), key);
        let value: T = self
            .fetcher
            .get_json(&url, Priority::Background, &fingerprint, true)
            .await?;
        self.fetcher.cache().put(ns, key, &value);
        Ok(value)
    }

    pub async fn fetch_character(&self, id: u64) -> Result<NamedEntity, ErrorKind> {
        self.cache_through(Namespace::CharacterInfo, &id.to_string(), &format!("characters/{id}/"))
            .await
    }

    pub async fn fetch_corporation(&self, id: u64) -> Result<NamedEntity, ErrorKind> {
        self.cache_through(
            Namespace::CorporationInfo,
            &id.to_string(),
            &format!("corporations/{id}/"),
        )
        .await
    }

    pub async fn fetch_alliance(&self, id: u64) -> Result<NamedEntity, ErrorKind> {
        self.cache_through(Namespace::AllianceInfo, &id.to_string(), &format!("alliances/{id}/"))
            .await
    }

    pub async fn fetch_type(&self, id: u32) -> Result<NamedEntity, ErrorKind> {
        self.cache_through(Namespace::ShipType, &id.to_string(), &format!("types/{id}/"))
            .await
    }

    /// Full killmail fetch for a `legacy` reference (spec §4.6 stage 3).
    /// Not cached here — the enrichment pipeline caches the finished,
    /// canonical `Killmail` instead.
    pub async fn fetch_full_killmail(&self, id: u64, hash: &str) -> Result<Value, ErrorKind> {
        let url = format!(
            "{}/killmails/{id}/{hash}/",
            self.base_url.trim_end_matches('/')
        );
        let fingerprint = format!("full_killmail:{id}:{hash}");
        self.fetcher
            .get_json(&url, Priority::Realtime, &fingerprint, true)
            .await
    }
}
