//! A namespaced, TTL-bounded key/value cache for enrichment lookups and
//! per-system metadata (spec §4.1, component C1).
//!
//! Storage is sharded by `(namespace, key)` hash so that writers only
//! contend with other writers touching the same shard; reads take a shared
//! lock and never block on an unrelated shard's writer.

mod namespace;

pub use namespace::Namespace;

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};

const SHARD_COUNT: usize = 16;

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    inserted_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

type Shard = RwLock<HashMap<(String, String), Entry>>;

/// The cache, shared by reference across the process.
pub struct Cache {
    shards: Vec<Shard>,
    ttl_overrides: RwLock<HashMap<&'static str, Duration>>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self {
            shards,
            ttl_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Override the default TTL for a namespace (spec §4.1: "TTLs
    /// configurable per-namespace").
    pub fn set_ttl(&self, ns: Namespace, ttl: Duration) {
        self.ttl_overrides.write().unwrap().insert(ns.as_str(), ttl);
    }

    fn ttl_for(&self, ns: Namespace) -> Duration {
        self.ttl_overrides
            .read()
            .unwrap()
            .get(ns.as_str())
            .copied()
            .unwrap_or_else(|| ns.default_ttl())
    }

    fn shard_index(ns: Namespace, key: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        ns.as_str().hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }

    /// Insert or overwrite `key` in `ns` with the namespace's configured TTL.
    pub fn put<T: Serialize>(&self, ns: Namespace, key: &str, value: &T) {
        let encoded = serde_json::to_vec(value).expect("cache values must serialize");
        let entry = Entry {
            value: encoded,
            inserted_at: Instant::now(),
            ttl: self.ttl_for(ns),
        };
        let idx = Self::shard_index(ns, key);
        let mut shard = self.shards[idx].write().unwrap();
        shard.insert((ns.as_str().to_owned(), key.to_owned()), entry);
    }

    /// Look up `key` in `ns`. A missing or TTL-expired key is not an error:
    /// returns `None` (spec §4.1 "Failure: missing key is not an error").
    pub fn get<T: DeserializeOwned>(&self, ns: Namespace, key: &str) -> Option<T> {
        let idx = Self::shard_index(ns, key);
        let shard = self.shards[idx].read().unwrap();
        let entry = shard.get(&(ns.as_str().to_owned(), key.to_owned()))?;
        if entry.is_expired() {
            return None;
        }
        serde_json::from_slice(&entry.value).ok()
    }

    pub fn delete(&self, ns: Namespace, key: &str) {
        let idx = Self::shard_index(ns, key);
        let mut shard = self.shards[idx].write().unwrap();
        shard.remove(&(ns.as_str().to_owned(), key.to_owned()));
    }

    pub fn exists(&self, ns: Namespace, key: &str) -> bool {
        let idx = Self::shard_index(ns, key);
        let shard = self.shards[idx].read().unwrap();
        match shard.get(&(ns.as_str().to_owned(), key.to_owned())) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    /// Count of live (non-expired) entries in `ns`. `O(n)` over all shards;
    /// intended for stats/telemetry, not hot paths.
    pub fn size(&self, ns: Namespace) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .unwrap()
                    .iter()
                    .filter(|((shard_ns, _), entry)| shard_ns == ns.as_str() && !entry.is_expired())
                    .count()
            })
            .sum()
    }

    /// Sweep every shard and drop expired entries. Intended to be called
    /// periodically by a background task; `get`/`exists` already treat
    /// expired entries as absent, so this is purely a memory-reclamation
    /// pass, never required for correctness.
    pub fn purge_expired(&self) -> usize {
        let mut purged = 0;
        for shard in &self.shards {
            let mut shard = shard.write().unwrap();
            let before = shard.len();
            shard.retain(|_, entry| !entry.is_expired());
            purged += before - shard.len();
        }
        purged
    }
}
