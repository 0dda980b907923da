//! Subscription lifecycle (spec §4.8, component C8), in-process pubsub
//! (§4.9, C9), and outbound webhook delivery (§4.10, C10).
//!
//! `SubscriptionManager` owns both `EntityIndex`es (system, character), the
//! subscription map, a `Broadcaster`, and a `WebhookNotifier`. It holds a
//! `Store` handle by reference, never by copy — Store is the single source
//! of truth for killmail history (spec §4 "Ownership").

mod broadcaster;
mod error;
pub mod payload;
mod webhook;

pub use broadcaster::{Broadcaster, BroadcasterStats, TopicReceiver};
pub use error::SubscriptionError;
pub use payload::DeliveryPayload;
pub use webhook::{WebhookConfig, WebhookNotifier, WebhookStats};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;
use wk_cache::Cache;
use wk_enrich::extract_character_ids_cached;
use wk_index::EntityIndex;
use wk_store::Store;
use wk_types::{ErrorKind, Killmail, Subscription, SubscriptionKind, SubscriptionRequest};

use payload::{system_detailed_topic, system_topic, DeliveryPayload as Payload, ALL_SYSTEMS_TOPIC};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub total_subscriptions: usize,
    pub http_subscriptions: usize,
    pub websocket_subscriptions: usize,
}

/// Bounds on `preload`: up to `max_per_system` killmails per subscribed
/// system, restricted to the last `since_hours` (spec §4.8 `preload`).
#[derive(Debug, Clone, Copy)]
pub struct PreloadConfig {
    pub since_hours: i64,
    pub max_per_system: usize,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            since_hours: 24,
            max_per_system: 50,
        }
    }
}

pub struct SubscriptionManager {
    store: Arc<Store>,
    cache: Arc<Cache>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    system_index: EntityIndex<u32>,
    character_index: EntityIndex<u64>,
    broadcaster: Arc<Broadcaster>,
    webhook: Arc<WebhookNotifier>,
    preload: PreloadConfig,
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<Store>,
        cache: Arc<Cache>,
        broadcaster: Arc<Broadcaster>,
        webhook: Arc<WebhookNotifier>,
        preload: PreloadConfig,
    ) -> Self {
        Self {
            store,
            cache,
            subscriptions: RwLock::new(HashMap::new()),
            system_index: EntityIndex::new(),
            character_index: EntityIndex::new(),
            broadcaster,
            webhook,
            preload,
        }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// spec §4.8 `subscribe`: validate bounds, dedup+sort both lists, assign
    /// `sub_<opaque>`, write both indexes.
    pub fn subscribe(&self, request: SubscriptionRequest) -> Result<String, ErrorKind> {
        let (system_ids, character_ids) =
            wk_types::subscription::normalize_and_validate(request.system_ids, request.character_ids)?;

        let kind = if request.callback_url.is_some() {
            SubscriptionKind::Http
        } else {
            SubscriptionKind::Websocket
        };
        let sub_id = format!("sub_{}", Uuid::new_v4().simple());

        let subscription = Subscription {
            id: sub_id.clone(),
            subscriber_id: request.subscriber_id,
            system_ids: system_ids.clone(),
            character_ids: character_ids.clone(),
            callback_url: request.callback_url,
            kind,
            created_at: Utc::now(),
        };

        self.system_index.add_subscription(&sub_id, &system_ids);
        self.character_index.add_subscription(&sub_id, &character_ids);
        self.subscriptions.write().unwrap().insert(sub_id.clone(), subscription);

        info!(sub_id = %sub_id, "subscription.create");
        Ok(sub_id)
    }

    /// spec §4.8 `unsubscribe`: removes from both indexes and the
    /// subscription map; idempotent on an unknown id.
    pub fn unsubscribe(&self, sub_id: &str) {
        self.system_index.remove_subscription(sub_id);
        self.character_index.remove_subscription(sub_id);
        self.subscriptions.write().unwrap().remove(sub_id);
        debug!(sub_id, "subscription.remove");
    }

    /// Remove every subscription created by `subscriber_id`; idempotent.
    pub fn unsubscribe_subscriber(&self, subscriber_id: &str) {
        let ids: Vec<String> = self
            .subscriptions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.subscriber_id == subscriber_id)
            .map(|s| s.id.clone())
            .collect();
        for id in ids {
            self.unsubscribe(&id);
        }
    }

    /// spec §4.8 `update`: diff-apply new system/character sets to both
    /// indexes, then replace the stored record.
    pub fn update(
        &self,
        sub_id: &str,
        system_ids: Vec<u32>,
        character_ids: Vec<u64>,
    ) -> Result<(), ErrorKind> {
        let (system_ids, character_ids) = wk_types::subscription::normalize_and_validate(system_ids, character_ids)?;

        let mut subs = self.subscriptions.write().unwrap();
        let Some(existing) = subs.get_mut(sub_id) else {
            return Err(SubscriptionError::NotFound(sub_id.to_owned()).into());
        };
        self.system_index.update_subscription(sub_id, &system_ids);
        self.character_index.update_subscription(sub_id, &character_ids);
        existing.system_ids = system_ids;
        existing.character_ids = character_ids;
        Ok(())
    }

    pub fn get(&self, sub_id: &str) -> Option<Subscription> {
        self.subscriptions.read().unwrap().get(sub_id).cloned()
    }

    pub fn list(&self) -> Vec<Subscription> {
        self.subscriptions.read().unwrap().values().cloned().collect()
    }

    pub fn stats(&self) -> SubscriptionStats {
        let subs = self.subscriptions.read().unwrap();
        let (mut http, mut ws) = (0usize, 0usize);
        for s in subs.values() {
            match s.kind {
                SubscriptionKind::Http => http += 1,
                SubscriptionKind::Websocket => ws += 1,
            }
        }
        SubscriptionStats {
            total_subscriptions: subs.len(),
            http_subscriptions: http,
            websocket_subscriptions: ws,
        }
    }

    /// spec §4.8 `dispatch` algorithm: union system-index and
    /// character-index matches, dedup, route each target to the Broadcaster
    /// and (if `kind = http` with a `callback_url`) enqueue a webhook.
    ///
    /// The Broadcaster's topics (`system:{id}`, `system:{id}:detailed`,
    /// `all_systems`) are published unconditionally — they're the transport
    /// layer's WS fan-out, joined directly by `killmails:lobby` clients
    /// independent of whether any `SubscriptionManager` record matches this
    /// killmail. `targets` only gates webhook delivery, which needs an
    /// explicit callback to POST to.
    pub fn dispatch(&self, killmail: &Killmail) {
        self.publish_topics(killmail);
        for sub_id in self.dispatch_targets(killmail) {
            self.deliver_webhook_if_configured(&sub_id, std::slice::from_ref(killmail));
        }
    }

    /// spec §4.8 "Batch dispatch": group killmails by target subscription in
    /// one pass so each subscription's webhook carries every kill it
    /// matched in this batch as a single POST.
    pub fn dispatch_batch(&self, killmails: &[Killmail]) {
        let mut per_subscription: HashMap<String, Vec<Killmail>> = HashMap::new();

        for killmail in killmails {
            self.publish_topics(killmail);
            for sub_id in self.dispatch_targets(killmail) {
                per_subscription.entry(sub_id).or_default().push(killmail.clone());
            }
        }

        for (sub_id, kills) in per_subscription {
            self.deliver_webhook_if_configured(&sub_id, &kills);
        }
    }

    fn publish_topics(&self, killmail: &Killmail) {
        let update = Payload::KillmailUpdate {
            system_id: killmail.system_id,
            kills: vec![killmail.clone()],
            timestamp: Utc::now(),
        };
        self.broadcaster.publish(&system_topic(killmail.system_id), update.clone());
        self.broadcaster
            .publish(&system_detailed_topic(killmail.system_id), update.clone());
        self.broadcaster.publish(ALL_SYSTEMS_TOPIC, update);
    }

    fn dispatch_targets(&self, killmail: &Killmail) -> Vec<String> {
        let sys_subs = self.system_index.find_subscriptions_for_entity(&killmail.system_id);
        let char_ids = extract_character_ids_cached(&self.cache, killmail);
        let char_subs = self.character_index.find_subscriptions_for_entities(&char_ids);

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for sub_id in sys_subs.into_iter().chain(char_subs) {
            if seen.insert(sub_id.clone()) {
                targets.push(sub_id);
            }
        }
        targets
    }

    fn deliver_webhook_if_configured(&self, sub_id: &str, kills: &[Killmail]) {
        let Some(subscription) = self.get(sub_id) else {
            return;
        };
        if subscription.kind != SubscriptionKind::Http {
            return;
        }
        let Some(url) = subscription.callback_url.clone() else {
            return;
        };
        if kills.is_empty() {
            return;
        }
        let payload = Payload::KillmailUpdate {
            system_id: kills[0].system_id,
            kills: kills.to_vec(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.webhook.notify(&url, payload, sub_id) {
            debug!(sub_id, error = %e, "webhook.notify.rejected");
        }
    }

    /// spec §4.8 `preload`: replay up to `max_per_system` recent killmails
    /// (within `since_hours`) for each of `sub_id`'s subscribed systems, as
    /// if freshly ingested, at priority `preload`. Runs against the local
    /// Store, not the upstream — the subscriber is catching up on history
    /// the service already holds.
    pub async fn preload(self: &Arc<Self>, sub_id: &str) {
        let Some(subscription) = self.get(sub_id) else {
            return;
        };
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_preload(&subscription).await;
        });
    }

    async fn run_preload(&self, subscription: &Subscription) {
        let cutoff = Utc::now() - chrono::Duration::hours(self.preload.since_hours);
        for &system_id in &subscription.system_ids {
            let mut kills: Vec<Killmail> = self
                .store
                .list_by_system(system_id)
                .into_iter()
                .filter(|k| k.kill_time >= cutoff)
                .collect();
            kills.sort_by_key(|k| k.kill_time);
            kills.truncate(self.preload.max_per_system);
            if kills.is_empty() {
                continue;
            }
            debug!(sub_id = %subscription.id, system_id, count = kills.len(), "subscription.preload.batch");
            self.deliver_webhook_if_configured(&subscription.id, &kills);
        }
    }
}
