//! A bidirectional entity -> subscription index (spec §4.3, component C3).
//!
//! Two instances run side by side in `SubscriptionManager` — one keyed by
//! system id, one by character id — each an independent
//! `EntityIndex<u32>`/`EntityIndex<u64>`.
//!
//! The reverse map (`subscription -> entities`) is the source of truth; the
//! forward map (`entity -> subscriptions`) is a materialized view kept in
//! sync on every mutation (spec §9 "Cyclic references"). Writers take the
//! single write lock (single-writer semantics); readers take a shared lock,
//! which never blocks behind another reader.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub total_subscriptions: usize,
    pub total_entity_entries: usize,
    pub total_mappings: usize,
}

struct Inner<E: Eq + Hash + Clone> {
    forward: HashMap<E, HashSet<String>>,
    reverse: HashMap<String, Vec<E>>,
}

impl<E: Eq + Hash + Clone> Inner<E> {
    fn new() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }
}

pub struct EntityIndex<E: Eq + Hash + Clone> {
    inner: RwLock<Inner<E>>,
}

impl<E: Eq + Hash + Clone> Default for EntityIndex<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Eq + Hash + Clone> EntityIndex<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
        }
    }

    fn dedup(entities: &[E]) -> Vec<E> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(entities.len());
        for e in entities {
            // HashSet<E> requires Hash+Eq; reuse a throwaway set of indices
            // since E isn't required to be Ord for a stable sort-dedup.
            if seen.insert(IdentityKey(e)) {
                out.push(e.clone());
            }
        }
        out
    }

    /// Insert a new subscription with its entity set. Duplicate entities in
    /// `entities` are collapsed silently (spec §4.3 invariant).
    pub fn add_subscription(&self, sub_id: &str, entities: &[E]) {
        let entities = Self::dedup(entities);
        let mut inner = self.inner.write().unwrap();
        for e in &entities {
            inner
                .forward
                .entry(e.clone())
                .or_insert_with(HashSet::new)
                .insert(sub_id.to_owned());
        }
        inner.reverse.insert(sub_id.to_owned(), entities);
    }

    /// Diff-apply: compute `to_remove = old \ new`, `to_add = new \ old`, and
    /// mutate only the changed forward buckets (spec §4.3 `update_subscription`).
    pub fn update_subscription(&self, sub_id: &str, new_entities: &[E]) {
        let new_entities = Self::dedup(new_entities);
        let mut inner = self.inner.write().unwrap();
        let old_entities = inner.reverse.get(sub_id).cloned().unwrap_or_default();

        let new_set: HashSet<IdentityKey<'_, E>> =
            new_entities.iter().map(IdentityKey).collect();
        let old_set: HashSet<IdentityKey<'_, E>> =
            old_entities.iter().map(IdentityKey).collect();

        let to_remove: Vec<E> = old_entities
            .iter()
            .filter(|e| !new_set.contains(&IdentityKey(e)))
            .cloned()
            .collect();
        let to_add: Vec<E> = new_entities
            .iter()
            .filter(|e| !old_set.contains(&IdentityKey(e)))
            .cloned()
            .collect();

        for e in &to_remove {
            Self::remove_from_forward(&mut inner.forward, e, sub_id);
        }
        for e in &to_add {
            inner
                .forward
                .entry(e.clone())
                .or_insert_with(HashSet::new)
                .insert(sub_id.to_owned());
        }
        inner.reverse.insert(sub_id.to_owned(), new_entities);
    }

    /// Remove a subscription entirely from both maps (spec §4.3
    /// `remove_subscription`).
    pub fn remove_subscription(&self, sub_id: &str) {
        let mut inner = self.inner.write().unwrap();
        let Some(entities) = inner.reverse.remove(sub_id) else {
            return;
        };
        for e in &entities {
            Self::remove_from_forward(&mut inner.forward, e, sub_id);
        }
    }

    fn remove_from_forward(forward: &mut HashMap<E, HashSet<String>>, entity: &E, sub_id: &str) {
        if let Some(set) = forward.get_mut(entity) {
            set.remove(sub_id);
            if set.is_empty() {
                forward.remove(entity);
            }
        }
    }

    /// O(1) lookup of subscriptions for a single entity.
    pub fn find_subscriptions_for_entity(&self, entity: &E) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner
            .forward
            .get(entity)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deduplicated union over multiple entities.
    pub fn find_subscriptions_for_entities(&self, entities: &[E]) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut out = HashSet::new();
        for e in entities {
            if let Some(set) = inner.forward.get(e) {
                out.extend(set.iter().cloned());
            }
        }
        out.into_iter().collect()
    }

    pub fn stats(&self) -> IndexStats {
        let inner = self.inner.read().unwrap();
        IndexStats {
            total_subscriptions: inner.reverse.len(),
            total_entity_entries: inner.forward.len(),
            total_mappings: inner.forward.values().map(HashSet::len).sum(),
        }
    }

    /// Test/debug helper: assert bidirectional consistency (spec §8 invariant 4).
    #[doc(hidden)]
    pub fn is_consistent(&self) -> bool {
        let inner = self.inner.read().unwrap();
        for (sub_id, entities) in &inner.reverse {
            for e in entities {
                match inner.forward.get(e) {
                    Some(set) if set.contains(sub_id) => {}
                    _ => return false,
                }
            }
        }
        for (e, subs) in &inner.forward {
            if subs.is_empty() {
                return false;
            }
            for sub_id in subs {
                match inner.reverse.get(sub_id) {
                    Some(entities) if entities.iter().any(|x| x == e) => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

/// Wraps a `&E` so we can hash/compare entities without requiring `E: Eq +
/// Hash` to be exposed as a trait bound beyond what's already required.
struct IdentityKey<'a, E>(&'a E);

impl<E: PartialEq> PartialEq for IdentityKey<'_, E> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<E: Eq> Eq for IdentityKey<'_, E> {}
impl<E: Hash> Hash for IdentityKey<'_, E> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_lookup() {
        let idx: EntityIndex<u32> = EntityIndex::new();
        idx.add_subscription("sub_1", &[30000142, 30000143]);
        assert_eq!(
            idx.find_subscriptions_for_entity(&30000142),
            vec!["sub_1".to_owned()]
        );
        assert!(idx.is_consistent());
    }

    #[test]
    fn duplicate_entities_collapsed_silently() {
        let idx: EntityIndex<u32> = EntityIndex::new();
        idx.add_subscription("sub_1", &[1, 1, 1, 2]);
        let stats = idx.stats();
        assert_eq!(stats.total_entity_entries, 2);
        assert_eq!(stats.total_mappings, 2);
    }

    #[test]
    fn update_applies_diff() {
        let idx: EntityIndex<u32> = EntityIndex::new();
        idx.add_subscription("sub_1", &[1, 2, 3]);
        idx.update_subscription("sub_1", &[2, 3, 4]);

        assert!(idx.find_subscriptions_for_entity(&1).is_empty());
        assert_eq!(idx.find_subscriptions_for_entity(&4), vec!["sub_1"]);
        assert_eq!(idx.find_subscriptions_for_entity(&2), vec!["sub_1"]);
        assert!(idx.is_consistent());
    }

    #[test]
    fn remove_cleans_up_empty_forward_buckets() {
        let idx: EntityIndex<u32> = EntityIndex::new();
        idx.add_subscription("sub_1", &[1]);
        idx.remove_subscription("sub_1");
        assert!(idx.find_subscriptions_for_entity(&1).is_empty());
        assert_eq!(idx.stats().total_entity_entries, 0);
        assert!(idx.is_consistent());
    }

    #[test]
    fn remove_is_idempotent() {
        let idx: EntityIndex<u32> = EntityIndex::new();
        idx.add_subscription("sub_1", &[1]);
        idx.remove_subscription("sub_1");
        idx.remove_subscription("sub_1");
        assert!(idx.is_consistent());
    }

    #[test]
    fn find_for_entities_unions_and_dedups() {
        let idx: EntityIndex<u32> = EntityIndex::new();
        idx.add_subscription("sub_1", &[1]);
        idx.add_subscription("sub_2", &[2]);
        idx.add_subscription("sub_3", &[1, 2]);

        let mut result = idx.find_subscriptions_for_entities(&[1, 2]);
        result.sort();
        assert_eq!(result, vec!["sub_1", "sub_2", "sub_3"]);
    }

    #[test]
    fn bidirectional_consistency_after_many_mutations() {
        let idx: EntityIndex<u64> = EntityIndex::new();
        idx.add_subscription("a", &[1, 2, 3]);
        idx.add_subscription("b", &[3, 4]);
        idx.update_subscription("a", &[2, 3]);
        idx.remove_subscription("b");
        idx.add_subscription("c", &[4, 5]);
        idx.update_subscription("c", &[]);
        assert!(idx.is_consistent());
        assert!(idx.find_subscriptions_for_entity(&4).is_empty());
    }
}
