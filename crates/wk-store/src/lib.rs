//! Append-only per-system event log with per-client offsets (spec §4.2,
//! component C2).
//!
//! Writers serialize on the event-id allocator (an atomic counter); readers
//! of the log take a shared lock and never block on the allocator. Offset
//! map updates are per-client, via a mutex held only for the duration of one
//! `fetch_for_client`/`fetch_one_event` call, so concurrent calls from
//! distinct clients never contend with each other.

mod error;

pub use error::StoreError;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use wk_types::{ClientOffsets, Event, Killmail};

/// Event ids are allocated from `1..EVENT_SPACE_LIMIT`; beyond that the
/// store refuses further inserts (spec §4.2: "If event-id overflow is
/// reached (2^63)").
const EVENT_SPACE_LIMIT: u64 = 1 << 63;

/// Outcome of [`Store::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The stored record changed (new killmail, or a new version of an
    /// existing one); an event was appended.
    Inserted { event_id: u64 },
    /// A pure re-store of the identical record; no event was appended.
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_events: u64,
    pub total_killmails: u64,
    pub evicted_events: u64,
}

struct ClientState {
    offsets: Mutex<ClientOffsets>,
}

/// The event store (spec §3 "Lifecycle", §4.2).
pub struct Store {
    next_event_id: AtomicU64,
    by_id: RwLock<HashMap<u64, Killmail>>,
    /// Per-system ordered event log.
    log: RwLock<HashMap<u32, Vec<Event>>>,
    /// Global insertion order of `(system_id, event_id)`, used to drive
    /// oldest-first retention eviction (spec §5 "Backpressure").
    insertion_order: RwLock<VecDeque<(u32, u64)>>,
    clients: RwLock<HashMap<String, ClientState>>,
    system_fetch_timestamp: RwLock<HashMap<u32, chrono::DateTime<Utc>>>,
    system_kill_count: RwLock<HashMap<u32, u64>>,
    retention_cap: Option<usize>,
    evicted_events: AtomicU64,
}

impl Store {
    pub fn new() -> Self {
        Self::with_retention_cap(None)
    }

    /// Construct a store that evicts the oldest events once the total event
    /// count exceeds `cap` (spec §5: "configure a retention cap that evicts
    /// oldest events once total event count exceeds a threshold").
    pub fn with_retention_cap(cap: Option<usize>) -> Self {
        Self {
            next_event_id: AtomicU64::new(1),
            by_id: RwLock::new(HashMap::new()),
            log: RwLock::new(HashMap::new()),
            insertion_order: RwLock::new(VecDeque::new()),
            clients: RwLock::new(HashMap::new()),
            system_fetch_timestamp: RwLock::new(HashMap::new()),
            system_kill_count: RwLock::new(HashMap::new()),
            retention_cap: cap,
            evicted_events: AtomicU64::new(0),
        }
    }

    /// Idempotent upsert: appends an event only if the stored record
    /// actually changed (spec §4.2 `put`).
    pub fn put(
        &self,
        killmail_id: u64,
        system_id: u32,
        killmail: Killmail,
    ) -> Result<PutOutcome, StoreError> {
        {
            let by_id = self.by_id.read().unwrap();
            if let Some(existing) = by_id.get(&killmail_id) {
                if existing == &killmail {
                    return Ok(PutOutcome::Unchanged);
                }
            }
        }
        let event_id = self.insert_event(system_id, killmail)?;
        Ok(PutOutcome::Inserted { event_id })
    }

    pub fn get(&self, killmail_id: u64) -> Option<Killmail> {
        self.by_id.read().unwrap().get(&killmail_id).cloned()
    }

    /// Current killmails known for `system_id`, newest-version, in
    /// first-seen order (spec §4.2 `list_by_system`).
    pub fn list_by_system(&self, system_id: u32) -> Vec<Killmail> {
        let log = self.log.read().unwrap();
        let by_id = self.by_id.read().unwrap();
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        if let Some(events) = log.get(&system_id) {
            for event in events {
                if seen.insert(event.killmail.killmail_id) {
                    if let Some(km) = by_id.get(&event.killmail.killmail_id) {
                        out.push(km.clone());
                    }
                }
            }
        }
        out
    }

    /// Unconditionally allocate the next event id, append to the per-system
    /// log, and upsert the by-id map (spec §4.2 `insert_event`).
    pub fn insert_event(&self, system_id: u32, killmail: Killmail) -> Result<u64, StoreError> {
        let event_id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        if event_id >= EVENT_SPACE_LIMIT {
            return Err(StoreError::EventSpaceExhausted);
        }
        let killmail_id = killmail.killmail_id;
        let event = Event {
            event_id,
            system_id,
            killmail: killmail.clone(),
        };

        {
            let mut by_id = self.by_id.write().unwrap();
            by_id.insert(killmail_id, killmail);
        }
        {
            let mut log = self.log.write().unwrap();
            log.entry(system_id).or_default().push(event);
        }
        {
            let mut order = self.insertion_order.write().unwrap();
            order.push_back((system_id, event_id));
        }
        self.increment_system_kill_count(system_id);
        self.enforce_retention();
        Ok(event_id)
    }

    fn enforce_retention(&self) {
        let Some(cap) = self.retention_cap else {
            return;
        };
        loop {
            let total = self.insertion_order.read().unwrap().len();
            if total <= cap {
                break;
            }
            let oldest = {
                let mut order = self.insertion_order.write().unwrap();
                order.pop_front()
            };
            let Some((system_id, event_id)) = oldest else {
                break;
            };
            let mut log = self.log.write().unwrap();
            if let Some(events) = log.get_mut(&system_id) {
                events.retain(|e| e.event_id != event_id);
            }
            self.evicted_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn with_client<T>(&self, client_id: &str, f: impl FnOnce(&mut ClientOffsets) -> T) -> T {
        {
            let clients = self.clients.read().unwrap();
            if let Some(state) = clients.get(client_id) {
                let mut offsets = state.offsets.lock().unwrap();
                return f(&mut offsets);
            }
        }
        let mut clients = self.clients.write().unwrap();
        let state = clients
            .entry(client_id.to_owned())
            .or_insert_with(|| ClientState {
                offsets: Mutex::new(ClientOffsets::new()),
            });
        let mut offsets = state.offsets.lock().unwrap();
        f(&mut offsets)
    }

    /// Returns events across `system_ids` strictly newer than the client's
    /// stored offsets, ascending by `event_id`, and advances the offsets
    /// (spec §4.2 `fetch_for_client`, §8 invariants 1-3).
    pub fn fetch_for_client(&self, client_id: &str, system_ids: &[u32]) -> Vec<Event> {
        self.with_client(client_id, |offsets| {
            let log = self.log.read().unwrap();
            let mut out = Vec::new();
            for &system_id in system_ids {
                let floor = offsets.get(system_id);
                if let Some(events) = log.get(&system_id) {
                    for event in events {
                        if event.event_id > floor {
                            out.push(event.clone());
                        }
                    }
                }
            }
            out.sort_by_key(|e| e.event_id);
            for event in &out {
                offsets.advance(event.system_id, event.event_id);
            }
            out
        })
    }

    /// Same contract as `fetch_for_client` but returns only the single
    /// earliest event, advancing the offset only for that event's system
    /// (spec §4.2 `fetch_one_event`).
    pub fn fetch_one_event(&self, client_id: &str, system_ids: &[u32]) -> Option<Event> {
        self.with_client(client_id, |offsets| {
            let log = self.log.read().unwrap();
            let mut best: Option<Event> = None;
            for &system_id in system_ids {
                let floor = offsets.get(system_id);
                if let Some(events) = log.get(&system_id) {
                    for event in events {
                        let is_better = match &best {
                            Some(b) => event.event_id < b.event_id,
                            None => true,
                        };
                        if event.event_id > floor && is_better {
                            best = Some(event.clone());
                        }
                    }
                }
            }
            if let Some(event) = &best {
                offsets.advance(event.system_id, event.event_id);
            }
            best
        })
    }

    pub fn get_client_offsets(&self, client_id: &str) -> ClientOffsets {
        self.with_client(client_id, |offsets| offsets.clone())
    }

    pub fn put_client_offsets(&self, client_id: &str, new_offsets: ClientOffsets) {
        self.with_client(client_id, |offsets| *offsets = new_offsets);
    }

    pub fn set_system_fetch_timestamp(&self, system_id: u32, ts: chrono::DateTime<Utc>) {
        self.system_fetch_timestamp
            .write()
            .unwrap()
            .insert(system_id, ts);
    }

    pub fn get_system_fetch_timestamp(&self, system_id: u32) -> Option<chrono::DateTime<Utc>> {
        self.system_fetch_timestamp
            .read()
            .unwrap()
            .get(&system_id)
            .copied()
    }

    pub fn increment_system_kill_count(&self, system_id: u32) {
        let mut counts = self.system_kill_count.write().unwrap();
        *counts.entry(system_id).or_insert(0) += 1;
    }

    pub fn get_system_kill_count(&self, system_id: u32) -> u64 {
        self.system_kill_count
            .read()
            .unwrap()
            .get(&system_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> StoreStats {
        let total_events = self
            .log
            .read()
            .unwrap()
            .values()
            .map(|v| v.len() as u64)
            .sum();
        StoreStats {
            total_events,
            total_killmails: self.by_id.read().unwrap().len() as u64,
            evicted_events: self.evicted_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wk_types::Participant;

    fn killmail(id: u64, system_id: u32) -> Killmail {
        Killmail {
            killmail_id: id,
            kill_time: Utc::now(),
            system_id,
            victim: Participant {
                character_id: Some(1),
                corporation_id: None,
                alliance_id: None,
                ship_type_id: Some(670),
                damage: None,
                names: None,
            },
            attackers: vec![],
            zkb_metadata: BTreeMap::new(),
            total_value: 0.0,
            npc: false,
            enriched: false,
        }
    }

    #[test]
    fn insert_event_allocates_monotonic_ids() {
        let store = Store::new();
        let e1 = store.insert_event(1, killmail(1, 1)).unwrap();
        let e2 = store.insert_event(1, killmail(2, 1)).unwrap();
        assert!(e1 < e2);
    }

    #[test]
    fn put_is_idempotent_for_identical_record() {
        let store = Store::new();
        let km = killmail(1, 30000142);
        let first = store.put(1, 30000142, km.clone()).unwrap();
        let second = store.put(1, 30000142, km).unwrap();
        assert!(matches!(first, PutOutcome::Inserted { .. }));
        assert_eq!(second, PutOutcome::Unchanged);
        assert_eq!(store.stats().total_events, 1);
    }

    #[test]
    fn put_appends_new_event_for_changed_version() {
        let store = Store::new();
        let mut km = killmail(1, 30000142);
        store.put(1, 30000142, km.clone()).unwrap();
        km.enriched = true;
        let outcome = store.put(1, 30000142, km).unwrap();
        assert!(matches!(outcome, PutOutcome::Inserted { .. }));
        assert_eq!(store.stats().total_events, 2);
    }

    #[test]
    fn fetch_for_client_is_at_least_once_and_offset_monotone() {
        let store = Store::new();
        store.insert_event(30000142, killmail(1, 30000142)).unwrap();
        store.insert_event(30000142, killmail(2, 30000142)).unwrap();

        let first = store.fetch_for_client("c1", &[30000142]);
        assert_eq!(first.len(), 2);
        assert!(first[0].event_id < first[1].event_id);

        // repeated fetch with no new inserts returns [] (offset monotonicity, spec §8 #1)
        let second = store.fetch_for_client("c1", &[30000142]);
        assert!(second.is_empty());

        store.insert_event(30000142, killmail(3, 30000142)).unwrap();
        let third = store.fetch_for_client("c1", &[30000142]);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].killmail.killmail_id, 3);
    }

    #[test]
    fn per_system_order_is_preserved_across_systems() {
        let store = Store::new();
        store.insert_event(1, killmail(1, 1)).unwrap();
        store.insert_event(2, killmail(2, 2)).unwrap();
        store.insert_event(1, killmail(3, 1)).unwrap();

        let events = store.fetch_for_client("c", &[1]);
        assert_eq!(events.len(), 2);
        assert!(events[0].event_id < events[1].event_id);
        assert_eq!(events[0].killmail.killmail_id, 1);
        assert_eq!(events[1].killmail.killmail_id, 3);
    }

    #[test]
    fn fetch_one_event_advances_only_that_systems_offset() {
        let store = Store::new();
        store.insert_event(1, killmail(1, 1)).unwrap();
        store.insert_event(2, killmail(2, 2)).unwrap();

        let one = store.fetch_one_event("c", &[1, 2]).unwrap();
        assert_eq!(one.system_id, 1);

        let offsets = store.get_client_offsets("c");
        assert_eq!(offsets.get(1), one.event_id);
        assert_eq!(offsets.get(2), 0);
    }

    #[test]
    fn retention_cap_evicts_oldest_first() {
        let store = Store::with_retention_cap(Some(2));
        store.insert_event(1, killmail(1, 1)).unwrap();
        store.insert_event(1, killmail(2, 1)).unwrap();
        store.insert_event(1, killmail(3, 1)).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.evicted_events, 1);

        let remaining = store.list_by_system(1);
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|k| k.killmail_id != 1));
    }

    #[test]
    fn list_by_system_reflects_latest_version() {
        let store = Store::new();
        let km = killmail(1, 30000142);
        store.put(1, 30000142, km.clone()).unwrap();
        let mut enriched = km;
        enriched.enriched = true;
        store.put(1, 30000142, enriched).unwrap();

        let list = store.list_by_system(30000142);
        assert_eq!(list.len(), 1);
        assert!(list[0].enriched);
    }

    #[test]
    fn client_offsets_get_and_put_round_trip() {
        let store = Store::new();
        store.insert_event(1, killmail(1, 1)).unwrap();
        store.fetch_for_client("c", &[1]);
        let offsets = store.get_client_offsets("c");
        assert_eq!(offsets.get(1), 1);

        store.put_client_offsets("other", offsets.clone());
        assert_eq!(store.get_client_offsets("other").get(1), 1);
    }

    #[test]
    fn system_kill_count_and_fetch_timestamp_round_trip() {
        let store = Store::new();
        store.insert_event(1, killmail(1, 1)).unwrap();
        store.insert_event(1, killmail(2, 1)).unwrap();
        assert_eq!(store.get_system_kill_count(1), 2);

        let ts = Utc::now();
        store.set_system_fetch_timestamp(1, ts);
        assert_eq!(store.get_system_fetch_timestamp(1), Some(ts));
    }
}
