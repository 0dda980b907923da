use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-client, per-system read offsets (spec §3 "ClientOffsets").
///
/// Semantics: the highest `event_id` for `(client, system)` already
/// delivered; the next fetch returns events with strictly greater id.
pub type SystemOffsets = HashMap<u32, u64>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientOffsets {
    pub offsets: SystemOffsets,
}

impl ClientOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, system_id: u32) -> u64 {
        self.offsets.get(&system_id).copied().unwrap_or(0)
    }

    /// Advance the offset for `system_id`, never regressing it.
    pub fn advance(&mut self, system_id: u32, event_id: u64) {
        let entry = self.offsets.entry(system_id).or_insert(0);
        if event_id > *entry {
            *entry = event_id;
        }
    }
}
