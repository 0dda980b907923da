use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single victim or attacker entry on a killmail (spec §3 "Participant").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corporation_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alliance_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_type_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage: Option<u64>,
    /// Resolved display names, filled in by enrichment. `None` until
    /// enrichment runs or when every lookup for this participant failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub names: Option<ResolvedNames>,
}

impl Participant {
    pub fn is_empty(&self) -> bool {
        self.character_id.is_none()
            && self.corporation_id.is_none()
            && self.alliance_id.is_none()
            && self.ship_type_id.is_none()
    }
}

/// Human-readable names resolved for a participant's id fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedNames {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corporation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alliance_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_type_name: Option<String>,
}

/// The canonical killmail record (spec §3 "Killmail").
///
/// Built exclusively by [`crate::normalize`] + the enrichment pipeline;
/// nothing downstream constructs one by hand outside of tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Killmail {
    pub killmail_id: u64,
    pub kill_time: DateTime<Utc>,
    pub system_id: u32,
    pub victim: Participant,
    pub attackers: Vec<Participant>,
    /// Opaque zkb metadata, preserved as received (hash, labels, points, ...).
    pub zkb_metadata: BTreeMap<String, Value>,
    pub total_value: f64,
    pub npc: bool,
    pub enriched: bool,
}

impl Killmail {
    /// spec §3 invariant: victim non-empty, system_id present (always true by
    /// construction once the type exists), attackers an ordered sequence.
    pub fn victim_is_valid(&self) -> bool {
        !self.victim.is_empty()
    }

    /// Union of every character id appearing as victim or attacker, in a
    /// stable order (victim first, then attackers in list order). Used by
    /// [`crate::character_extraction`] and dispatch matching.
    pub fn participant_character_ids(&self) -> Vec<u64> {
        let mut ids = Vec::new();
        if let Some(id) = self.victim.character_id {
            ids.push(id);
        }
        for attacker in &self.attackers {
            if let Some(id) = attacker.character_id {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

/// An appended event in a per-system log (spec §3 "Event").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: u64,
    pub system_id: u32,
    pub killmail: Killmail,
}
