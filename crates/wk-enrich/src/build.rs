//! Stage 7 of the enrichment pipeline (spec §4.6): assemble the canonical
//! [`Killmail`] from a validated, normalized blob.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use wk_types::{Killmail, Participant};

/// Parse one victim/attacker entry. Every field beyond presence is already
/// optional on [`Participant`], so this never fails — a field of the wrong
/// shape is simply treated as absent rather than rejecting the whole
/// killmail over a single attacker's malformed sub-field.
pub fn parse_participant(value: &Value) -> Participant {
    Participant {
        character_id: value.get("character_id").and_then(Value::as_u64),
        corporation_id: value.get("corporation_id").and_then(Value::as_u64),
        alliance_id: value.get("alliance_id").and_then(Value::as_u64),
        ship_type_id: value
            .get("ship_type_id")
            .and_then(Value::as_u64)
            .map(|v| v as u32),
        damage: value.get("damage_done").and_then(Value::as_u64),
        names: None,
    }
}

/// Build the canonical killmail from a normalized, already-validated blob
/// and its already-parsed `kill_time` (spec §4.6 stage 7: `total_value` from
/// `zkb.totalValue` default 0, `npc` from `zkb.npc` default false).
pub fn build_killmail(value: &Value, kill_time: DateTime<Utc>) -> Killmail {
    let killmail_id = value["killmail_id"].as_u64().unwrap_or(0);
    let system_id = value["system_id"].as_u64().unwrap_or(0) as u32;
    let victim = parse_participant(&value["victim"]);
    let attackers = value["attackers"]
        .as_array()
        .map(|arr| arr.iter().map(parse_participant).collect())
        .unwrap_or_default();

    let zkb = value.get("zkb").cloned().unwrap_or(Value::Null);
    let total_value = zkb.get("totalValue").and_then(Value::as_f64).unwrap_or(0.0);
    let npc = zkb.get("npc").and_then(Value::as_bool).unwrap_or(false);
    let zkb_metadata: BTreeMap<String, Value> = zkb
        .as_object()
        .map(|obj| obj.clone().into_iter().collect())
        .unwrap_or_default();

    Killmail {
        killmail_id,
        kill_time,
        system_id,
        victim,
        attackers,
        zkb_metadata,
        total_value,
        npc,
        enriched: false,
    }
}
