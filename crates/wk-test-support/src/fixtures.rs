//! Killmail JSON fixture builders for tests (new-format, legacy, malformed)
//! matching the shapes described in spec §6.

use serde_json::{json, Value};

/// A `new_format` RefStream package: `{killID, killmail, zkb}` with a fully
/// populated victim/attacker shape.
pub fn new_format_package(killmail_id: u64, system_id: u32, kill_time: &str) -> Value {
    json!({
        "killID": killmail_id,
        "killmail": {
            "killmail_id": killmail_id,
            "killmail_time": kill_time,
            "solar_system_id": system_id,
            "victim": {
                "character_id": 95465499,
                "corporation_id": 98000001,
                "ship_type_id": 670,
                "damage_taken": 1200,
            },
            "attackers": [
                {"character_id": 90379338, "damage_done": 1200, "ship_type_id": 671},
            ],
        },
        "zkb": {
            "totalValue": 10_000_000.0,
            "npc": false,
            "hash": "abc123",
        },
    })
}

/// A `legacy` RefStream package: `{killID, zkb}` only, requiring a secondary
/// full-killmail fetch keyed by `zkb.hash`.
pub fn legacy_package(killmail_id: u64, hash: &str) -> Value {
    json!({
        "killID": killmail_id,
        "zkb": {
            "totalValue": 5_000_000.0,
            "npc": false,
            "hash": hash,
        },
    })
}

/// The full ESI-shaped killmail a legacy reference's secondary fetch
/// resolves to.
pub fn full_killmail_detail(killmail_id: u64, system_id: u32, kill_time: &str) -> Value {
    json!({
        "killmail_id": killmail_id,
        "killmail_time": kill_time,
        "solar_system_id": system_id,
        "victim": {"character_id": 95465499, "ship_type_id": 670},
        "attackers": [{"character_id": 90379338}],
    })
}

/// Neither full nor partial shape; stage 2 classifies this as
/// `invalid_format`.
pub fn malformed_package() -> Value {
    json!({"something_unexpected": true})
}

pub fn named_entity(name: &str) -> Value {
    json!({"name": name})
}
