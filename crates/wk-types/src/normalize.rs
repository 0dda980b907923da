//! Stage 1 of the enrichment pipeline (spec §4.6): canonicalize the field
//! names upstreams disagree on. Treated as an opaque-JSON boundary — nothing
//! downstream of [`normalize_fields`] should ever look for an alias key
//! again.

use serde_json::Value;

/// `(canonical_key, [aliases in preference order, canonical first])`.
const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("killmail_id", &["killmail_id", "killID"]),
    ("system_id", &["system_id", "solar_system_id"]),
    ("kill_time", &["kill_time", "killmail_time"]),
];

/// The classification a raw blob falls into once its fields are canonical
/// (spec §4.6 stage 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Has `zkb` metadata but lacks `victim`/`attackers`.
    Partial,
    /// Has `victim`, `attackers`, and a system id.
    Full,
    /// Neither shape.
    InvalidFormat,
}

/// Canonicalize field name aliases on a JSON object, without touching
/// anything else. Idempotent: a second call on the output is a no-op,
/// because a canonical key already present is never overwritten.
///
/// Non-object input is returned unchanged (callers classify it as
/// [`Classification::InvalidFormat`]).
pub fn normalize_fields(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return value.clone();
    };
    let mut normalized = obj.clone();
    for (canonical, aliases) in FIELD_ALIASES {
        if normalized.contains_key(*canonical) {
            continue;
        }
        for alias in aliases.iter().skip(1) {
            if let Some(v) = obj.get(*alias) {
                normalized.insert((*canonical).to_owned(), v.clone());
                break;
            }
        }
    }
    Value::Object(normalized)
}

/// Classify a normalized blob (spec §4.6 stage 2).
pub fn classify(value: &Value) -> Classification {
    let Some(obj) = value.as_object() else {
        return Classification::InvalidFormat;
    };
    let has_full_shape = obj.contains_key("victim")
        && obj.contains_key("attackers")
        && obj.contains_key("system_id");
    if has_full_shape {
        return Classification::Full;
    }
    if obj.contains_key("zkb") {
        return Classification::Partial;
    }
    Classification::InvalidFormat
}
