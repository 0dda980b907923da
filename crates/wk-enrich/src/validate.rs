//! Stages 4-5 of the enrichment pipeline (spec §4.6): structural and
//! temporal validation of a normalized, full-shaped killmail blob.

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralViolation {
    Missing(&'static str),
    WrongType(&'static str),
}

/// Check the four required fields, collecting every violation in one pass
/// rather than failing on the first (spec §4.6 stage 4).
pub fn validate_structure(value: &Value) -> Vec<StructuralViolation> {
    let mut violations = Vec::new();
    check_field(value, "killmail_id", Value::is_u64, &mut violations);
    check_field(value, "system_id", Value::is_u64, &mut violations);
    check_field(value, "victim", Value::is_object, &mut violations);
    check_field(value, "attackers", Value::is_array, &mut violations);
    violations
}

fn check_field(
    value: &Value,
    name: &'static str,
    is_right_type: fn(&Value) -> bool,
    out: &mut Vec<StructuralViolation>,
) {
    match value.get(name) {
        None => out.push(StructuralViolation::Missing(name)),
        Some(v) if !is_right_type(v) => out.push(StructuralViolation::WrongType(name)),
        Some(_) => {}
    }
}

/// Parse `kill_time` as ISO-8601/RFC3339 (spec §4.6 stage 5).
pub fn parse_kill_time(value: &Value) -> Result<DateTime<Utc>, String> {
    let raw = value
        .get("kill_time")
        .and_then(Value::as_str)
        .ok_or_else(|| "kill_time missing or not a string".to_owned())?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_full_shape() {
        let v = json!({"killmail_id": 1, "system_id": 2, "victim": {}, "attackers": []});
        assert!(validate_structure(&v).is_empty());
    }

    #[test]
    fn collects_every_missing_field_in_one_pass() {
        let v = json!({});
        let violations = validate_structure(&v);
        assert_eq!(violations.len(), 4);
    }

    #[test]
    fn collects_wrong_type_violations() {
        let v = json!({"killmail_id": "not-an-int", "system_id": 2, "victim": [], "attackers": {}});
        let violations = validate_structure(&v);
        assert_eq!(violations.len(), 2);
        assert!(violations.contains(&StructuralViolation::WrongType("victim")));
        assert!(violations.contains(&StructuralViolation::WrongType("attackers")));
    }

    #[test]
    fn parses_rfc3339_kill_time() {
        let v = json!({"kill_time": "2024-01-01T12:00:00Z"});
        assert!(parse_kill_time(&v).is_ok());
    }

    #[test]
    fn rejects_unparseable_kill_time() {
        let v = json!({"kill_time": "not-a-date"});
        assert!(parse_kill_time(&v).is_err());
    }

    #[test]
    fn rejects_missing_kill_time() {
        assert!(parse_kill_time(&json!({})).is_err());
    }
}
