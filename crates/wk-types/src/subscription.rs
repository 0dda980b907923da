use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

pub const MAX_SYSTEM_IDS: usize = 100;
pub const MAX_CHARACTER_IDS: usize = 1000;

/// Delivery channel a subscription was created for (spec §3 "Subscription").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    Http,
    Websocket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub subscriber_id: String,
    pub system_ids: Vec<u32>,
    pub character_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub kind: SubscriptionKind,
    pub created_at: DateTime<Utc>,
}

/// Input to `subscribe`/`update`, pre-validation and pre-normalization.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRequest {
    pub subscriber_id: String,
    pub system_ids: Vec<u32>,
    pub character_ids: Vec<u64>,
    pub callback_url: Option<String>,
}

/// Deduplicate and sort, then validate spec §3 bounds:
/// `|system_ids| <= 100`, `|character_ids| <= 1000`, at least one non-empty.
pub fn normalize_and_validate(
    mut system_ids: Vec<u32>,
    mut character_ids: Vec<u64>,
) -> Result<(Vec<u32>, Vec<u64>), ErrorKind> {
    system_ids.sort_unstable();
    system_ids.dedup();
    character_ids.sort_unstable();
    character_ids.dedup();

    if system_ids.is_empty() && character_ids.is_empty() {
        return Err(ErrorKind::Validation(
            "at least one of system_ids or character_ids must be non-empty".to_owned(),
        ));
    }
    if system_ids.len() > MAX_SYSTEM_IDS {
        return Err(ErrorKind::Validation(format!(
            "system_ids exceeds max of {MAX_SYSTEM_IDS} (got {})",
            system_ids.len()
        )));
    }
    if character_ids.len() > MAX_CHARACTER_IDS {
        return Err(ErrorKind::Validation(format!(
            "character_ids exceeds max of {MAX_CHARACTER_IDS} (got {})",
            character_ids.len()
        )));
    }
    Ok((system_ids, character_ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_and_sorts() {
        let (systems, chars) = normalize_and_validate(vec![3, 1, 1, 2], vec![9, 9, 1]).unwrap();
        assert_eq!(systems, vec![1, 2, 3]);
        assert_eq!(chars, vec![1, 9]);
    }

    #[test]
    fn rejects_both_empty() {
        assert!(normalize_and_validate(vec![], vec![]).is_err());
    }

    #[test]
    fn accepts_boundary_counts() {
        let systems: Vec<u32> = (0..100).collect();
        let chars: Vec<u64> = (0..1000).collect();
        assert!(normalize_and_validate(systems, chars).is_ok());
    }

    #[test]
    fn rejects_over_boundary_systems() {
        let systems: Vec<u32> = (0..101).collect();
        assert!(normalize_and_validate(systems, vec![1]).is_err());
    }

    #[test]
    fn rejects_over_boundary_characters() {
        let chars: Vec<u64> = (0..1001).collect();
        assert!(normalize_and_validate(vec![1], chars).is_err());
    }
}
