//! Wire payload shapes delivered over both the Broadcaster (C9) and
//! WebhookNotifier (C10) channels (spec §4.10).

use chrono::{DateTime, Utc};
use serde::Serialize;
use wk_types::Killmail;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(clippy::large_enum_variant)]
pub enum DeliveryPayload {
    KillmailUpdate {
        system_id: u32,
        kills: Vec<Killmail>,
        timestamp: DateTime<Utc>,
    },
    KillmailCountUpdate {
        system_id: u32,
        count: u64,
        timestamp: DateTime<Utc>,
    },
}

pub fn system_topic(system_id: u32) -> String {
    format!("system:{system_id}")
}

pub fn system_detailed_topic(system_id: u32) -> String {
    format!("system:{system_id}:detailed")
}

pub const ALL_SYSTEMS_TOPIC: &str = "all_systems";
