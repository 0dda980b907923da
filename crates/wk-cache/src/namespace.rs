use std::time::Duration;

/// The cache namespaces enumerated in spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    CharacterInfo,
    CorporationInfo,
    AllianceInfo,
    ShipType,
    Group,
    SystemFetchTimestamp,
    SystemActive,
    Killmail,
    /// Extracted character-id list per killmail id; short TTL, amortizes
    /// repeated attacker-list scans across batch subscription matching.
    CharacterExtraction,
}

impl Namespace {
    /// Default TTL per spec §4.1: 24h for ESI lookups, shorter for
    /// extractions and fetch-timestamp bookkeeping.
    pub fn default_ttl(self) -> Duration {
        match self {
            Namespace::CharacterInfo
            | Namespace::CorporationInfo
            | Namespace::AllianceInfo
            | Namespace::ShipType
            | Namespace::Group
            | Namespace::Killmail => Duration::from_secs(24 * 60 * 60),
            Namespace::SystemFetchTimestamp | Namespace::SystemActive => {
                Duration::from_secs(10 * 60)
            }
            Namespace::CharacterExtraction => Duration::from_secs(5 * 60),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::CharacterInfo => "character_info",
            Namespace::CorporationInfo => "corporation_info",
            Namespace::AllianceInfo => "alliance_info",
            Namespace::ShipType => "ship_type",
            Namespace::Group => "group",
            Namespace::SystemFetchTimestamp => "system_fetch_timestamp",
            Namespace::SystemActive => "system_active",
            Namespace::Killmail => "killmail",
            Namespace::CharacterExtraction => "character_extraction",
        }
    }
}
