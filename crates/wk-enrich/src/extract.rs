//! Character-extraction sub-cache (spec §4.6 "Character-extraction
//! sub-cache"): caches the unique participant character ids of a killmail,
//! keyed by `killmail_id`, to amortize the scan across repeated batch
//! subscription matching within the cache's 5-minute lifetime.

use wk_cache::{Cache, Namespace};
use wk_types::Killmail;

pub fn extract_character_ids_cached(cache: &Cache, killmail: &Killmail) -> Vec<u64> {
    let key = killmail.killmail_id.to_string();
    if let Some(ids) = cache.get::<Vec<u64>>(Namespace::CharacterExtraction, &key) {
        return ids;
    }
    let ids = killmail.participant_character_ids();
    cache.put(Namespace::CharacterExtraction, &key, &ids);
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wk_types::Participant;

    fn killmail(id: u64) -> Killmail {
        Killmail {
            killmail_id: id,
            kill_time: chrono::Utc::now(),
            system_id: 1,
            victim: Participant {
                character_id: Some(1),
                corporation_id: None,
                alliance_id: None,
                ship_type_id: None,
                damage: None,
                names: None,
            },
            attackers: vec![Participant {
                character_id: Some(2),
                corporation_id: None,
                alliance_id: None,
                ship_type_id: None,
                damage: None,
                names: None,
            }],
            zkb_metadata: BTreeMap::new(),
            total_value: 0.0,
            npc: false,
            enriched: false,
        }
    }

    #[test]
    fn caches_extraction_result_by_killmail_id() {
        let cache = Cache::new();
        let km = killmail(42);
        let first = extract_character_ids_cached(&cache, &km);
        assert_eq!(first, vec![1, 2]);
        assert!(cache.exists(Namespace::CharacterExtraction, "42"));

        let second = extract_character_ids_cached(&cache, &km);
        assert_eq!(second, first);
    }
}
