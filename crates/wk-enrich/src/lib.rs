//! The eight-stage enrichment pipeline (spec §4.6, component C6):
//! normalize -> classify -> fetch-to-full -> validate structure -> validate
//! time -> enrich -> build canonical -> emit.
//!
//! A single [`EnrichmentPipeline`] wraps the upstream [`wk_fetch::Lookups`]
//! adapter and the shared [`wk_cache::Cache`]; [`EnrichmentPipeline::process`]
//! runs one raw `(killmail, zkb)` pair end to end, and
//! [`EnrichmentPipeline::process_batch`] fans a batch out across workers
//! before performing a single deduplicated enrichment pass (spec §4.6
//! "Batch processing").

mod build;
mod extract;
mod validate;

pub use extract::extract_character_ids_cached;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};
use wk_cache::Cache;
use wk_fetch::{Lookups, NamedEntity};
use wk_types::normalize::{classify, normalize_fields, Classification};
use wk_types::{ErrorKind, Killmail, Participant, ResolvedNames};

use build::build_killmail;
use validate::{parse_kill_time, validate_structure, StructuralViolation};

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// spec §4.6 stage 5: kills older than `now - since_hours` are skipped.
    pub since_hours: i64,
    /// spec §4.6 stage 6: set `enriched = false` only when *every*
    /// attempted lookup for this killmail failed.
    pub strict_enrichment: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            since_hours: 1,
            strict_enrichment: false,
        }
    }
}

/// Outcome of running one raw `(killmail, zkb)` pair through the pipeline
/// (spec §4.6 stage 8 "Emit").
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Accepted(Killmail),
    Skipped(SkipReason),
    Error(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    KillTooOld,
}

pub struct EnrichmentPipeline {
    lookups: Lookups,
    cache: Arc<Cache>,
    config: EnrichmentConfig,
}

impl EnrichmentPipeline {
    pub fn new(lookups: Lookups, cache: Arc<Cache>, config: EnrichmentConfig) -> Self {
        Self {
            lookups,
            cache,
            config,
        }
    }

    pub fn cutoff_now(&self) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(self.config.since_hours)
    }

    /// Run one raw `(killmail, zkb)` pair through stages 1-8.
    pub async fn process(&self, killmail_raw: Value, zkb_raw: Value, cutoff: DateTime<Utc>) -> PipelineOutcome {
        match self.build_unenriched(killmail_raw, zkb_raw, cutoff).await {
            Ok(mut killmail) => {
                self.enrich_one(&mut killmail).await;
                PipelineOutcome::Accepted(killmail)
            }
            Err(outcome) => outcome,
        }
    }

    /// Stages 1-5: normalize, classify, fetch-to-full if partial, validate
    /// structure, validate time. Returns an unenriched killmail on success.
    async fn build_unenriched(
        &self,
        killmail_raw: Value,
        zkb_raw: Value,
        cutoff: DateTime<Utc>,
    ) -> Result<Killmail, PipelineOutcome> {
        let combined = combine(&killmail_raw, &zkb_raw);
        let mut normalized = normalize_fields(&combined);

        match classify(&normalized) {
            Classification::Full => {}
            Classification::Partial => {
                normalized = self.fetch_to_full(&normalized).await?;
            }
            Classification::InvalidFormat => {
                return Err(PipelineOutcome::Error(ErrorKind::MissingRequiredFields(vec![
                    "victim".to_owned(),
                    "attackers".to_owned(),
                ])));
            }
        }

        let violations = validate_structure(&normalized);
        if !violations.is_empty() {
            return Err(PipelineOutcome::Error(violations_to_error(&violations)));
        }

        let kill_time = parse_kill_time(&normalized)
            .map_err(|e| PipelineOutcome::Error(ErrorKind::InvalidTimeFormat(e)))?;
        if kill_time < cutoff {
            debug!(kill_time = %kill_time, %cutoff, "enrich.skip.kill_too_old");
            return Err(PipelineOutcome::Skipped(SkipReason::KillTooOld));
        }

        Ok(build_killmail(&normalized, kill_time))
    }

    /// Stage 3: fetch the full ESI killmail for a partial reference and
    /// merge it with the original zkb metadata (spec §4.6 stage 3).
    async fn fetch_to_full(&self, partial: &Value) -> Result<Value, PipelineOutcome> {
        let killmail_id = partial
            .get("killmail_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                PipelineOutcome::Error(ErrorKind::MissingRequiredFields(vec!["killmail_id".to_owned()]))
            })?;
        let hash = partial
            .get("zkb")
            .and_then(|z| z.get("hash"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PipelineOutcome::Error(ErrorKind::MissingRequiredFields(vec!["zkb.hash".to_owned()]))
            })?;

        let full = self
            .lookups
            .fetch_full_killmail(killmail_id, hash)
            .await
            .map_err(PipelineOutcome::Error)?;

        let mut merged = normalize_fields(&full);
        if let Some(obj) = merged.as_object_mut() {
            if let Some(zkb) = partial.get("zkb") {
                obj.insert("zkb".to_owned(), zkb.clone());
            }
            if !obj.contains_key("kill_time") {
                if let Some(kt) = partial.get("kill_time") {
                    obj.insert("kill_time".to_owned(), kt.clone());
                }
            }
        }
        Ok(merged)
    }

    /// Stage 6 for a single killmail: resolve names for victim + every
    /// attacker, tracking whether *any* lookup across the whole killmail
    /// succeeded (spec §4.6 stage 6 `enrichment_failed`/`strict_enrichment`).
    async fn enrich_one(&self, killmail: &mut Killmail) {
        let mut attempts = 0u32;
        let mut successes = 0u32;

        let (names, a, s) = self.resolve_names(&killmail.victim).await;
        killmail.victim.names = Some(names);
        attempts += a;
        successes += s;

        for attacker in &mut killmail.attackers {
            let (names, a, s) = self.resolve_names(attacker).await;
            attacker.names = Some(names);
            attempts += a;
            successes += s;
        }

        killmail.enriched = !(self.config.strict_enrichment && attempts > 0 && successes == 0);
    }

    async fn resolve_names(&self, p: &Participant) -> (ResolvedNames, u32, u32) {
        let mut names = ResolvedNames::default();
        let mut attempts = 0u32;
        let mut successes = 0u32;

        if let Some(id) = p.character_id {
            attempts += 1;
            match self.lookups.fetch_character(id).await {
                Ok(entity) => {
                    names.character_name = entity.name;
                    successes += 1;
                }
                Err(e) => warn!(character_id = id, error = %e, "enrich.cache_miss character lookup failed"),
            }
        }
        if let Some(id) = p.corporation_id {
            attempts += 1;
            match self.lookups.fetch_corporation(id).await {
                Ok(entity) => {
                    names.corporation_name = entity.name;
                    successes += 1;
                }
                Err(e) => warn!(corporation_id = id, error = %e, "corporation lookup failed"),
            }
        }
        if let Some(id) = p.alliance_id {
            attempts += 1;
            match self.lookups.fetch_alliance(id).await {
                Ok(entity) => {
                    names.alliance_name = entity.name;
                    successes += 1;
                }
                Err(e) => warn!(alliance_id = id, error = %e, "alliance lookup failed"),
            }
        }
        if let Some(id) = p.ship_type_id {
            attempts += 1;
            match self.lookups.fetch_type(id).await {
                Ok(entity) => {
                    names.ship_type_name = entity.name;
                    successes += 1;
                }
                Err(e) => warn!(ship_type_id = id, error = %e, "ship type lookup failed"),
            }
        }
        (names, attempts, successes)
    }

    /// spec §4.6 "Batch processing": fan validation+build out across
    /// `num_cpus` workers, then run one deduplicated enrichment lookup per
    /// distinct entity id across the whole batch. Skipped/errored items are
    /// logged and dropped; only accepted killmails are returned.
    pub async fn process_batch(&self, items: Vec<(Value, Value)>, cutoff: DateTime<Utc>) -> Vec<Killmail> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let mut killmails: Vec<Killmail> = stream::iter(items)
            .map(|(km, zkb)| async move { self.build_unenriched(km, zkb, cutoff).await })
            .buffer_unordered(workers)
            .filter_map(|res| async move {
                match res {
                    Ok(killmail) => Some(killmail),
                    Err(PipelineOutcome::Skipped(_)) => None,
                    Err(PipelineOutcome::Error(e)) => {
                        warn!(error = %e, "enrich.batch item dropped");
                        None
                    }
                    Err(PipelineOutcome::Accepted(_)) => unreachable!(),
                }
            })
            .collect()
            .await;

        self.enrich_batch(&mut killmails).await;
        killmails
    }

    /// One deduplicated lookup per distinct entity id across the whole
    /// batch, then attach resolved names to every participant referencing
    /// that id (spec §4.6 "Batch processing").
    async fn enrich_batch(&self, killmails: &mut [Killmail]) {
        let mut char_ids = HashSet::new();
        let mut corp_ids = HashSet::new();
        let mut alliance_ids = HashSet::new();
        let mut ship_ids = HashSet::new();
        for km in killmails.iter() {
            collect_ids(&km.victim, &mut char_ids, &mut corp_ids, &mut alliance_ids, &mut ship_ids);
            for a in &km.attackers {
                collect_ids(a, &mut char_ids, &mut corp_ids, &mut alliance_ids, &mut ship_ids);
            }
        }

        let characters: HashMap<u64, LookupResult> = stream::iter(char_ids)
            .map(|id| async move { (id, lookup_result(self.lookups.fetch_character(id).await)) })
            .buffer_unordered(16)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();
        let corporations: HashMap<u64, LookupResult> = stream::iter(corp_ids)
            .map(|id| async move { (id, lookup_result(self.lookups.fetch_corporation(id).await)) })
            .buffer_unordered(16)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();
        let alliances: HashMap<u64, LookupResult> = stream::iter(alliance_ids)
            .map(|id| async move { (id, lookup_result(self.lookups.fetch_alliance(id).await)) })
            .buffer_unordered(16)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();
        let ship_types: HashMap<u32, LookupResult> = stream::iter(ship_ids)
            .map(|id| async move { (id, lookup_result(self.lookups.fetch_type(id).await)) })
            .buffer_unordered(16)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();

        for km in killmails.iter_mut() {
            let mut attempts = 0u32;
            let mut successes = 0u32;

            apply_names(&mut km.victim, &characters, &corporations, &alliances, &ship_types);
            let (a, s) = participant_tally(&km.victim, &characters, &corporations, &alliances, &ship_types);
            attempts += a;
            successes += s;

            for attacker in &mut km.attackers {
                apply_names(attacker, &characters, &corporations, &alliances, &ship_types);
                let (a, s) = participant_tally(attacker, &characters, &corporations, &alliances, &ship_types);
                attempts += a;
                successes += s;
            }

            km.enriched = !(self.config.strict_enrichment && attempts > 0 && successes == 0);
        }
    }
}

fn collect_ids(
    p: &Participant,
    char_ids: &mut HashSet<u64>,
    corp_ids: &mut HashSet<u64>,
    alliance_ids: &mut HashSet<u64>,
    ship_ids: &mut HashSet<u32>,
) {
    if let Some(id) = p.character_id {
        char_ids.insert(id);
    }
    if let Some(id) = p.corporation_id {
        corp_ids.insert(id);
    }
    if let Some(id) = p.alliance_id {
        alliance_ids.insert(id);
    }
    if let Some(id) = p.ship_type_id {
        ship_ids.insert(id);
    }
}

/// `(lookup call succeeded, resolved name)` — kept distinct because a
/// successful lookup of an unnamed entity (`name: null`) still counts as a
/// success for `enriched`-flag purposes, matching `resolve_names`'s
/// `Ok(entity) => successes += 1` regardless of `entity.name`.
type LookupResult = (bool, Option<String>);

fn lookup_result(result: Result<NamedEntity, ErrorKind>) -> LookupResult {
    match result {
        Ok(entity) => (true, entity.name),
        Err(_) => (false, None),
    }
}

fn apply_names(
    p: &mut Participant,
    characters: &HashMap<u64, LookupResult>,
    corporations: &HashMap<u64, LookupResult>,
    alliances: &HashMap<u64, LookupResult>,
    ship_types: &HashMap<u32, LookupResult>,
) {
    let mut names = ResolvedNames::default();
    if let Some(id) = p.character_id {
        names.character_name = characters.get(&id).and_then(|(_, name)| name.clone());
    }
    if let Some(id) = p.corporation_id {
        names.corporation_name = corporations.get(&id).and_then(|(_, name)| name.clone());
    }
    if let Some(id) = p.alliance_id {
        names.alliance_name = alliances.get(&id).and_then(|(_, name)| name.clone());
    }
    if let Some(id) = p.ship_type_id {
        names.ship_type_name = ship_types.get(&id).and_then(|(_, name)| name.clone());
    }
    p.names = Some(names);
}

/// Counts attempted vs. resolved lookups for one participant against the
/// batch-wide lookup maps, mirroring `resolve_names`'s per-call tally so
/// `enrich_batch` can apply the same `enriched`-flag formula as `enrich_one`
/// (spec §4.6 stage 6 `enrichment_failed`/`strict_enrichment`).
fn participant_tally(
    p: &Participant,
    characters: &HashMap<u64, LookupResult>,
    corporations: &HashMap<u64, LookupResult>,
    alliances: &HashMap<u64, LookupResult>,
    ship_types: &HashMap<u32, LookupResult>,
) -> (u32, u32) {
    let mut attempts = 0u32;
    let mut successes = 0u32;
    if let Some(id) = p.character_id {
        attempts += 1;
        if characters.get(&id).is_some_and(|(ok, _)| *ok) {
            successes += 1;
        }
    }
    if let Some(id) = p.corporation_id {
        attempts += 1;
        if corporations.get(&id).is_some_and(|(ok, _)| *ok) {
            successes += 1;
        }
    }
    if let Some(id) = p.alliance_id {
        attempts += 1;
        if alliances.get(&id).is_some_and(|(ok, _)| *ok) {
            successes += 1;
        }
    }
    if let Some(id) = p.ship_type_id {
        attempts += 1;
        if ship_types.get(&id).is_some_and(|(ok, _)| *ok) {
            successes += 1;
        }
    }
    (attempts, successes)
}

fn violations_to_error(violations: &[StructuralViolation]) -> ErrorKind {
    let missing: Vec<String> = violations
        .iter()
        .filter_map(|v| match v {
            StructuralViolation::Missing(name) => Some((*name).to_owned()),
            StructuralViolation::WrongType(_) => None,
        })
        .collect();
    if !missing.is_empty() {
        return ErrorKind::MissingRequiredFields(missing);
    }
    let wrong: Vec<String> = violations
        .iter()
        .filter_map(|v| match v {
            StructuralViolation::WrongType(name) => Some((*name).to_owned()),
            StructuralViolation::Missing(_) => None,
        })
        .collect();
    ErrorKind::InvalidFieldTypes(wrong)
}

fn combine(killmail: &Value, zkb: &Value) -> Value {
    let mut obj = killmail.as_object().cloned().unwrap_or_default();
    obj.insert("zkb".to_owned(), zkb.clone());
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wk_cache::Cache;
    use wk_fetch::{HttpFetcher, HttpFetcherConfig, Lookups};
    use wk_gate::{Gate, GateConfig};

    fn pipeline(config: EnrichmentConfig) -> EnrichmentPipeline {
        let gate = Gate::new(GateConfig::default());
        let cache = Arc::new(Cache::new());
        let fetcher = Arc::new(HttpFetcher::new(gate, cache.clone(), HttpFetcherConfig::default()).unwrap());
        let lookups = Lookups::new(fetcher, "http://127.0.0.1:1".to_owned());
        EnrichmentPipeline::new(lookups, cache, config)
    }

    fn new_format_killmail(kill_time: &str) -> (Value, Value) {
        let km = serde_json::json!({
            "killmail_id": 123,
            "killmail_time": kill_time,
            "solar_system_id": 30000142,
            "victim": {"character_id": 95465499, "ship_type_id": 670},
            "attackers": [{"character_id": 90379338}],
        });
        let zkb = serde_json::json!({"totalValue": 10000000.0, "npc": false, "hash": "abc"});
        (km, zkb)
    }

    #[tokio::test]
    async fn accepts_well_formed_recent_killmail() {
        let p = pipeline(EnrichmentConfig::default());
        let cutoff = Utc::now() - chrono::Duration::hours(2);
        let (km, zkb) = new_format_killmail("2024-01-01T12:00:00Z");
        // override cutoff to be older than the fixture's fixed timestamp so
        // this is a deterministic "accept" rather than relative-to-now.
        let cutoff = std::cmp::min(cutoff, DateTime::parse_from_rfc3339("2023-01-01T00:00:00Z").unwrap().with_timezone(&Utc));
        let outcome = p.process(km, zkb, cutoff).await;
        match outcome {
            PipelineOutcome::Accepted(k) => {
                assert_eq!(k.killmail_id, 123);
                assert_eq!(k.system_id, 30000142);
                assert_eq!(k.total_value, 10_000_000.0);
                assert!(!k.npc);
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skips_kill_too_old() {
        let p = pipeline(EnrichmentConfig::default());
        let (km, zkb) = new_format_killmail("2023-12-31T09:00:00Z");
        let cutoff = DateTime::parse_from_rfc3339("2024-01-01T11:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let outcome = p.process(km, zkb, cutoff).await;
        assert!(matches!(outcome, PipelineOutcome::Skipped(SkipReason::KillTooOld)));
    }

    #[tokio::test]
    async fn rejects_missing_required_fields() {
        let p = pipeline(EnrichmentConfig::default());
        let km = serde_json::json!({"killmail_id": 1, "victim": {}, "attackers": []});
        let zkb = serde_json::json!({});
        let cutoff = Utc::now() - chrono::Duration::hours(100);
        let outcome = p.process(km, zkb, cutoff).await;
        assert!(matches!(
            outcome,
            PipelineOutcome::Error(ErrorKind::MissingRequiredFields(_))
        ));
    }

    #[tokio::test]
    async fn invalid_shape_with_no_victim_attackers_or_zkb_is_missing_fields_error() {
        let p = pipeline(EnrichmentConfig::default());
        let km = serde_json::json!({"foo": "bar"});
        let zkb = serde_json::json!({});
        let outcome = p.process(km, zkb, Utc::now() - chrono::Duration::hours(1)).await;
        assert!(matches!(
            outcome,
            PipelineOutcome::Error(ErrorKind::MissingRequiredFields(_))
        ));
    }

    /// A killmail with a single, unresolvable victim (id resolves to a 404)
    /// for `strict_enrichment` assertions; `attacker_id` is the one shared
    /// entity across the batch, used to assert lookup dedup.
    fn batch_item(killmail_id: u64, victim_id: u64, attacker_id: u64) -> (Value, Value) {
        let km = serde_json::json!({
            "killmail_id": killmail_id,
            "killmail_time": "2024-01-01T12:00:00Z",
            "solar_system_id": 30000142,
            "victim": {"character_id": victim_id},
            "attackers": [{"character_id": attacker_id}],
        });
        let zkb = serde_json::json!({"totalValue": 1_000_000.0, "npc": false, "hash": "abc"});
        (km, zkb)
    }

    #[tokio::test]
    async fn process_batch_dedups_lookups_and_applies_strict_enrichment_per_killmail() {
        let upstream = wk_test_support::MockUpstream::start().await;
        // attacker_id 90379338 is shared by every item and resolves; every
        // victim is distinct and unregistered, so its lookup 404s.
        upstream.set_response("characters/90379338/", wk_test_support::fixtures::named_entity("Some Pilot"));

        let gate = Gate::new(GateConfig::default());
        let cache = Arc::new(Cache::new());
        let fetcher = Arc::new(HttpFetcher::new(gate, cache.clone(), HttpFetcherConfig::default()).unwrap());
        let lookups = Lookups::new(fetcher, upstream.base_url());
        let config = EnrichmentConfig {
            since_hours: 100_000,
            strict_enrichment: true,
        };
        let pipeline = EnrichmentPipeline::new(lookups, cache, config);

        let cutoff = DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let items = vec![
            batch_item(1, 95465499, 90379338),
            batch_item(2, 95465500, 90379338),
            batch_item(3, 95465501, 90379338),
        ];

        let accepted = pipeline.process_batch(items, cutoff).await;
        assert_eq!(accepted.len(), 3);

        // dedup: three killmails share one attacker id, so the batch issues
        // exactly one lookup for it despite three participants referencing it.
        assert_eq!(upstream.call_count("characters/90379338/"), 1);
        assert_eq!(upstream.call_count("characters/95465499/"), 1);

        for km in &accepted {
            let attacker = &km.attackers[0];
            assert_eq!(
                attacker.names.as_ref().and_then(|n| n.character_name.clone()),
                Some("Some Pilot".to_owned())
            );
            // every victim lookup 404s and every attacker lookup succeeds, so
            // under `strict_enrichment` this killmail is not "all failed" ->
            // enriched stays true, matching `enrich_one`'s formula.
            assert!(km.enriched);
        }
    }

    #[tokio::test]
    async fn process_batch_sets_enriched_false_when_every_lookup_fails_under_strict_enrichment() {
        let upstream = wk_test_support::MockUpstream::start().await;
        // no responses registered at all: every lookup 404s.

        let gate = Gate::new(GateConfig::default());
        let cache = Arc::new(Cache::new());
        let fetcher = Arc::new(HttpFetcher::new(gate, cache.clone(), HttpFetcherConfig::default()).unwrap());
        let lookups = Lookups::new(fetcher, upstream.base_url());
        let config = EnrichmentConfig {
            since_hours: 100_000,
            strict_enrichment: true,
        };
        let pipeline = EnrichmentPipeline::new(lookups, cache, config);

        let cutoff = DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let accepted = pipeline
            .process_batch(vec![batch_item(1, 95465499, 90379338)], cutoff)
            .await;

        assert_eq!(accepted.len(), 1);
        assert!(!accepted[0].enriched);
    }
}
