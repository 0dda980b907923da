//! Long-poll ingestion loop (spec §4.7, component C7).
//!
//! One [`Poller`] drives one [`RefStream`] long-poll source: classify each
//! poll result, run it through the [`EnrichmentPipeline`], write accepted
//! killmails to the [`Store`], and dispatch exactly once via
//! [`SubscriptionManager`]. Cadence adapts per [`schedule::Schedule`];
//! counters are tracked per-minute and cumulatively per [`stats::PollStats`].

pub mod schedule;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use wk_enrich::{EnrichmentPipeline, PipelineOutcome, SkipReason};
use wk_fetch::{PollOutcome, RefStream};
use wk_store::Store;
use wk_subscriptions::SubscriptionManager;

use schedule::{PollResult, Schedule, ScheduleConfig};
use stats::{PollCounters, PollStats};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub schedule: ScheduleConfig,
    /// Bounded timeout for a legacy reference's secondary full-fetch (spec
    /// §4.7 step 4, §5 "legacy-kill full-fetch 10 s").
    pub legacy_fetch_timeout: Duration,
    pub stats_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            legacy_fetch_timeout: Duration::from_secs(10),
            stats_interval: Duration::from_secs(60),
        }
    }
}

pub struct Poller {
    refstream: RefStream,
    pipeline: Arc<EnrichmentPipeline>,
    store: Arc<Store>,
    subscriptions: Arc<SubscriptionManager>,
    config: PollerConfig,
    stats: PollStats,
}

impl Poller {
    pub fn new(
        refstream: RefStream,
        pipeline: Arc<EnrichmentPipeline>,
        store: Arc<Store>,
        subscriptions: Arc<SubscriptionManager>,
        config: PollerConfig,
    ) -> Self {
        Self {
            refstream,
            pipeline,
            store,
            subscriptions,
            config,
            stats: PollStats::new(),
        }
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    /// Run the adaptive long-poll loop until `shutdown` fires (spec §5
    /// "Poller shutdown cancels in-flight long-poll GETs ... and drains the
    /// bounded task pool within a grace period" — the in-flight GET is
    /// cancelled by dropping its future when `tokio::select!` picks the
    /// shutdown branch).
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut schedule = Schedule::new(self.config.schedule.clone());
        let mut stats_tick = tokio::time::interval(self.config.stats_interval);
        stats_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("poller.shutdown");
                        return;
                    }
                }
                _ = stats_tick.tick() => {
                    self.publish_stats_snapshot();
                }
                result = self.poll_once() => {
                    let delay = schedule.next_delay(result);
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!("poller.shutdown");
                                return;
                            }
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn publish_stats_snapshot(&self) {
        let snapshot: PollCounters = self.stats.take_minute_snapshot();
        info!(
            received = snapshot.received,
            skipped_older = snapshot.skipped_older,
            legacy = snapshot.legacy,
            errors = snapshot.errors,
            no_package = snapshot.no_package,
            "poll.summary"
        );
    }

    /// One GET + classify + enrich + store + dispatch cycle (spec §4.7
    /// "Per-poll procedure").
    async fn poll_once(&self) -> PollResult {
        let outcome = match self.refstream.poll().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "poll.error");
                self.stats.record_error();
                return PollResult::Error;
            }
        };

        match outcome {
            PollOutcome::None => {
                self.stats.record_no_package();
                PollResult::NoPackage
            }
            PollOutcome::NewFormat { killmail, zkb } => self.accept_new_format(killmail, zkb).await,
            PollOutcome::Legacy { kill_id, zkb } => self.accept_legacy(kill_id, zkb).await,
            PollOutcome::UnexpectedFormat(raw) => {
                warn!(?raw, "poll.unexpected_format");
                self.stats.record_error();
                PollResult::Error
            }
        }
    }

    async fn accept_new_format(&self, killmail: serde_json::Value, zkb: serde_json::Value) -> PollResult {
        let cutoff = self.pipeline.cutoff_now();
        match self.pipeline.process(killmail, zkb, cutoff).await {
            PipelineOutcome::Accepted(km) => {
                self.store_and_dispatch(km);
                self.stats.record_received();
                PollResult::Received
            }
            PipelineOutcome::Skipped(SkipReason::KillTooOld) => {
                debug!("poll.skip.kill_too_old");
                self.stats.record_skipped_older();
                PollResult::SkippedOrDuplicate
            }
            PipelineOutcome::Error(e) => {
                warn!(error = %e, "poll.enrich.error");
                self.stats.record_error();
                PollResult::Error
            }
        }
    }

    /// spec §4.7 step 4: legacy references require a bounded secondary
    /// full-fetch before they can be processed as `new_format`. The
    /// EnrichmentPipeline's own stage 3 (`fetch_to_full`) performs that
    /// fetch; legacy references are passed straight through with an empty
    /// killmail body so stage 2's classifier routes them into stage 3.
    async fn accept_legacy(&self, kill_id: u64, zkb: serde_json::Value) -> PollResult {
        self.stats.record_legacy();
        let killmail = serde_json::json!({ "killmail_id": kill_id });
        let fetch = self.accept_new_format(killmail, zkb);
        match tokio::time::timeout(self.config.legacy_fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => {
                warn!(kill_id, "poll.legacy.fetch_timeout");
                self.stats.record_error();
                PollResult::Error
            }
        }
    }

    fn store_and_dispatch(&self, killmail: wk_types::Killmail) {
        match self.store.insert_event(killmail.system_id, killmail.clone()) {
            Ok(event_id) => {
                debug!(event_id, killmail_id = killmail.killmail_id, "store.insert_event");
                self.subscriptions.dispatch(&killmail);
            }
            Err(e) => {
                warn!(error = %e, killmail_id = killmail.killmail_id, "store.insert_event.failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wk_cache::Cache;
    use wk_enrich::EnrichmentConfig;
    use wk_fetch::{HttpFetcher, HttpFetcherConfig, Lookups};
    use wk_gate::{Gate, GateConfig};
    use wk_subscriptions::{Broadcaster, PreloadConfig, WebhookConfig, WebhookNotifier};
    use wk_test_support::{fixtures, MockUpstream};

    async fn harness(upstream: &MockUpstream) -> (Poller, Arc<Store>) {
        let gate = Gate::new(GateConfig::default());
        let cache = Arc::new(Cache::new());
        let fetcher = Arc::new(HttpFetcher::new(gate, cache.clone(), HttpFetcherConfig::default()).unwrap());
        let lookups = Lookups::new(fetcher.clone(), upstream.base_url());
        let pipeline = Arc::new(EnrichmentPipeline::new(
            lookups,
            cache,
            EnrichmentConfig {
                since_hours: 100_000,
                strict_enrichment: false,
            },
        ));
        let refstream = RefStream::new(fetcher, upstream.base_url(), "queue1").with_time_to_wait(1);
        let store = Arc::new(Store::new());
        let subscriptions = Arc::new(SubscriptionManager::new(
            store.clone(),
            Arc::new(Cache::new()),
            Arc::new(Broadcaster::new()),
            WebhookNotifier::new(WebhookConfig {
                workers: 0,
                ..WebhookConfig::default()
            }),
            PreloadConfig::default(),
        ));
        let poller = Poller::new(refstream, pipeline, store.clone(), subscriptions, PollerConfig::default());
        (poller, store)
    }

    #[tokio::test]
    async fn accepts_new_format_package_and_stores_it() {
        let upstream = MockUpstream::start().await;
        upstream.push_package(fixtures::new_format_package(123, 30000142, "2024-01-01T12:00:00Z"));
        let (poller, store) = harness(&upstream).await;

        let result = poller.poll_once().await;
        assert_eq!(result, PollResult::Received);
        assert!(store.get(123).is_some());
        assert_eq!(poller.stats().cumulative_snapshot().received, 1);
    }

    #[tokio::test]
    async fn empty_package_reports_no_package() {
        let upstream = MockUpstream::start().await;
        let (poller, _store) = harness(&upstream).await;

        let result = poller.poll_once().await;
        assert_eq!(result, PollResult::NoPackage);
        assert_eq!(poller.stats().cumulative_snapshot().no_package, 1);
    }

    #[tokio::test]
    async fn legacy_package_fetches_full_killmail_and_stores_it() {
        let upstream = MockUpstream::start().await;
        upstream.push_package(fixtures::legacy_package(555, "h"));
        upstream.set_response(
            "killmails/555/h/",
            fixtures::full_killmail_detail(555, 30000142, "2024-01-01T12:00:00Z"),
        );
        let (poller, store) = harness(&upstream).await;

        let result = poller.poll_once().await;
        assert_eq!(result, PollResult::Received);
        assert!(store.get(555).is_some());
        assert_eq!(poller.stats().cumulative_snapshot().legacy, 1);
    }

    #[tokio::test]
    async fn malformed_package_counts_as_error() {
        let upstream = MockUpstream::start().await;
        upstream.push_package(fixtures::malformed_package());
        let (poller, _store) = harness(&upstream).await;

        let result = poller.poll_once().await;
        assert_eq!(result, PollResult::Error);
        assert_eq!(poller.stats().cumulative_snapshot().errors, 1);
    }
}
