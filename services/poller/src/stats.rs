//! Per-minute and cumulative poll counters (spec §4.7 step 5-6).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollCounters {
    pub received: u64,
    pub skipped_older: u64,
    pub legacy: u64,
    pub errors: u64,
    pub no_package: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    skipped_older: AtomicU64,
    legacy: AtomicU64,
    errors: AtomicU64,
    no_package: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PollCounters {
        PollCounters {
            received: self.received.load(Ordering::Relaxed),
            skipped_older: self.skipped_older.load(Ordering::Relaxed),
            legacy: self.legacy.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            no_package: self.no_package.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.received.store(0, Ordering::Relaxed);
        self.skipped_older.store(0, Ordering::Relaxed);
        self.legacy.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.no_package.store(0, Ordering::Relaxed);
    }
}

/// Tracks both a per-minute window (reset every 60s by the caller) and
/// lifetime cumulative counters (spec §4.7 "tracks cumulative stats").
#[derive(Default)]
pub struct PollStats {
    per_minute: Counters,
    cumulative: Counters,
}

impl PollStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.per_minute.received.fetch_add(1, Ordering::Relaxed);
        self.cumulative.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_older(&self) {
        self.per_minute.skipped_older.fetch_add(1, Ordering::Relaxed);
        self.cumulative.skipped_older.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_legacy(&self) {
        self.per_minute.legacy.fetch_add(1, Ordering::Relaxed);
        self.cumulative.legacy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.per_minute.errors.fetch_add(1, Ordering::Relaxed);
        self.cumulative.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_package(&self) {
        self.per_minute.no_package.fetch_add(1, Ordering::Relaxed);
        self.cumulative.no_package.fetch_add(1, Ordering::Relaxed);
    }

    /// spec §4.7 step 6: snapshot the per-minute window and reset it.
    pub fn take_minute_snapshot(&self) -> PollCounters {
        let snapshot = self.per_minute.snapshot();
        self.per_minute.reset();
        snapshot
    }

    pub fn cumulative_snapshot(&self) -> PollCounters {
        self.cumulative.snapshot()
    }
}
