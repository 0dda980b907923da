//! Adaptive poll cadence (spec §4.7 "Adaptive schedule"): a per-poll-result
//! state machine deciding the delay before the next poll and whether the
//! error backoff resets.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub fast_interval: Duration,
    pub idle_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(1),
            idle_interval: Duration::from_secs(5),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

/// What happened on the last poll, as far as the schedule cares (spec §4.7
/// table): a successfully accepted kill, an empty/skip/dup result, or an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    Received,
    NoPackage,
    SkippedOrDuplicate,
    Error,
}

/// Tracks the current backoff level across polls; `next_delay` both returns
/// the delay to sleep before the next poll and mutates the backoff state.
pub struct Schedule {
    config: ScheduleConfig,
    current_backoff: Duration,
}

impl Schedule {
    pub fn new(config: ScheduleConfig) -> Self {
        let current_backoff = config.initial_backoff;
        Self { config, current_backoff }
    }

    pub fn next_delay(&mut self, result: PollResult) -> Duration {
        match result {
            PollResult::Received => {
                self.current_backoff = self.config.initial_backoff;
                self.config.fast_interval
            }
            PollResult::NoPackage | PollResult::SkippedOrDuplicate => {
                self.current_backoff = self.config.initial_backoff;
                self.config.idle_interval
            }
            PollResult::Error => {
                let delay = self.current_backoff;
                let next = delay.as_secs_f64() * self.config.backoff_factor;
                self.current_backoff = Duration::from_secs_f64(next.min(self.config.max_backoff.as_secs_f64()));
                delay
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_resets_backoff_and_uses_fast_interval() {
        let mut s = Schedule::new(ScheduleConfig::default());
        s.next_delay(PollResult::Error);
        assert_eq!(s.next_delay(PollResult::Received), Duration::from_secs(1));
    }

    #[test]
    fn errors_grow_backoff_up_to_cap() {
        let mut s = Schedule::new(ScheduleConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            backoff_factor: 2.0,
            ..ScheduleConfig::default()
        });
        assert_eq!(s.next_delay(PollResult::Error), Duration::from_millis(100));
        assert_eq!(s.next_delay(PollResult::Error), Duration::from_millis(200));
        assert_eq!(s.next_delay(PollResult::Error), Duration::from_millis(400));
        assert_eq!(s.next_delay(PollResult::Error), Duration::from_millis(500));
        assert_eq!(s.next_delay(PollResult::Error), Duration::from_millis(500));
    }

    #[test]
    fn no_package_uses_idle_interval_and_resets_backoff() {
        let mut s = Schedule::new(ScheduleConfig::default());
        s.next_delay(PollResult::Error);
        assert_eq!(s.next_delay(PollResult::NoPackage), Duration::from_secs(5));
        assert_eq!(s.next_delay(PollResult::Error), Duration::from_secs(1));
    }
}
