use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Three-state circuit breaker (spec §4.4, testable property §8 #7):
/// `closed -> open` after `failure_threshold` consecutive failures,
/// `open -> half_open` once `reset_after` has elapsed, and a single probe
/// call decides `half_open -> closed` (success) or `half_open -> open`
/// (failure). Exactly one probe may be in flight at a time.
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    failure_threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_after: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
            failure_threshold,
            reset_after,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Called before every attempt. Returns `true` if the caller may proceed
    /// (and, if it flips `open -> half_open`, that caller becomes the probe).
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = self.opened_at.unwrap_or(now);
                if now.duration_since(opened_at) >= self.reset_after && !self.probe_in_flight {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => false,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Closed;
            self.probe_in_flight = false;
            self.opened_at = None;
        }
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                self.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }
}
