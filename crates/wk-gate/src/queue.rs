use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use tokio::sync::oneshot;
use wk_types::Priority;

/// A permit request sitting in the gate's wait line. Ordered so that
/// `BinaryHeap::pop` yields the highest-priority (lowest `Priority` ordinal),
/// earliest-enqueued waiter first — FIFO within a priority tier (spec §4.4).
pub struct Waiter {
    pub priority: Priority,
    pub enqueue_seq: u64,
    pub deadline: Instant,
    pub grant: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.enqueue_seq == other.enqueue_seq
    }
}
impl Eq for Waiter {}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse priority (Realtime=1 must sort as "greatest"/served-first),
        // then reverse enqueue_seq (earliest arrival served first).
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.enqueue_seq.cmp(&self.enqueue_seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub type WaitQueue = BinaryHeap<Waiter>;
