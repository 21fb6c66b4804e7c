//! Timer wheel for auto-hide and throttle-entry expiry.
//!
//! Two independent timer paths share one wheel: `AutoHide(notification)`
//! removes a non-critical notification when its visibility window lapses,
//! and `ThrottleExpiry(signature)` retires dedup bookkeeping after a full
//! throttle window of silence. They are armed together on admission but
//! cancelled independently.
//!
//! Arming a key replaces any pending timer for it; replaced and disarmed
//! entries are left in the heap and skipped lazily via a generation map,
//! so a stale deadline can never fire against a reused id. Disarming is
//! idempotent. [`TimerWheel::clear`] drops everything on teardown; nothing
//! fires afterwards.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tokio::time::Instant;

use vigil_core::Signature;

/// Key identifying one pending timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Visibility auto-hide for a notification
    AutoHide(u64),
    /// Throttle-entry expiry for a signature
    ThrottleExpiry(Signature),
}

#[derive(Debug)]
struct Slot {
    deadline: Instant,
    generation: u64,
    key: TimerKey,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline is
        // at the top. Generation breaks ties deterministically.
        other
            .deadline
            .cmp(&self.deadline)
            .then(other.generation.cmp(&self.generation))
    }
}

/// One-shot timer registry with lazy cancellation.
#[derive(Debug, Default)]
pub struct TimerWheel {
    heap: BinaryHeap<Slot>,
    live: HashMap<TimerKey, u64>,
    next_generation: u64,
}

impl TimerWheel {
    /// Create an empty wheel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` to fire at `deadline`, replacing any pending timer
    /// for the same key.
    pub fn arm(&mut self, key: TimerKey, deadline: Instant) {
        self.next_generation += 1;
        self.live.insert(key.clone(), self.next_generation);
        self.heap.push(Slot {
            deadline,
            generation: self.next_generation,
            key,
        });
    }

    /// Cancel a pending timer. A no-op if none exists.
    pub fn disarm(&mut self, key: &TimerKey) {
        self.live.remove(key);
    }

    /// Whether a timer is pending for `key`.
    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.live.contains_key(key)
    }

    /// The earliest live deadline, if any.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.prune_stale();
        self.heap.peek().map(|slot| slot.deadline)
    }

    /// Pop every timer due at or before `now`, in deadline order.
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerKey> {
        let mut due = Vec::new();
        loop {
            self.prune_stale();
            match self.heap.peek() {
                Some(slot) if slot.deadline <= now => {}
                _ => break,
            }
            if let Some(slot) = self.heap.pop() {
                self.live.remove(&slot.key);
                due.push(slot.key);
            }
        }
        due
    }

    /// Cancel every timer. Used on teardown and full dismissal.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    /// Number of pending (live) timers.
    pub fn pending(&self) -> usize {
        self.live.len()
    }

    /// Drop heap entries that were replaced or disarmed.
    fn prune_stale(&mut self) {
        while let Some(slot) = self.heap.peek() {
            if self.live.get(&slot.key) == Some(&slot.generation) {
                break;
            }
            self.heap.pop();
        }
    }
}
