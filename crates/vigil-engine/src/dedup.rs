//! Signature-based dedup/throttle filter.
//!
//! Repeats of an alert signature inside the throttle window refresh the
//! existing notification instead of creating a new one. The window slides:
//! every repeat resets it, so an entry is only reclaimed after a contiguous
//! window of silence. Once retired, the next alert with the same signature
//! is brand-new and re-triggers sound and animation.
//!
//! Entry reclamation is timer-driven (see [`crate::scheduler`]); this
//! module only owns the table and the admit/retire bookkeeping. Timestamps
//! are monotonic [`Instant`]s so throttling is immune to wall-clock jumps.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use vigil_core::Signature;

/// Throttle bookkeeping for one live signature.
#[derive(Debug, Clone)]
pub struct ThrottleEntry {
    /// When an alert with this signature was last seen
    pub last_seen: Instant,
    /// How many alerts have collapsed into this entry (informational)
    pub ref_count: u32,
    /// The notification currently representing this signature
    pub notification_id: u64,
}

/// Outcome of admitting an alert through the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No live entry inside the window; the caller creates a notification
    /// and then registers it with [`ThrottleFilter::track`]
    New,
    /// A repeat within the window; the caller refreshes the existing
    /// notification, with no new admission, sound, or auto-hide timer
    Repeat {
        /// Id of the notification to refresh
        notification_id: u64,
    },
}

/// The signature table. Owned exclusively by the engine.
#[derive(Debug)]
pub struct ThrottleFilter {
    window: Duration,
    entries: HashMap<Signature, ThrottleEntry>,
}

impl ThrottleFilter {
    /// Create a filter with the given throttle window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// The configured throttle window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether an alert with `signature` is a repeat.
    ///
    /// A live entry within the window is refreshed (`last_seen = now`) and
    /// reported as a repeat. An entry older than the window is treated as
    /// absent: the alert is new, and [`track`] will overwrite the stale
    /// entry.
    ///
    /// [`track`]: ThrottleFilter::track
    pub fn admit(&mut self, signature: &Signature, now: Instant) -> Admission {
        if let Some(entry) = self.entries.get_mut(signature) {
            if now.duration_since(entry.last_seen) <= self.window {
                entry.last_seen = now;
                entry.ref_count += 1;
                trace!(signature = %signature, ref_count = entry.ref_count, "repeat within window");
                return Admission::Repeat {
                    notification_id: entry.notification_id,
                };
            }
        }
        Admission::New
    }

    /// Register the notification created for a newly admitted signature.
    /// Overwrites any stale entry for the same signature.
    pub fn track(&mut self, signature: Signature, notification_id: u64, now: Instant) {
        self.entries.insert(
            signature,
            ThrottleEntry {
                last_seen: now,
                ref_count: 1,
                notification_id,
            },
        );
    }

    /// Look up the live entry for a signature.
    pub fn get(&self, signature: &Signature) -> Option<&ThrottleEntry> {
        self.entries.get(signature)
    }

    /// Remove a signature's entry. Idempotent.
    pub fn retire(&mut self, signature: &Signature) -> Option<ThrottleEntry> {
        let removed = self.entries.remove(signature);
        if removed.is_some() {
            trace!(signature = %signature, "throttle entry retired");
        }
        removed
    }

    /// Whether the entry (if any) has been silent for a full window.
    ///
    /// Expiry timers re-validate with this before retiring: a repeat may
    /// have refreshed the entry after the timer was armed.
    pub fn is_stale(&self, signature: &Signature, now: Instant) -> bool {
        match self.entries.get(signature) {
            Some(entry) => now.duration_since(entry.last_seen) >= self.window,
            None => true,
        }
    }

    /// Remove every entry.
    pub fn drain(&mut self) {
        self.entries.clear();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
