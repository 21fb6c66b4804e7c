//! Bulk dismissal operations.
//!
//! Each operation is atomic from the caller's point of view: it removes
//! the matching notifications, retires their throttle entries, disarms
//! both timer paths, recomputes counts from the remaining set, and
//! publishes the `closeAllAlerts` broadcast synchronously with the local
//! mutation so no other surface renders a flash of stale state. Every
//! store invariant holds before control returns.

use chrono::Utc;
use tracing::info;

use vigil_core::Severity;

use crate::bus::{DismissScope, SurfaceEvent};
use crate::engine::AlertEngine;
use crate::store::StoreCounts;

/// Result of a bulk dismissal.
#[derive(Debug, Clone, Copy)]
pub struct DismissOutcome {
    /// Notifications removed
    pub removed: usize,
    /// Counts after the mutation, recomputed from ground truth
    pub counts: StoreCounts,
}

impl AlertEngine {
    /// Dismiss every notification and reset all dedup and timer state.
    pub fn dismiss_all(&mut self, source: &str) -> DismissOutcome {
        let removed = self.store.clear();
        self.filter.drain();
        self.timers.clear();

        let counts = self.store.counts();
        self.bus.publish(SurfaceEvent::CloseAlerts {
            scope: DismissScope::all(source),
        });
        info!(removed = removed.len(), source, "dismissed all notifications");
        DismissOutcome {
            removed: removed.len(),
            counts,
        }
    }

    /// Dismiss only notifications matching `level`.
    pub fn dismiss_by_severity(&mut self, source: &str, level: Severity) -> DismissOutcome {
        let removed = self.store.remove_where(|n| n.level == level);
        for notification in &removed {
            self.cleanup_removed(notification);
        }

        let counts = self.store.counts();
        self.bus.publish(SurfaceEvent::CloseAlerts {
            scope: DismissScope::by_level(source, level),
        });
        info!(
            removed = removed.len(),
            %level,
            source,
            "dismissed notifications by severity"
        );
        DismissOutcome {
            removed: removed.len(),
            counts,
        }
    }

    /// Dismiss notifications created more than `hours` ago.
    pub fn dismiss_older_than(&mut self, source: &str, hours: i64) -> DismissOutcome {
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        let removed = self.store.remove_where(|n| n.created_at < cutoff);
        for notification in &removed {
            self.cleanup_removed(notification);
        }

        let counts = self.store.counts();
        self.bus.publish(SurfaceEvent::CloseAlerts {
            scope: DismissScope::older_than(source, hours),
        });
        info!(
            removed = removed.len(),
            hours,
            source,
            "dismissed notifications older than cutoff"
        );
        DismissOutcome {
            removed: removed.len(),
            counts,
        }
    }
}
