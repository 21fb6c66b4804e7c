//! Cross-surface event broadcast.
//!
//! Display surfaces (a toast stack, a persistent alert console) subscribe
//! to engine events without knowing its internals. The bus is an injected
//! abstraction rather than an ambient global, so each engine instance owns
//! exactly one and tests can substitute their own.
//!
//! Publishing never blocks the engine: a lagging subscriber misses events
//! rather than back-pressuring admission.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use vigil_core::{ActionFailure, Alert, Severity};

use crate::connection::ConnectionState;

/// Scope of a bulk dismissal, carried on the `closeAllAlerts` broadcast so
/// other surfaces can reconcile their own state.
#[derive(Debug, Clone, Serialize)]
pub struct DismissScope {
    /// Which surface or caller initiated the dismissal
    pub source: String,
    /// Present for dismiss-by-severity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Severity>,
    /// Present for dismiss-older-than
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<i64>,
}

impl DismissScope {
    /// Scope covering every notification.
    pub fn all(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            level: None,
            hours: None,
        }
    }

    /// Scope covering one severity level.
    pub fn by_level(source: impl Into<String>, level: Severity) -> Self {
        Self {
            source: source.into(),
            level: Some(level),
            hours: None,
        }
    }

    /// Scope covering notifications older than `hours`.
    pub fn older_than(source: impl Into<String>, hours: i64) -> Self {
        Self {
            source: source.into(),
            level: None,
            hours: Some(hours),
        }
    }
}

/// Events published to subscribed surfaces.
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    /// A new alert was admitted as a fresh notification
    NewAlert {
        /// The admitted alert
        alert: Alert,
        /// Id of the notification created for it
        notification_id: u64,
    },
    /// A repeat refreshed an existing notification's timestamp
    Refreshed {
        /// Id of the refreshed notification
        notification_id: u64,
        /// The new timestamp
        refreshed_at: DateTime<Utc>,
    },
    /// A notification was acknowledged
    Acknowledged {
        /// Id of the acknowledged notification
        notification_id: u64,
    },
    /// A notification left the store (auto-hide, resolve, or eviction)
    Removed {
        /// Id of the removed notification
        notification_id: u64,
    },
    /// A bulk dismissal ran; surfaces clear their matching transient state
    CloseAlerts {
        /// What was dismissed
        scope: DismissScope,
    },
    /// The feed connection changed state
    ConnectionChanged {
        /// The new state
        state: ConnectionState,
    },
    /// An acknowledge/resolve call against the alerts API failed
    ActionFailed {
        /// Id of the affected notification, still in the store
        notification_id: u64,
        /// Failure class for distinct operator treatment
        failure: ActionFailure,
    },
}

impl SurfaceEvent {
    /// Wire topic of this event, matching the names surfaces subscribe to.
    pub fn topic(&self) -> &'static str {
        match self {
            SurfaceEvent::NewAlert { .. } => "newAlert",
            SurfaceEvent::Refreshed { .. } => "alertRefreshed",
            SurfaceEvent::Acknowledged { .. } => "alertAcknowledged",
            SurfaceEvent::Removed { .. } => "alertRemoved",
            SurfaceEvent::CloseAlerts { .. } => "closeAllAlerts",
            SurfaceEvent::ConnectionChanged { .. } => "connectionChanged",
            SurfaceEvent::ActionFailed { .. } => "alertActionFailed",
        }
    }
}

/// Publish side of the surface bus.
pub trait EventBus: Send {
    /// Publish one event to every subscribed surface.
    fn publish(&self, event: SurfaceEvent);
}

/// Broadcast-channel bus; the default implementation.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<SurfaceEvent>,
}

impl BroadcastBus {
    /// Create a bus that retains up to `capacity` undelivered events per
    /// subscriber before the slowest subscriber starts missing them.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe a surface.
    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: SurfaceEvent) {
        trace!(topic = event.topic(), "publishing surface event");
        // No subscribers is fine; the engine runs headless the same way.
        let _ = self.tx.send(event);
    }
}

/// Bus that discards everything. Useful for tests and headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&self, _event: SurfaceEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = BroadcastBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(SurfaceEvent::CloseAlerts {
            scope: DismissScope::all("console"),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic(), "closeAllAlerts");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = BroadcastBus::new(8);
        bus.publish(SurfaceEvent::Removed {
            notification_id: 1,
        });
    }

    #[test]
    fn test_dismiss_scope_serialization() {
        let scope = DismissScope::by_level("toast", Severity::Critical);
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["source"], "toast");
        assert_eq!(json["level"], "critical");
        assert!(json.get("hours").is_none());

        let scope = DismissScope::older_than("console", 24);
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["hours"], 24);
        assert!(json.get("level").is_none());
    }
}
