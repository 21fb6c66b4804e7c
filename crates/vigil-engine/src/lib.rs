//! # vigil-engine
//!
//! The real-time alert engine behind the Vigil console: it consumes a live
//! WebSocket feed of security alerts, deduplicates repeats, maintains a
//! bounded severity-partitioned set of visible notifications, auto-hides
//! non-critical ones, and keeps every subscribed display surface consistent
//! through a broadcast bus.
//!
//! ## Architecture
//!
//! - [`connection`] - persistent feed connection with exponential-backoff
//!   reconnection
//! - [`dedup`] - signature-based throttle filter (sliding window)
//! - [`store`] - bounded notification store with per-tier eviction
//! - [`scheduler`] - monotonic timer wheel for auto-hide and throttle expiry
//! - [`dispatch`] - bulk dismissal operations
//! - [`bus`] - surface event broadcast
//! - [`gate`] - view-alerts permission gate
//! - [`api`] - acknowledge/resolve calls against the alerts API
//! - [`annunciator`] - best-effort audible chime
//! - [`stats`] - per-session feed statistics
//! - [`engine`] - the single-task runtime that serializes all of the above
//!
//! All store, filter, and timer mutations happen inside one task, so timer
//! callbacks and network callbacks never race; each callback re-validates
//! state before acting and a stale fire is a no-op.

pub mod annunciator;
pub mod api;
pub mod bus;
pub mod connection;
pub mod dedup;
pub mod dispatch;
pub mod engine;
pub mod gate;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use annunciator::{Annunciator, Silent, TerminalBell};
pub use api::AlertsApi;
pub use bus::{BroadcastBus, DismissScope, EventBus, NullBus, SurfaceEvent};
pub use connection::{
    ConnectionHandle, ConnectionManager, ConnectionOptions, ConnectionState, FeedEvent,
    ReconnectPolicy,
};
pub use dedup::{Admission, ThrottleFilter};
pub use dispatch::DismissOutcome;
pub use engine::{
    AlertEngine, EngineCommand, EngineHandle, EngineRuntime, EngineSnapshot, RuntimeOptions,
};
pub use gate::{PermissionGate, StaticGate};
pub use scheduler::{TimerKey, TimerWheel};
pub use stats::{SessionStats, StatsReport};
pub use store::{Notification, NotificationStore, StoreCounts, TierCaps};
