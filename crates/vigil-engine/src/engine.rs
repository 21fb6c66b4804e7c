//! Engine core and single-task runtime.
//!
//! [`AlertEngine`] is the synchronous heart of the system: admission,
//! timer handling, acknowledgement, and snapshots, all plain method calls
//! on one owned state bundle (store + filter + timer wheel + bus). The
//! async [`EngineRuntime`] wraps it in a single `select!` task over the
//! feed connection, due timers, caller commands, and settled API calls,
//! so every mutation is serialized and no locking exists anywhere.
//!
//! Alerts are processed in frame-arrival order. Admission is synchronous
//! with the event that carried the alert; acknowledge/resolve calls run
//! in spawned tasks and settle back into the loop, so a slow API never
//! delays the feed.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vigil_core::{Alert, Result, Severity, Signature, VigilError};

use crate::annunciator::Annunciator;
use crate::api::AlertsApi;
use crate::bus::{EventBus, SurfaceEvent};
use crate::connection::{
    ConnectionHandle, ConnectionManager, ConnectionOptions, ConnectionState, FeedEvent,
    ReconnectPolicy,
};
use crate::dedup::{Admission, ThrottleFilter};
use crate::gate::PermissionGate;
use crate::scheduler::{TimerKey, TimerWheel};
use crate::stats::{SessionStats, StatsReport};
use crate::store::{Notification, NotificationStore, StoreCounts, TierCaps};

/// Buffer for caller commands.
const COMMAND_BUFFER: usize = 64;

/// The synchronous engine core. One instance per hosted surface tree;
/// nothing here is a process-wide singleton.
pub struct AlertEngine {
    pub(crate) store: NotificationStore,
    pub(crate) filter: ThrottleFilter,
    pub(crate) timers: TimerWheel,
    pub(crate) bus: Box<dyn EventBus>,
    pub(crate) annunciator: Box<dyn Annunciator>,
    pub(crate) stats: SessionStats,
    pub(crate) visibility_window: Duration,
    pub(crate) connection_state: ConnectionState,
}

impl AlertEngine {
    /// Build an engine from configuration and injected collaborators.
    pub fn new(
        config: &vigil_config::VigilConfig,
        bus: Box<dyn EventBus>,
        annunciator: Box<dyn Annunciator>,
    ) -> Self {
        Self {
            store: NotificationStore::new(TierCaps::from_config(&config.engine)),
            filter: ThrottleFilter::new(Duration::from_millis(config.engine.throttle_window_ms)),
            timers: TimerWheel::new(),
            bus,
            annunciator,
            stats: SessionStats::new(),
            visibility_window: Duration::from_millis(config.engine.visibility_window_ms),
            connection_state: ConnectionState::Closed,
        }
    }

    /// Admit one inbound alert. Returns the id of the notification that
    /// now represents it, or `None` when the alert was rejected.
    pub fn handle_alert(&mut self, alert: Alert) -> Option<u64> {
        self.stats.record_received();

        let signature = match alert.signature() {
            Ok(sig) => sig,
            Err(e) => {
                warn!(alert_id = %alert.id, error = %e, "alert rejected at admission");
                self.stats.record_rejected();
                return None;
            }
        };

        let now = Instant::now();
        match self.filter.admit(&signature, now) {
            Admission::Repeat { notification_id } => {
                let refreshed_at = Utc::now();
                if self.store.refresh(notification_id, refreshed_at) {
                    // The window slides with every repeat.
                    self.timers.arm(
                        TimerKey::ThrottleExpiry(signature),
                        now + self.filter.window(),
                    );
                    self.stats.record_throttled();
                    self.bus.publish(SurfaceEvent::Refreshed {
                        notification_id,
                        refreshed_at,
                    });
                    Some(notification_id)
                } else {
                    // The entry outlived its notification; start over so
                    // the alert is visible again.
                    self.filter.retire(&signature);
                    self.admit_new(alert, signature, now)
                }
            }
            Admission::New => self.admit_new(alert, signature, now),
        }
    }

    fn admit_new(&mut self, alert: Alert, signature: Signature, now: Instant) -> Option<u64> {
        let outcome = self.store.admit(&alert, signature.clone());
        for evicted in &outcome.evicted {
            self.cleanup_removed(evicted);
            self.bus.publish(SurfaceEvent::Removed {
                notification_id: evicted.id,
            });
        }

        self.filter.track(signature.clone(), outcome.id, now);
        self.timers.arm(
            TimerKey::ThrottleExpiry(signature),
            now + self.filter.window(),
        );
        if alert.level.auto_hides() {
            self.timers
                .arm(TimerKey::AutoHide(outcome.id), now + self.visibility_window);
        }

        debug!(
            notification_id = outcome.id,
            alert_id = %alert.id,
            level = %alert.level,
            evicted = outcome.evicted.len(),
            "alert admitted"
        );
        self.stats.record_admitted(&alert);
        self.annunciator.announce(alert.level);
        self.bus.publish(SurfaceEvent::NewAlert {
            alert,
            notification_id: outcome.id,
        });
        Some(outcome.id)
    }

    /// Handle a due timer. Every path re-validates state first; a fire
    /// against an id or signature that no longer exists is a no-op.
    pub fn handle_timer(&mut self, key: TimerKey) {
        match key {
            TimerKey::AutoHide(id) => {
                let Some(notification) = self.store.remove(id) else {
                    return;
                };
                debug!(notification_id = id, "auto-hide expired");
                self.cleanup_removed(&notification);
                self.bus.publish(SurfaceEvent::Removed {
                    notification_id: id,
                });
            }
            TimerKey::ThrottleExpiry(signature) => {
                let now = Instant::now();
                if self.filter.is_stale(&signature, now) {
                    self.filter.retire(&signature);
                } else if let Some(entry) = self.filter.get(&signature) {
                    // Refreshed since this deadline was armed; push it out.
                    let deadline = entry.last_seen + self.filter.window();
                    self.timers.arm(TimerKey::ThrottleExpiry(signature), deadline);
                }
            }
        }
    }

    /// Mark a notification acknowledged and cancel its auto-hide timer.
    /// It stays in the store for the persistent console.
    pub fn acknowledge_local(&mut self, notification_id: u64) {
        if self.store.acknowledge(notification_id) {
            self.timers.disarm(&TimerKey::AutoHide(notification_id));
            self.bus
                .publish(SurfaceEvent::Acknowledged { notification_id });
        }
    }

    /// Remove a notification entirely, with full timer and throttle
    /// cleanup.
    pub fn resolve_local(&mut self, notification_id: u64) {
        if let Some(notification) = self.store.remove(notification_id) {
            self.cleanup_removed(&notification);
            self.bus.publish(SurfaceEvent::Removed { notification_id });
        }
    }

    /// Record a connection-state transition and tell the surfaces.
    pub fn connection_changed(&mut self, state: ConnectionState) {
        if self.connection_state == state {
            return;
        }
        info!(%state, "feed connection state changed");
        self.connection_state = state;
        self.bus.publish(SurfaceEvent::ConnectionChanged { state });
    }

    /// Counts recomputed from the store.
    pub fn counts(&self) -> StoreCounts {
        self.store.counts()
    }

    /// Fire every timer due now. Returns how many fired. This is what the
    /// runtime calls when its sleep elapses; callers driving the core
    /// directly use it the same way.
    pub fn fire_due_timers(&mut self) -> usize {
        let due = self.timers.pop_due(Instant::now());
        let count = due.len();
        for key in due {
            self.handle_timer(key);
        }
        count
    }

    /// Number of pending timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    /// Point-in-time view of the whole engine for surfaces and the CLI.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            connection: self.connection_state,
            counts: self.store.counts(),
            notifications: self
                .store
                .list_by_severity()
                .into_iter()
                .cloned()
                .collect(),
            stats: self.stats.report(),
        }
    }

    /// Drop the timers and throttle bookkeeping attached to a removed
    /// notification. The signature entry is retired only while it still
    /// points at this notification; a newer one keeps its own.
    pub(crate) fn cleanup_removed(&mut self, notification: &Notification) {
        self.timers.disarm(&TimerKey::AutoHide(notification.id));
        if let Some(entry) = self.filter.get(&notification.signature) {
            if entry.notification_id == notification.id {
                self.filter.retire(&notification.signature);
                self.timers
                    .disarm(&TimerKey::ThrottleExpiry(notification.signature.clone()));
            }
        }
    }
}

/// Serializable point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    /// Feed connection state
    pub connection: ConnectionState,
    /// Store counts
    pub counts: StoreCounts,
    /// Notifications, severity-sorted (critical first)
    pub notifications: Vec<Notification>,
    /// Session statistics
    pub stats: StatsReport,
}

/// Commands accepted by the runtime.
#[derive(Debug)]
pub enum EngineCommand {
    /// Acknowledge a notification (flag it, keep it for the console)
    Acknowledge {
        /// Target notification
        notification_id: u64,
    },
    /// Resolve a notification (remove it)
    Resolve {
        /// Target notification
        notification_id: u64,
    },
    /// Dismiss every notification
    DismissAll {
        /// Initiating surface, carried on the broadcast
        source: String,
    },
    /// Dismiss notifications of one severity
    DismissBySeverity {
        /// Initiating surface
        source: String,
        /// Severity to dismiss
        level: Severity,
    },
    /// Dismiss notifications older than `hours`
    DismissOlderThan {
        /// Initiating surface
        source: String,
        /// Age cutoff in hours
        hours: i64,
    },
    /// The caller's view-alerts permission changed
    PermissionChanged(bool),
    /// Request a snapshot
    Snapshot {
        /// Reply channel
        reply: oneshot::Sender<EngineSnapshot>,
    },
    /// Stop the runtime
    Shutdown,
}

/// Options for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Feed WebSocket URL; `None` runs the engine command-driven only
    pub feed_url: Option<String>,
    /// Reconnection policy
    pub policy: ReconnectPolicy,
    /// Alerts API client; `None` applies acknowledge/resolve locally
    pub api: Option<AlertsApi>,
}

impl RuntimeOptions {
    /// Derive options from the config file.
    pub fn from_config(config: &vigil_config::VigilConfig) -> Self {
        Self {
            feed_url: Some(config.feed.ws_url()),
            policy: ReconnectPolicy::from_config(&config.reconnect),
            api: Some(AlertsApi::new(config.feed.api_base())),
        }
    }

    /// Options with no feed and no API, for command-driven use.
    pub fn offline() -> Self {
        Self {
            feed_url: None,
            policy: ReconnectPolicy::default(),
            api: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum AlertAction {
    Acknowledge,
    Resolve,
}

struct Settlement {
    notification_id: u64,
    action: AlertAction,
    result: Result<()>,
}

/// The single task that serializes every engine mutation.
pub struct EngineRuntime {
    engine: AlertEngine,
    options: RuntimeOptions,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    conn: Option<ConnectionHandle>,
    feed_rx: Option<mpsc::Receiver<FeedEvent>>,
    settle_tx: mpsc::Sender<Settlement>,
    settle_rx: mpsc::Receiver<Settlement>,
    permitted: bool,
}

impl EngineRuntime {
    /// Create a runtime around an engine. The gate decides whether the
    /// feed connection is opened at all.
    pub fn new(
        engine: AlertEngine,
        options: RuntimeOptions,
        gate: &dyn PermissionGate,
    ) -> (Self, EngineHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (settle_tx, settle_rx) = mpsc::channel(COMMAND_BUFFER);
        let permitted = gate.can_view_alerts();
        (
            Self {
                engine,
                options,
                cmd_rx,
                conn: None,
                feed_rx: None,
                settle_tx,
                settle_rx,
                permitted,
            },
            EngineHandle { cmd_tx },
        )
    }

    /// Spawn the runtime onto the current tokio runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown. On return the connection is closed and every
    /// timer is cancelled; nothing fires after teardown.
    pub async fn run(mut self) {
        // Best-effort; a refusal changes nothing about admission.
        self.engine.annunciator.request_permission();

        if self.permitted {
            self.open_connection();
        } else {
            info!("view-alerts permission not granted; feed stays closed");
        }

        loop {
            let deadline = self.engine.timers.next_deadline();
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    match maybe_cmd {
                        None | Some(EngineCommand::Shutdown) => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                maybe_event = recv_or_pending(&mut self.feed_rx) => {
                    match maybe_event {
                        Some(event) => self.handle_feed_event(event),
                        None => self.feed_rx = None,
                    }
                }
                Some(settlement) = self.settle_rx.recv() => {
                    self.handle_settlement(settlement);
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.engine.fire_due_timers();
                }
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Acknowledge { notification_id } => {
                self.run_action(notification_id, AlertAction::Acknowledge);
            }
            EngineCommand::Resolve { notification_id } => {
                self.run_action(notification_id, AlertAction::Resolve);
            }
            EngineCommand::DismissAll { source } => {
                self.engine.dismiss_all(&source);
            }
            EngineCommand::DismissBySeverity { source, level } => {
                self.engine.dismiss_by_severity(&source, level);
            }
            EngineCommand::DismissOlderThan { source, hours } => {
                self.engine.dismiss_older_than(&source, hours);
            }
            EngineCommand::PermissionChanged(granted) => self.permission_changed(granted),
            EngineCommand::Snapshot { reply } => {
                let _ = reply.send(self.engine.snapshot());
            }
            // Handled in the select loop before dispatch
            EngineCommand::Shutdown => {}
        }
    }

    fn handle_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Alert(alert) => {
                if self.permitted {
                    self.engine.handle_alert(*alert);
                }
            }
            FeedEvent::Malformed => self.engine.stats.record_malformed(),
            FeedEvent::StateChanged(state) => self.engine.connection_changed(state),
            FeedEvent::GaveUp { attempts } => {
                warn!(attempts, "feed gave up reconnecting");
                self.engine.stats.mark_gave_up();
                self.engine.connection_changed(ConnectionState::Closed);
            }
        }
    }

    /// Start an acknowledge/resolve. With an API configured the call runs
    /// in a spawned task and the local mutation waits for it to settle;
    /// without one the mutation applies immediately.
    fn run_action(&mut self, notification_id: u64, action: AlertAction) {
        let Some(notification) = self.engine.store.get(notification_id) else {
            debug!(notification_id, "action against unknown notification ignored");
            return;
        };

        match &self.options.api {
            Some(api) => {
                let api = api.clone();
                let alert_id = notification.alert_id.clone();
                let settle = self.settle_tx.clone();
                tokio::spawn(async move {
                    let result = match action {
                        AlertAction::Acknowledge => api.acknowledge(&alert_id).await,
                        AlertAction::Resolve => api.resolve(&alert_id).await,
                    };
                    let _ = settle
                        .send(Settlement {
                            notification_id,
                            action,
                            result,
                        })
                        .await;
                });
            }
            None => self.apply_action(notification_id, action),
        }
    }

    fn apply_action(&mut self, notification_id: u64, action: AlertAction) {
        match action {
            AlertAction::Acknowledge => self.engine.acknowledge_local(notification_id),
            AlertAction::Resolve => self.engine.resolve_local(notification_id),
        }
    }

    fn handle_settlement(&mut self, settlement: Settlement) {
        match settlement.result {
            Ok(()) => self.apply_action(settlement.notification_id, settlement.action),
            Err(VigilError::ActionFailed { failure, .. }) if failure.counts_as_success() => {
                self.apply_action(settlement.notification_id, settlement.action);
            }
            Err(VigilError::ActionFailed { failure, .. }) => {
                warn!(
                    notification_id = settlement.notification_id,
                    %failure,
                    "alert action failed; notification kept"
                );
                self.engine.bus.publish(SurfaceEvent::ActionFailed {
                    notification_id: settlement.notification_id,
                    failure,
                });
            }
            Err(e) => {
                warn!(
                    notification_id = settlement.notification_id,
                    error = %e,
                    "alert action failed"
                );
            }
        }
    }

    fn permission_changed(&mut self, granted: bool) {
        if granted == self.permitted {
            return;
        }
        self.permitted = granted;
        if granted {
            info!("view-alerts permission granted; opening feed");
            self.open_connection();
        } else {
            info!("view-alerts permission revoked; closing feed");
            self.close_connection();
            self.engine.connection_changed(ConnectionState::Closed);
        }
    }

    fn open_connection(&mut self) {
        let Some(url) = self.options.feed_url.clone() else {
            debug!("no feed configured; engine runs command-driven only");
            return;
        };
        let (handle, feed_rx) = ConnectionManager::spawn(ConnectionOptions {
            url,
            policy: self.options.policy.clone(),
        });
        self.conn = Some(handle);
        self.feed_rx = Some(feed_rx);
    }

    fn close_connection(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
        self.feed_rx = None;
    }

    fn teardown(&mut self) {
        self.close_connection();
        self.engine.timers.clear();
        info!("engine runtime stopped");
    }
}

/// Cloneable caller facade over the runtime.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Acknowledge a notification.
    pub async fn acknowledge(&self, notification_id: u64) -> Result<()> {
        self.send(EngineCommand::Acknowledge { notification_id }).await
    }

    /// Resolve (remove) a notification.
    pub async fn resolve(&self, notification_id: u64) -> Result<()> {
        self.send(EngineCommand::Resolve { notification_id }).await
    }

    /// Dismiss every notification.
    pub async fn dismiss_all(&self, source: impl Into<String>) -> Result<()> {
        self.send(EngineCommand::DismissAll {
            source: source.into(),
        })
        .await
    }

    /// Dismiss notifications of one severity.
    pub async fn dismiss_by_severity(
        &self,
        source: impl Into<String>,
        level: Severity,
    ) -> Result<()> {
        self.send(EngineCommand::DismissBySeverity {
            source: source.into(),
            level,
        })
        .await
    }

    /// Dismiss notifications older than `hours`.
    pub async fn dismiss_older_than(&self, source: impl Into<String>, hours: i64) -> Result<()> {
        self.send(EngineCommand::DismissOlderThan {
            source: source.into(),
            hours,
        })
        .await
    }

    /// Report a permission change.
    pub async fn set_permission(&self, granted: bool) -> Result<()> {
        self.send(EngineCommand::PermissionChanged(granted)).await
    }

    /// Fetch a snapshot of the engine.
    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Snapshot { reply }).await?;
        rx.await
            .map_err(|_| VigilError::internal("engine stopped before replying"))
    }

    /// Stop the runtime.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(EngineCommand::Shutdown).await
    }

    async fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| VigilError::internal("engine runtime is not running"))
    }
}

async fn recv_or_pending(rx: &mut Option<mpsc::Receiver<FeedEvent>>) -> Option<FeedEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
