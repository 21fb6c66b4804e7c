//! Persistent feed connection with exponential-backoff reconnection.
//!
//! The connection manager owns a single full-duplex WebSocket to the alert
//! feed. It decodes inbound frames, forwards alert events in arrival order,
//! and handles the reconnect loop: every abnormal close schedules a retry
//! with delay `min(base * 2^attempt, max)` until `max_attempts` is reached,
//! after which the state is pinned at [`ConnectionState::Closed`] and the
//! operator sees a persistent "disconnected" status.
//!
//! Malformed frames are dropped and logged; they never terminate the
//! connection. Frames whose `type` is not recognized are ignored.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use vigil_core::{Alert, Result, VigilError};

/// Channel buffer for feed events. Large enough to absorb a burst of
/// alerts without back-pressuring the read loop.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Connection lifecycle state, observable by external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Initial connection attempt in progress
    Connecting,
    /// Connected; alerts flow
    Open,
    /// Connection lost; a retry is scheduled
    Reconnecting,
    /// No connection and no retry pending (closed by the caller, or
    /// reconnection gave up)
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Events forwarded from the connection task to the engine runtime.
#[derive(Debug)]
pub enum FeedEvent {
    /// An alert frame arrived. Frames are forwarded in arrival order.
    Alert(Box<Alert>),
    /// A frame could not be decoded and was dropped
    Malformed,
    /// The connection state changed
    StateChanged(ConnectionState),
    /// Reconnection attempts are exhausted; the state is pinned closed
    GaveUp {
        /// How many attempts were made before giving up
        attempts: u32,
    },
}

/// Deterministic exponential backoff for feed reconnection.
///
/// Attempt `n` (1-based) waits `min(base * 2^n, max)`. Past `max_attempts`
/// there is no further delay: reconnection stops.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Base retry delay
    pub base_delay: Duration,
    /// Cap on the retry delay
    pub max_delay: Duration,
    /// Attempts before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Build a policy from the reconnect section of the config file.
    pub fn from_config(config: &vigil_config::ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before retry `attempt` (1-based), or `None` once the policy
    /// is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        // Shift saturates well past the cap, so clamping the exponent is
        // enough to avoid overflow.
        let factor = 1u128 << attempt.min(32);
        let delay_ms = (self.base_delay.as_millis().saturating_mul(factor))
            .min(self.max_delay.as_millis());
        Some(Duration::from_millis(delay_ms as u64))
    }
}

/// Options for spawning a connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// WebSocket URL of the alert feed
    pub url: String,
    /// Reconnection backoff policy
    pub policy: ReconnectPolicy,
}

/// Handle to a spawned connection task.
///
/// Dropping the handle closes the connection, same as [`close`].
///
/// [`close`]: ConnectionHandle::close
pub struct ConnectionHandle {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Close the connection and cancel any pending reconnection timer.
    ///
    /// Idempotent: closing an already-closed connection is a no-op.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel for connection-state transitions, for collaborators
    /// that gate on connectivity.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

/// Spawns and runs the persistent feed connection.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Spawn the connection task.
    ///
    /// Returns a handle for closing the connection and a receiver of
    /// [`FeedEvent`]s. Alerts are delivered in the order their frames
    /// arrived on the wire.
    pub fn spawn(options: ConnectionOptions) -> (ConnectionHandle, mpsc::Receiver<FeedEvent>) {
        let (event_tx, event_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        tokio::spawn(run_connection(options, state_tx, event_tx, shutdown_rx));

        (
            ConnectionHandle {
                shutdown_tx,
                state_rx,
            },
            event_rx,
        )
    }
}

/// Decode one inbound text frame.
///
/// Returns `Ok(Some(alert))` for an alert frame, `Ok(None)` for a frame
/// whose `type` is not recognized, and an error when the frame is not
/// valid JSON or its alert payload is unparseable.
pub fn decode_frame(text: &str) -> Result<Option<Alert>> {
    #[derive(Deserialize)]
    struct FeedFrame {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        data: serde_json::Value,
    }

    let frame: FeedFrame = serde_json::from_str(text).map_err(VigilError::frame_decode)?;
    if frame.kind != "alert" {
        return Ok(None);
    }
    let alert: Alert = serde_json::from_value(frame.data).map_err(VigilError::frame_decode)?;
    Ok(Some(alert))
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum StreamEnd {
    /// The peer closed or the transport failed; reconnect
    Dropped,
    /// The caller closed the connection; stop entirely
    Shutdown,
}

async fn run_connection(
    options: ConnectionOptions,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::Sender<FeedEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    publish_state(&state_tx, &events, ConnectionState::Connecting).await;

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            result = connect_async(options.url.as_str()) => match result {
                Ok((stream, _response)) => {
                    // A successful open always resets the retry counter.
                    attempt = 0;
                    info!(url = %options.url, "feed connected");
                    publish_state(&state_tx, &events, ConnectionState::Open).await;

                    match read_stream(stream, &events, &mut shutdown).await {
                        StreamEnd::Shutdown => break,
                        StreamEnd::Dropped => {
                            debug!(url = %options.url, "feed connection dropped");
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %options.url, error = %e, "feed connect failed");
                }
            }
        }

        attempt += 1;
        match options.policy.delay_for_attempt(attempt) {
            Some(delay) => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                publish_state(&state_tx, &events, ConnectionState::Reconnecting).await;
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                warn!(
                    attempts = options.policy.max_attempts,
                    "feed reconnection exhausted, giving up"
                );
                publish_state(&state_tx, &events, ConnectionState::Closed).await;
                let _ = events
                    .send(FeedEvent::GaveUp {
                        attempts: options.policy.max_attempts,
                    })
                    .await;
                return;
            }
        }
    }

    publish_state(&state_tx, &events, ConnectionState::Closed).await;
}

async fn read_stream(
    mut stream: WsStream,
    events: &mpsc::Sender<FeedEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamEnd {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = stream.close(None).await;
                return StreamEnd::Shutdown;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                    Ok(Some(alert)) => {
                        trace!(alert_id = %alert.id, "alert frame received");
                        if events.send(FeedEvent::Alert(Box::new(alert))).await.is_err() {
                            // Engine is gone; nothing left to feed.
                            let _ = stream.close(None).await;
                            return StreamEnd::Shutdown;
                        }
                    }
                    Ok(None) => {
                        trace!("ignoring non-alert frame");
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping malformed feed frame");
                        if events.send(FeedEvent::Malformed).await.is_err() {
                            let _ = stream.close(None).await;
                            return StreamEnd::Shutdown;
                        }
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = stream.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => return StreamEnd::Dropped,
                Some(Ok(_)) => {
                    // Binary and pong frames carry nothing for us.
                }
                Some(Err(e)) => {
                    warn!(error = %e, "feed read error");
                    return StreamEnd::Dropped;
                }
            }
        }
    }
}

async fn publish_state(
    state_tx: &watch::Sender<ConnectionState>,
    events: &mpsc::Sender<FeedEvent>,
    state: ConnectionState,
) {
    if *state_tx.borrow() == state {
        return;
    }
    let _ = state_tx.send(state);
    let _ = events.send(FeedEvent::StateChanged(state)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts,
        }
    }

    #[test]
    fn test_backoff_sequence() {
        let policy = policy(5);
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.delay_for_attempt(n).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30_000]);
    }

    #[test]
    fn test_backoff_exhaustion() {
        let policy = policy(5);
        assert!(policy.delay_for_attempt(5).is_some());
        assert_eq!(policy.delay_for_attempt(6), None);
        assert_eq!(policy.delay_for_attempt(0), None);
    }

    #[test]
    fn test_backoff_large_attempt_does_not_overflow() {
        let policy = policy(u32::MAX);
        assert_eq!(
            policy.delay_for_attempt(64).unwrap(),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn test_decode_alert_frame() {
        let text = r#"{"type": "alert", "data": {
            "id": "a1", "title": "SSH Brute Force", "message": "m",
            "level": "high", "source_ip": "10.0.0.5", "target_port": 22
        }}"#;
        let alert = decode_frame(text).unwrap().unwrap();
        assert_eq!(alert.id, "a1");
        assert_eq!(alert.target_port, Some(22));
    }

    #[test]
    fn test_decode_ignores_unknown_frame_type() {
        let text = r#"{"type": "heartbeat", "data": {"seq": 42}}"#;
        assert!(decode_frame(text).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = decode_frame("{not json").unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_decode_rejects_bad_alert_payload() {
        // An alert frame whose payload lacks required fields
        let text = r#"{"type": "alert", "data": {"title": "no id or level"}}"#;
        assert!(decode_frame(text).is_err());
    }

    #[test]
    fn test_policy_from_config() {
        let config = vigil_config::ReconnectConfig {
            base_delay_ms: 500,
            max_delay_ms: 4000,
            max_attempts: 3,
        };
        let policy = ReconnectPolicy::from_config(&config);
        assert_eq!(
            policy.delay_for_attempt(1).unwrap(),
            Duration::from_millis(1000)
        );
        assert_eq!(
            policy.delay_for_attempt(3).unwrap(),
            Duration::from_millis(4000)
        );
        assert_eq!(policy.delay_for_attempt(4), None);
    }
}
