//! Error types for Vigil operations.
//!
//! This module defines [`VigilError`], the error enum shared by the Vigil
//! crates. Nothing in the engine is fatal: transport errors recover through
//! reconnection, admission errors drop the offending alert and count it,
//! and action errors are surfaced to the operator with a distinct failure
//! kind per HTTP status class.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`VigilError`].
pub type Result<T> = std::result::Result<T, VigilError>;

/// Error type for all Vigil operations.
#[derive(Debug, Error)]
pub enum VigilError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // Transport Errors (feed connection)
    // =========================================================================
    /// WebSocket connect failed
    #[error("Feed connection failed for {url}: {message}")]
    FeedConnect { url: String, message: String },

    /// Inbound frame could not be decoded
    #[error("Malformed feed frame: {message}")]
    FrameDecode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Reconnection attempts exhausted
    #[error("Feed reconnection gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    // =========================================================================
    // Admission Errors
    // =========================================================================
    /// Alert is missing the fields needed to build its dedup signature
    #[error("Alert rejected: {reason}")]
    AlertRejected { reason: String },

    // =========================================================================
    // Action Errors (external alerts API)
    // =========================================================================
    /// Acknowledge/resolve request against the alerts API failed
    #[error("Alert action failed for {alert_id}: {failure}")]
    ActionFailed {
        alert_id: String,
        failure: ActionFailure,
    },

    // =========================================================================
    // I/O & Logging Errors
    // =========================================================================
    /// Log directory could not be created
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal error (bug in Vigil)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failure classes for acknowledge/resolve calls against the alerts API.
///
/// Each class maps to a distinct operator-facing treatment: session expiry
/// redirects to login, permission denial is terminal, a missing alert is
/// treated as already handled, and transient failures get a retry
/// affordance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFailure {
    /// 401 - session expired, operator must log in again
    SessionExpired,
    /// 403 - the operator lacks the required permission
    PermissionDenied,
    /// 404 - the alert is already gone server-side; treated as success locally
    AlreadyGone,
    /// 5xx or network failure - transient, worth retrying
    Transient(String),
}

impl ActionFailure {
    /// Classify an HTTP status code into a failure kind.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => Self::SessionExpired,
            403 => Self::PermissionDenied,
            404 => Self::AlreadyGone,
            _ => Self::Transient(format!("HTTP {status}: {body}")),
        }
    }

    /// Returns true if the caller should retry the action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true if the local notification may be released anyway.
    ///
    /// Only a 404 qualifies: the server no longer knows the alert, so
    /// keeping it visible locally would pin a ghost.
    pub fn counts_as_success(&self) -> bool {
        matches!(self, Self::AlreadyGone)
    }
}

impl std::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionExpired => write!(f, "session expired (401)"),
            Self::PermissionDenied => write!(f, "permission denied (403)"),
            Self::AlreadyGone => write!(f, "alert already gone (404)"),
            Self::Transient(msg) => write!(f, "transient failure: {msg}"),
        }
    }
}

impl VigilError {
    /// Create a FrameDecode error from a serde failure.
    pub fn frame_decode(source: serde_json::Error) -> Self {
        Self::FrameDecode {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create an AlertRejected error.
    pub fn alert_rejected(reason: impl Into<String>) -> Self {
        Self::AlertRejected {
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error belongs to the feed transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::FeedConnect { .. } | Self::FrameDecode { .. } | Self::ReconnectExhausted { .. }
        )
    }

    /// Returns true if the operation that produced this error may succeed
    /// on retry without operator intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::FeedConnect { .. } | Self::FrameDecode { .. } => true,
            Self::ActionFailed { failure, .. } => failure.is_retryable(),
            _ => false,
        }
    }

    /// Returns actionable guidance for the operator, where there is any.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Create ~/.vigil/config.yaml or pass --config with a valid path")
            }
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in the configuration file"),
            Self::ReconnectExhausted { .. } => {
                Some("The feed is unreachable; reload the console to retry")
            }
            Self::ActionFailed { failure, .. } => match failure {
                ActionFailure::SessionExpired => Some("Log in again to refresh the session"),
                ActionFailure::PermissionDenied => {
                    Some("Ask an administrator for the alert-management permission")
                }
                ActionFailure::Transient(_) => Some("Wait a moment and retry the action"),
                ActionFailure::AlreadyGone => None,
            },
            _ => None,
        }
    }
}
