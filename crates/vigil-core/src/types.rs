//! The alert domain model.
//!
//! This module defines the inbound [`Alert`] record as delivered by the
//! detection feed, the ordered [`Severity`] scale, and the derived
//! [`Signature`] used to collapse repeats of the same attack into one
//! visible notification.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VigilError};

/// Alert severity level, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational (benign traffic summaries, feed housekeeping)
    Info = 0,
    /// Low-risk finding
    Low = 1,
    /// Medium-risk finding
    Medium = 2,
    /// High-risk finding (active attack pattern)
    High = 3,
    /// Critical (confirmed compromise, zero-day, active exfiltration)
    Critical = 4,
}

impl Severity {
    /// All severity levels, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Whether notifications at this level stay visible until an operator
    /// acts on them.
    pub fn is_critical(&self) -> bool {
        matches!(self, Severity::Critical)
    }

    /// Whether this level belongs to the combined medium/low display tier.
    pub fn is_standard_tier(&self) -> bool {
        matches!(self, Severity::Medium | Severity::Low)
    }

    /// Whether notifications at this level are removed automatically after
    /// their visibility window.
    pub fn auto_hides(&self) -> bool {
        !self.is_critical()
    }

    /// Display label matching the feed's wire encoding.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Get the icon for this severity level.
    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Critical => "✖",
            Severity::High => "⚠",
            Severity::Medium => "●",
            Severity::Low => "○",
            Severity::Info => "ℹ",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An inbound security alert from the detection feed.
///
/// Alerts are immutable once received; the engine derives a [`Signature`]
/// from them and tracks visibility separately as notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Opaque identifier assigned upstream
    pub id: String,
    /// Short human-readable title, e.g. "SSH Brute Force from 10.0.0.5"
    #[serde(default)]
    pub title: String,
    /// Detailed message body
    #[serde(default)]
    pub message: String,
    /// Severity level
    pub level: Severity,
    /// Source IP of the offending traffic, when known
    #[serde(default)]
    pub source_ip: Option<String>,
    /// Targeted port, when known
    #[serde(default)]
    pub target_port: Option<u16>,
    /// Classified attack type, e.g. "Port Scan", "SSH Brute Force"
    #[serde(default)]
    pub attack_type: Option<String>,
    /// When the alert arrived; the feed's `timestamp` field when present,
    /// otherwise the client's receive time
    #[serde(default = "Utc::now", alias = "timestamp")]
    pub received_at: DateTime<Utc>,
}

impl Alert {
    /// Derive the dedup signature for this alert.
    ///
    /// Fails when the alert lacks the fields a signature is built from;
    /// such alerts are dropped at admission and counted, never admitted.
    pub fn signature(&self) -> Result<Signature> {
        if self.id.trim().is_empty() {
            return Err(VigilError::alert_rejected("alert id is empty"));
        }
        if self.title.trim().is_empty() {
            return Err(VigilError::alert_rejected("alert title is empty"));
        }
        Ok(Signature::new(
            &self.title,
            self.source_ip.as_deref(),
            self.target_port,
        ))
    }
}

/// Dedup key derived from an alert: `title|source_ip|target_port`.
///
/// Collisions are intentional: repeats of the same attack signature
/// collapse to one visible notification while the throttle window is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Signature(String);

impl Signature {
    /// Build a signature from its parts. Missing optionals contribute an
    /// empty segment so that "no source" and "no port" dedup together.
    pub fn new(title: &str, source_ip: Option<&str>, target_port: Option<u16>) -> Self {
        let port = target_port.map(|p| p.to_string()).unwrap_or_default();
        Signature(format!("{}|{}|{}", title, source_ip.unwrap_or(""), port))
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_alert() -> Alert {
        Alert {
            id: "a-1".into(),
            title: "SSH Brute Force".into(),
            message: "Multiple failed logins".into(),
            level: Severity::High,
            source_ip: Some("10.0.0.5".into()),
            target_port: Some(22),
            attack_type: Some("SSH Brute Force".into()),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_severity_tiers() {
        assert!(Severity::Critical.is_critical());
        assert!(!Severity::Critical.auto_hides());
        assert!(Severity::High.auto_hides());
        assert!(Severity::Medium.is_standard_tier());
        assert!(Severity::Low.is_standard_tier());
        assert!(!Severity::High.is_standard_tier());
        assert!(!Severity::Info.is_standard_tier());
    }

    #[test]
    fn test_severity_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let level: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(level, Severity::High);
    }

    #[test]
    fn test_signature_from_parts() {
        let sig = Signature::new("SSH Brute Force", Some("10.0.0.5"), Some(22));
        assert_eq!(sig.as_str(), "SSH Brute Force|10.0.0.5|22");
    }

    #[test]
    fn test_signature_missing_optionals() {
        let sig = Signature::new("Unusual Network Behavior", None, None);
        assert_eq!(sig.as_str(), "Unusual Network Behavior||");
    }

    #[test]
    fn test_alert_signature() {
        let alert = sample_alert();
        let sig = alert.signature().unwrap();
        assert_eq!(sig.as_str(), "SSH Brute Force|10.0.0.5|22");
    }

    #[test]
    fn test_alert_signature_rejects_missing_fields() {
        let mut alert = sample_alert();
        alert.title = "  ".into();
        assert!(alert.signature().is_err());

        let mut alert = sample_alert();
        alert.id = String::new();
        assert!(alert.signature().is_err());
    }

    #[test]
    fn test_alert_deserializes_feed_frame_data() {
        let json = r#"{
            "id": "b9c2",
            "title": "Port Scan Detected from 192.168.1.7",
            "message": "Source accessed 12 ports in 10 seconds",
            "level": "high",
            "source_ip": "192.168.1.7",
            "timestamp": "2026-08-05T08:30:00Z"
        }"#;
        let alert: Alert = serde_json::from_str(json).unwrap();
        assert_eq!(alert.level, Severity::High);
        assert_eq!(alert.source_ip.as_deref(), Some("192.168.1.7"));
        assert_eq!(alert.target_port, None);
        assert_eq!(
            alert.received_at,
            "2026-08-05T08:30:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_alert_received_at_defaults_to_now() {
        let json = r#"{"id": "c3", "title": "Threat Detected", "level": "low"}"#;
        let alert: Alert = serde_json::from_str(json).unwrap();
        assert!(alert.received_at <= Utc::now());
    }
}
