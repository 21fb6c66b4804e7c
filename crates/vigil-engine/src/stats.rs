//! Per-session feed statistics.
//!
//! The engine keeps running counters of what the feed delivered and what
//! the filter did with it, plus bounded tallies of the busiest source IPs
//! and target ports. Stats are per engine instance and reset with it.

use std::collections::HashMap;

use serde::Serialize;

use vigil_core::{Alert, Severity};

/// Maximum distinct IPs/ports tracked. Beyond this the tallies stop
/// admitting new keys so a scan cannot grow them without bound.
const MAX_TRACKED_KEYS: usize = 256;

/// How many top talkers a report includes.
const TOP_N: usize = 5;

/// Session counters, owned by the engine.
#[derive(Debug, Default)]
pub struct SessionStats {
    received: u64,
    admitted: u64,
    throttled: u64,
    dropped_malformed: u64,
    dropped_rejected: u64,
    gave_up: bool,
    by_level: HashMap<Severity, u64>,
    source_ips: HashMap<String, u64>,
    target_ports: HashMap<u16, u64>,
}

impl SessionStats {
    /// Create empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a frame that decoded to an alert.
    pub fn record_received(&mut self) {
        self.received += 1;
    }

    /// Count an alert admitted as a fresh notification.
    pub fn record_admitted(&mut self, alert: &Alert) {
        self.admitted += 1;
        *self.by_level.entry(alert.level).or_insert(0) += 1;

        if let Some(ip) = &alert.source_ip {
            bump_bounded(&mut self.source_ips, ip.clone());
        }
        if let Some(port) = alert.target_port {
            bump_bounded(&mut self.target_ports, port);
        }
    }

    /// Count a repeat merged into an existing notification.
    pub fn record_throttled(&mut self) {
        self.throttled += 1;
    }

    /// Count a frame dropped because it could not be decoded.
    pub fn record_malformed(&mut self) {
        self.dropped_malformed += 1;
    }

    /// Count an alert rejected at admission (unparseable signature).
    pub fn record_rejected(&mut self) {
        self.dropped_rejected += 1;
    }

    /// Mark that reconnection gave up; sticky for the session.
    pub fn mark_gave_up(&mut self) {
        self.gave_up = true;
    }

    /// Whether the feed gave up reconnecting.
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    /// Snapshot the counters for display.
    pub fn report(&self) -> StatsReport {
        StatsReport {
            received: self.received,
            admitted: self.admitted,
            throttled: self.throttled,
            dropped_malformed: self.dropped_malformed,
            dropped_rejected: self.dropped_rejected,
            gave_up: self.gave_up,
            by_level: Severity::ALL
                .iter()
                .filter_map(|level| {
                    self.by_level
                        .get(level)
                        .map(|count| (level.label().to_string(), *count))
                })
                .collect(),
            top_source_ips: top_n(&self.source_ips),
            top_target_ports: top_n(&self.target_ports),
        }
    }
}

/// Serializable snapshot of session statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Alert frames received
    pub received: u64,
    /// Fresh notifications admitted
    pub admitted: u64,
    /// Repeats merged into existing notifications
    pub throttled: u64,
    /// Frames dropped as undecodable
    pub dropped_malformed: u64,
    /// Alerts dropped for an unparseable signature
    pub dropped_rejected: u64,
    /// Whether reconnection gave up this session
    pub gave_up: bool,
    /// Admissions per severity level, most severe first
    pub by_level: Vec<(String, u64)>,
    /// Busiest source IPs, descending
    pub top_source_ips: Vec<(String, u64)>,
    /// Most-targeted ports, descending
    pub top_target_ports: Vec<(u16, u64)>,
}

fn bump_bounded<K: std::hash::Hash + Eq>(map: &mut HashMap<K, u64>, key: K) {
    if map.len() >= MAX_TRACKED_KEYS && !map.contains_key(&key) {
        return;
    }
    *map.entry(key).or_insert(0) += 1;
}

fn top_n<K: Clone + Ord>(map: &HashMap<K, u64>) -> Vec<(K, u64)> {
    let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    entries.truncate(TOP_N);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn alert(level: Severity, ip: &str, port: u16) -> Alert {
        Alert {
            id: "a".into(),
            title: "t".into(),
            message: "m".into(),
            level,
            source_ip: Some(ip.into()),
            target_port: Some(port),
            attack_type: None,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_counters() {
        let mut stats = SessionStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_admitted(&alert(Severity::High, "10.0.0.5", 22));
        stats.record_throttled();
        stats.record_malformed();

        let report = stats.report();
        assert_eq!(report.received, 2);
        assert_eq!(report.admitted, 1);
        assert_eq!(report.throttled, 1);
        assert_eq!(report.dropped_malformed, 1);
        assert!(!report.gave_up);
        assert_eq!(report.by_level, vec![("high".to_string(), 1)]);
    }

    #[test]
    fn test_top_talkers_ordering() {
        let mut stats = SessionStats::new();
        for _ in 0..3 {
            stats.record_admitted(&alert(Severity::High, "10.0.0.5", 22));
        }
        stats.record_admitted(&alert(Severity::Low, "10.0.0.9", 443));

        let report = stats.report();
        assert_eq!(report.top_source_ips[0], ("10.0.0.5".to_string(), 3));
        assert_eq!(report.top_source_ips[1], ("10.0.0.9".to_string(), 1));
        assert_eq!(report.top_target_ports[0], (22, 3));
    }

    #[test]
    fn test_top_talkers_truncated_to_five() {
        let mut stats = SessionStats::new();
        for i in 0..10u16 {
            stats.record_admitted(&alert(Severity::Info, &format!("10.0.0.{i}"), 8000 + i));
        }
        let report = stats.report();
        assert_eq!(report.top_source_ips.len(), 5);
        assert_eq!(report.top_target_ports.len(), 5);
    }

    #[test]
    fn test_tally_maps_are_bounded() {
        let mut stats = SessionStats::new();
        for i in 0..(MAX_TRACKED_KEYS + 50) {
            stats.record_admitted(&alert(
                Severity::Info,
                &format!("192.168.{}.{}", i / 256, i % 256),
                80,
            ));
        }
        assert!(stats.source_ips.len() <= MAX_TRACKED_KEYS);
        // Known keys still count past the bound
        assert_eq!(stats.target_ports[&80], (MAX_TRACKED_KEYS + 50) as u64);
    }

    #[test]
    fn test_gave_up_is_sticky() {
        let mut stats = SessionStats::new();
        stats.mark_gave_up();
        stats.record_received();
        assert!(stats.gave_up());
        assert!(stats.report().gave_up);
    }
}
