//! Bounded, severity-partitioned notification store.
//!
//! Notifications are kept most-recent-first. Admission inserts at the head
//! and then applies the eviction policy: each severity tier is capped
//! independently (critical 3, high 5, medium+low combined 3, info uncapped
//! per-tier), then a global cap trims the oldest entries across all tiers,
//! sparing critical entries. Eviction always removes the oldest entries
//! within the affected tier, never the newest.
//!
//! Counts are recomputed from ground truth at the end of every mutation
//! and returned synchronously; nothing in the engine keeps a running
//! counter that could drift.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vigil_core::{Alert, Severity, Signature};

/// Per-tier caps for visible notifications.
#[derive(Debug, Clone, Copy)]
pub struct TierCaps {
    /// Maximum visible critical notifications
    pub critical: usize,
    /// Maximum visible high notifications
    pub high: usize,
    /// Maximum visible medium+low notifications combined
    pub standard: usize,
    /// Overall cap; critical entries are spared when trimming to it
    pub max_visible: usize,
}

impl Default for TierCaps {
    fn default() -> Self {
        Self {
            critical: 3,
            high: 5,
            standard: 3,
            max_visible: 5,
        }
    }
}

impl TierCaps {
    /// Build caps from the engine section of the config file.
    pub fn from_config(config: &vigil_config::EngineConfig) -> Self {
        Self {
            critical: config.critical_cap,
            high: config.high_cap,
            standard: config.standard_cap,
            max_visible: config.max_visible,
        }
    }
}

/// The visible, deduplicated representation of one or more alerts sharing
/// a signature.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Store-assigned id, unique per engine instance
    pub id: u64,
    /// Upstream id of the first alert merged into this notification; used
    /// for acknowledge/resolve calls against the alerts API
    pub alert_id: String,
    /// Dedup signature
    pub signature: Signature,
    /// Severity level
    pub level: Severity,
    /// Alert title
    pub title: String,
    /// Alert message
    pub message: String,
    /// Source IP, when known
    pub source_ip: Option<String>,
    /// Targeted port, when known
    pub target_port: Option<u16>,
    /// When this notification was created
    pub created_at: DateTime<Utc>,
    /// Last time a repeat refreshed it
    pub refreshed_at: DateTime<Utc>,
    /// Whether it is removed automatically after the visibility window;
    /// true iff the level is not critical
    pub auto_hide: bool,
    /// Whether an operator has acknowledged it
    pub acknowledged: bool,
}

/// Counts recomputed from the store after every mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    /// Total visible notifications
    pub total: usize,
    /// Visible notifications not yet acknowledged
    pub unacknowledged: usize,
    /// Visible critical notifications
    pub critical: usize,
    /// Visible high notifications
    pub high: usize,
    /// Visible medium+low notifications
    pub standard: usize,
    /// Visible info notifications
    pub info: usize,
}

/// Result of admitting a notification.
#[derive(Debug)]
pub struct AdmitOutcome {
    /// Id of the new notification
    pub id: u64,
    /// Notifications evicted to make room, including any same-signature
    /// survivor that was replaced; the caller cleans up their timers and
    /// throttle entries
    pub evicted: Vec<Notification>,
    /// Counts after the mutation
    pub counts: StoreCounts,
}

/// The bounded notification collection, most-recent-first.
#[derive(Debug, Default)]
pub struct NotificationStore {
    items: Vec<Notification>,
    next_id: u64,
    caps: TierCaps,
}

impl NotificationStore {
    /// Create a store with the given tier caps.
    pub fn new(caps: TierCaps) -> Self {
        Self {
            items: Vec::new(),
            next_id: 0,
            caps,
        }
    }

    /// Admit a notification derived from `alert`, inserting at the head
    /// and applying the eviction policy.
    ///
    /// Any live notification with the same signature is replaced (and
    /// returned among the evicted), upholding the one-per-signature
    /// invariant even when a throttle entry expired under a still-visible
    /// notification.
    pub fn admit(&mut self, alert: &Alert, signature: Signature) -> AdmitOutcome {
        let mut evicted = Vec::new();

        if let Some(pos) = self.items.iter().position(|n| n.signature == signature) {
            evicted.push(self.items.remove(pos));
        }

        self.next_id += 1;
        let id = self.next_id;
        let now = Utc::now();
        self.items.insert(
            0,
            Notification {
                id,
                alert_id: alert.id.clone(),
                signature,
                level: alert.level,
                title: alert.title.clone(),
                message: alert.message.clone(),
                source_ip: alert.source_ip.clone(),
                target_port: alert.target_port,
                created_at: now,
                refreshed_at: now,
                auto_hide: alert.level.auto_hides(),
                acknowledged: false,
            },
        );

        self.evict_tier(Severity::Critical, &mut evicted);
        self.evict_tier(Severity::High, &mut evicted);
        self.evict_tier(Severity::Medium, &mut evicted);
        self.evict_global(&mut evicted);

        AdmitOutcome {
            id,
            evicted,
            counts: self.counts(),
        }
    }

    /// Refresh a notification's timestamp. Does not reorder and does not
    /// re-trigger eviction.
    pub fn refresh(&mut self, id: u64, at: DateTime<Utc>) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.refreshed_at = at;
                true
            }
            None => false,
        }
    }

    /// Mark a notification acknowledged. It stays in the store until
    /// explicitly removed; transient surfaces drop it on their own.
    pub fn acknowledge(&mut self, id: u64) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.acknowledged = true;
                n.refreshed_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Remove a notification by id.
    pub fn remove(&mut self, id: u64) -> Option<Notification> {
        let pos = self.items.iter().position(|n| n.id == id)?;
        Some(self.items.remove(pos))
    }

    /// Remove every notification matching the predicate, returning them
    /// oldest-last (display order preserved).
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<Notification>
    where
        F: FnMut(&Notification) -> bool,
    {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.items.len() {
            if predicate(&self.items[i]) {
                removed.push(self.items.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Drain the entire store.
    pub fn clear(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.items)
    }

    /// Look up a notification by id.
    pub fn get(&self, id: u64) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    /// Visible notifications in display order, most recent first.
    pub fn visible(&self) -> &[Notification] {
        &self.items
    }

    /// Notifications sorted by severity (critical first), unacknowledged
    /// before acknowledged, then most recent first.
    pub fn list_by_severity(&self) -> Vec<&Notification> {
        let mut list: Vec<_> = self.items.iter().collect();
        list.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then(a.acknowledged.cmp(&b.acknowledged))
                .then(b.created_at.cmp(&a.created_at))
        });
        list
    }

    /// Recompute counts from the current contents.
    pub fn counts(&self) -> StoreCounts {
        let mut counts = StoreCounts::default();
        for n in &self.items {
            counts.total += 1;
            if !n.acknowledged {
                counts.unacknowledged += 1;
            }
            match n.level {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium | Severity::Low => counts.standard += 1,
                Severity::Info => counts.info += 1,
            }
        }
        counts
    }

    /// Number of visible notifications.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn tier_cap(&self, level: Severity) -> Option<usize> {
        match level {
            Severity::Critical => Some(self.caps.critical),
            Severity::High => Some(self.caps.high),
            Severity::Medium | Severity::Low => Some(self.caps.standard),
            Severity::Info => None,
        }
    }

    fn in_tier(level: Severity, tier: Severity) -> bool {
        match tier {
            Severity::Medium | Severity::Low => level.is_standard_tier(),
            other => level == other,
        }
    }

    /// Trim a tier to its cap, removing oldest entries first.
    fn evict_tier(&mut self, tier: Severity, evicted: &mut Vec<Notification>) {
        let Some(cap) = self.tier_cap(tier) else {
            return;
        };
        loop {
            let count = self
                .items
                .iter()
                .filter(|n| Self::in_tier(n.level, tier))
                .count();
            if count <= cap {
                return;
            }
            // Oldest entry in the tier sits closest to the tail.
            let Some(pos) = self
                .items
                .iter()
                .rposition(|n| Self::in_tier(n.level, tier))
            else {
                return;
            };
            evicted.push(self.items.remove(pos));
        }
    }

    /// Trim to the global cap, evicting the oldest non-critical entries.
    /// Critical entries are bounded by their own tier cap instead.
    fn evict_global(&mut self, evicted: &mut Vec<Notification>) {
        while self.items.len() > self.caps.max_visible {
            let Some(pos) = self.items.iter().rposition(|n| !n.level.is_critical()) else {
                return;
            };
            evicted.push(self.items.remove(pos));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str, title: &str, level: Severity) -> Alert {
        Alert {
            id: id.into(),
            title: title.into(),
            message: "test".into(),
            level,
            source_ip: Some("10.0.0.5".into()),
            target_port: Some(22),
            attack_type: None,
            received_at: Utc::now(),
        }
    }

    fn admit(store: &mut NotificationStore, id: &str, title: &str, level: Severity) -> AdmitOutcome {
        let a = alert(id, title, level);
        let sig = a.signature().unwrap();
        store.admit(&a, sig)
    }

    #[test]
    fn test_admit_inserts_at_head() {
        let mut store = NotificationStore::new(TierCaps::default());
        admit(&mut store, "a", "First", Severity::High);
        admit(&mut store, "b", "Second", Severity::High);

        let visible = store.visible();
        assert_eq!(visible[0].title, "Second");
        assert_eq!(visible[1].title, "First");
    }

    #[test]
    fn test_critical_tier_evicts_oldest() {
        let mut store = NotificationStore::new(TierCaps::default());
        admit(&mut store, "a", "A", Severity::Critical);
        admit(&mut store, "b", "B", Severity::Critical);
        admit(&mut store, "c", "C", Severity::Critical);
        let outcome = admit(&mut store, "d", "D", Severity::Critical);

        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].title, "A");
        let titles: Vec<_> = store.visible().iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["D", "C", "B"]);
    }

    #[test]
    fn test_standard_tier_is_combined() {
        let mut store = NotificationStore::new(TierCaps::default());
        admit(&mut store, "a", "A", Severity::Medium);
        admit(&mut store, "b", "B", Severity::Low);
        admit(&mut store, "c", "C", Severity::Medium);
        let outcome = admit(&mut store, "d", "D", Severity::Low);

        // Medium and low share one tier capped at 3
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].title, "A");
        assert_eq!(store.counts().standard, 3);
    }

    #[test]
    fn test_global_cap_spares_critical() {
        let mut store = NotificationStore::new(TierCaps::default());
        admit(&mut store, "c1", "C1", Severity::Critical);
        admit(&mut store, "c2", "C2", Severity::Critical);
        admit(&mut store, "c3", "C3", Severity::Critical);
        admit(&mut store, "h1", "H1", Severity::High);
        admit(&mut store, "h2", "H2", Severity::High);
        let outcome = admit(&mut store, "h3", "H3", Severity::High);

        // Six entries against a global cap of five: the oldest
        // non-critical entry goes, every critical survives
        assert_eq!(store.len(), 5);
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].title, "H1");
        assert_eq!(store.counts().critical, 3);
    }

    #[test]
    fn test_tier_caps_never_exceeded_across_sequences() {
        let mut store = NotificationStore::new(TierCaps::default());
        let levels = [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ];
        for i in 0..40 {
            let level = levels[i % levels.len()];
            admit(&mut store, &format!("a{i}"), &format!("T{i}"), level);
            let counts = store.counts();
            assert!(counts.critical <= 3, "critical tier exceeded at {i}");
            assert!(counts.high <= 5, "high tier exceeded at {i}");
            assert!(counts.standard <= 3, "standard tier exceeded at {i}");
        }
    }

    #[test]
    fn test_same_signature_is_replaced_not_duplicated() {
        let mut store = NotificationStore::new(TierCaps::default());
        let first = admit(&mut store, "a1", "SSH Brute Force", Severity::Critical);
        let second = admit(&mut store, "a2", "SSH Brute Force", Severity::Critical);

        assert_eq!(store.len(), 1);
        assert_ne!(first.id, second.id);
        assert_eq!(second.evicted.len(), 1);
        assert_eq!(second.evicted[0].id, first.id);
    }

    #[test]
    fn test_refresh_updates_timestamp_only() {
        let mut store = NotificationStore::new(TierCaps::default());
        admit(&mut store, "a", "A", Severity::High);
        let id2 = admit(&mut store, "b", "B", Severity::High).id;
        let id1 = store.visible()[1].id;

        let later = Utc::now() + chrono::Duration::seconds(5);
        assert!(store.refresh(id1, later));
        assert_eq!(store.get(id1).unwrap().refreshed_at, later);
        // Order is unchanged: B is still at the head
        assert_eq!(store.visible()[0].id, id2);
        // Refreshing a missing id is a no-op
        assert!(!store.refresh(9999, later));
    }

    #[test]
    fn test_acknowledge_keeps_notification() {
        let mut store = NotificationStore::new(TierCaps::default());
        let id = admit(&mut store, "a", "A", Severity::Critical).id;

        assert!(store.acknowledge(id));
        assert_eq!(store.len(), 1);
        assert!(store.get(id).unwrap().acknowledged);

        let counts = store.counts();
        assert_eq!(counts.total, 1);
        assert_eq!(counts.unacknowledged, 0);
    }

    #[test]
    fn test_remove_where() {
        let mut store = NotificationStore::new(TierCaps::default());
        admit(&mut store, "a", "A", Severity::Critical);
        admit(&mut store, "b", "B", Severity::High);
        admit(&mut store, "c", "C", Severity::High);

        let removed = store.remove_where(|n| n.level == Severity::High);
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.visible()[0].level, Severity::Critical);
    }

    #[test]
    fn test_auto_hide_flag_follows_level() {
        let mut store = NotificationStore::new(TierCaps::default());
        let critical = admit(&mut store, "a", "A", Severity::Critical).id;
        let high = admit(&mut store, "b", "B", Severity::High).id;

        assert!(!store.get(critical).unwrap().auto_hide);
        assert!(store.get(high).unwrap().auto_hide);
    }

    #[test]
    fn test_list_by_severity_orders_critical_first() {
        let mut store = NotificationStore::new(TierCaps::default());
        admit(&mut store, "a", "A", Severity::Low);
        admit(&mut store, "b", "B", Severity::Critical);
        admit(&mut store, "c", "C", Severity::High);

        let list = store.list_by_severity();
        assert_eq!(list[0].level, Severity::Critical);
        assert_eq!(list[1].level, Severity::High);
        assert_eq!(list[2].level, Severity::Low);
    }

    #[test]
    fn test_clear_drains_everything() {
        let mut store = NotificationStore::new(TierCaps::default());
        admit(&mut store, "a", "A", Severity::High);
        admit(&mut store, "b", "B", Severity::Info);

        let drained = store.clear();
        assert_eq!(drained.len(), 2);
        assert!(store.is_empty());
        assert_eq!(store.counts(), StoreCounts::default());
    }
}
