//! Cross-module engine scenarios.
//!
//! These tests drive the synchronous engine core through the same event
//! sequences the runtime would, under tokio's paused clock so window and
//! timer behavior is deterministic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use vigil_core::{Alert, Severity};
use vigil_engine::{
    AlertEngine, EngineRuntime, EventBus, RuntimeOptions, Silent, StaticGate, SurfaceEvent,
};

/// Bus that records everything published to it.
#[derive(Clone, Default)]
struct CollectBus {
    events: Arc<Mutex<Vec<SurfaceEvent>>>,
}

impl CollectBus {
    fn topics(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.topic()).collect()
    }
}

impl EventBus for CollectBus {
    fn publish(&self, event: SurfaceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn engine_with_bus() -> (AlertEngine, CollectBus) {
    let bus = CollectBus::default();
    let engine = AlertEngine::new(
        &vigil_config::VigilConfig::default(),
        Box::new(bus.clone()),
        Box::new(Silent),
    );
    (engine, bus)
}

fn alert(id: &str, title: &str, level: Severity) -> Alert {
    Alert {
        id: id.into(),
        title: title.into(),
        message: "m".into(),
        level,
        source_ip: Some("10.0.0.5".into()),
        target_port: Some(22),
        attack_type: None,
        received_at: Utc::now(),
    }
}


#[tokio::test(start_paused = true)]
async fn repeats_within_window_collapse_to_one_notification() {
    let (mut engine, bus) = engine_with_bus();

    // Three identical alerts within 1500 ms
    let first = engine
        .handle_alert(alert("a1", "SSH Brute Force", Severity::High))
        .unwrap();
    for (i, advance_ms) in [(2, 700u64), (3, 800u64)] {
        tokio::time::advance(Duration::from_millis(advance_ms)).await;
        let id = engine
            .handle_alert(alert(&format!("a{i}"), "SSH Brute Force", Severity::High))
            .unwrap();
        assert_eq!(id, first);
    }

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.counts.total, 1);
    assert_eq!(snapshot.stats.admitted, 1);
    assert_eq!(snapshot.stats.throttled, 2);
    // The surviving notification carries the latest arrival
    let n = &snapshot.notifications[0];
    assert!(n.refreshed_at >= n.created_at);

    // One admission broadcast, two refreshes
    let topics = bus.topics();
    assert_eq!(topics.iter().filter(|t| **t == "newAlert").count(), 1);
    assert_eq!(topics.iter().filter(|t| **t == "alertRefreshed").count(), 2);
}

#[tokio::test(start_paused = true)]
async fn retired_signature_creates_fresh_notification() {
    let (mut engine, _bus) = engine_with_bus();

    let first = engine
        .handle_alert(alert("a1", "SSH Brute Force", Severity::High))
        .unwrap();

    // A contiguous throttle window of silence retires the entry (and the
    // visibility window removes the notification)
    tokio::time::advance(Duration::from_millis(2001)).await;
    engine.fire_due_timers();
    assert_eq!(engine.snapshot().counts.total, 0);

    // A fourth identical alert afterwards is brand-new
    let fresh = engine
        .handle_alert(alert("a4", "SSH Brute Force", Severity::High))
        .unwrap();
    assert_ne!(first, fresh);
    assert_eq!(engine.snapshot().counts.total, 1);
}

#[tokio::test(start_paused = true)]
async fn critical_notifications_survive_until_dismissed() {
    let (mut engine, _bus) = engine_with_bus();

    engine
        .handle_alert(alert("a1", "Zero-day Attack", Severity::Critical))
        .unwrap();

    // Far beyond any window: the critical notification is still there,
    // only its throttle entry was retired
    tokio::time::advance(Duration::from_secs(3600)).await;
    engine.fire_due_timers();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.counts.critical, 1);

    // A repeat after retirement replaces it rather than duplicating
    engine
        .handle_alert(alert("a2", "Zero-day Attack", Severity::Critical))
        .unwrap();
    assert_eq!(engine.snapshot().counts.critical, 1);
}

#[tokio::test(start_paused = true)]
async fn four_critical_admissions_evict_the_oldest() {
    let (mut engine, _bus) = engine_with_bus();

    for (id, title) in [("a", "Attack A"), ("b", "Attack B"), ("c", "Attack C"), ("d", "Attack D")]
    {
        engine
            .handle_alert(alert(id, title, Severity::Critical))
            .unwrap();
    }

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.counts.critical, 3);
    let titles: Vec<_> = snapshot
        .notifications
        .iter()
        .map(|n| n.title.as_str())
        .collect();
    assert!(titles.contains(&"Attack B"));
    assert!(titles.contains(&"Attack C"));
    assert!(titles.contains(&"Attack D"));
    assert!(!titles.contains(&"Attack A"));
}

#[tokio::test(start_paused = true)]
async fn acknowledged_notification_outlives_its_cancelled_timer() {
    let (mut engine, _bus) = engine_with_bus();

    let id = engine
        .handle_alert(alert("a1", "Port Scan", Severity::Medium))
        .unwrap();

    engine.acknowledge_local(id);
    // Acknowledging again (and the implied second disarm) is a no-op
    engine.acknowledge_local(id);

    tokio::time::advance(Duration::from_secs(10)).await;
    engine.fire_due_timers();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.counts.total, 1);
    assert_eq!(snapshot.counts.unacknowledged, 0);
    assert!(snapshot.notifications[0].acknowledged);
}

#[tokio::test(start_paused = true)]
async fn bulk_dismiss_by_severity_recomputes_counter() {
    let (mut engine, bus) = engine_with_bus();

    engine.handle_alert(alert("c1", "Crit 1", Severity::Critical));
    engine.handle_alert(alert("c2", "Crit 2", Severity::Critical));
    engine.handle_alert(alert("h1", "High 1", Severity::High));
    engine.handle_alert(alert("h2", "High 2", Severity::High));
    engine.handle_alert(alert("h3", "High 3", Severity::High));

    let outcome = engine.dismiss_by_severity("console", Severity::Critical);

    assert_eq!(outcome.removed, 2);
    assert_eq!(outcome.counts.total, 3);
    assert_eq!(outcome.counts.unacknowledged, 3);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.counts.total, 3);
    assert!(snapshot.notifications.iter().all(|n| n.level == Severity::High));
    assert!(bus.topics().contains(&"closeAllAlerts"));
}

#[tokio::test(start_paused = true)]
async fn dismiss_all_leaves_no_pending_timers() {
    let (mut engine, _bus) = engine_with_bus();

    for i in 0..5 {
        engine.handle_alert(alert(
            &format!("a{i}"),
            &format!("Alert {i}"),
            if i % 2 == 0 { Severity::High } else { Severity::Low },
        ));
    }

    engine.dismiss_all("toast");

    tokio::time::advance(Duration::from_secs(60)).await;
    engine.fire_due_timers();
    assert_eq!(engine.snapshot().counts.total, 0);
    assert_eq!(engine.pending_timers(), 0);
}

#[tokio::test]
async fn offline_runtime_serves_commands_and_shuts_down() {
    let config = vigil_config::VigilConfig::default();
    let engine = AlertEngine::new(&config, Box::new(CollectBus::default()), Box::new(Silent));
    let (runtime, handle) = EngineRuntime::new(engine, RuntimeOptions::offline(), &StaticGate::allow());
    let join = runtime.spawn();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.counts.total, 0);
    assert!(!snapshot.stats.gave_up);

    // Commands against unknown ids are safe no-ops
    handle.acknowledge(12345).await.unwrap();
    handle.resolve(12345).await.unwrap();
    handle.dismiss_all("console").await.unwrap();
    handle.set_permission(false).await.unwrap();
    handle.set_permission(true).await.unwrap();

    handle.shutdown().await.unwrap();
    join.await.unwrap();

    // The runtime is gone; the handle reports it
    assert!(handle.snapshot().await.is_err());
}
