//! End-to-end orchestration tests: transitions, trigger ticks and shutdown
//! through the real loop thread, backed by a real on-disk database.

use netwarden_common::{
    AlertCategory, AlertLevel, ConnectivityState, Database, StateContext,
};
use netwardend::alerts::{AlertManager, AlertRequest};
use netwardend::config::Config;
use netwardend::network::{LinkMonitor, NetworkEvents};
use netwardend::orchestrator::Orchestrator;
use netwardend::plugins::{Plugin, PluginRegistry};
use netwardend::state_machine::StateMachine;
use netwardend::triggers::{Trigger, TriggerSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Plugin for Recorder {
    fn name(&self) -> &str {
        "Recorder"
    }

    fn on_setup(&self) {}
    fn on_enable(&self) {}
    fn on_disable(&self) {}

    fn on_connecting(&self) {
        self.events.lock().unwrap().push("connecting".to_string());
    }

    fn on_connected_new(&self, mac: &str) {
        self.events.lock().unwrap().push(format!("connected_new {mac}"));
    }

    fn on_disconnected(&self) {
        self.events.lock().unwrap().push("disconnected".to_string());
    }

    fn on_scanning_in_progress(&self) {
        self.events.lock().unwrap().push("scanning".to_string());
    }
}

fn test_db(dir: &TempDir) -> Database {
    let db = Database::new(dir.path().join("warden.db"));
    db.init().unwrap();
    db
}

fn recording_registry() -> (Arc<PluginRegistry>, Arc<Mutex<Vec<String>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let registry = PluginRegistry::with_plugins(vec![(
        Box::new(Recorder {
            events: Arc::clone(&events),
        }) as Box<dyn Plugin>,
        true,
        Vec::new(),
    )]);
    (Arc::new(registry), events)
}

#[test]
fn transitions_are_processed_in_submission_order() {
    let dir = TempDir::new().unwrap();
    let db = test_db(&dir);
    let (registry, events) = recording_registry();

    let machine = StateMachine::new(registry, db, None);
    let orchestrator =
        Orchestrator::spawn(machine, TriggerSet::new(), Duration::from_secs(60)).unwrap();
    let sender = orchestrator.sender();

    // Queue without waiting, then wait on the last one. The loop drains the
    // channel in order, so observing the last implies all the others ran.
    sender.submit(ConnectivityState::Connecting, StateContext::default());
    sender.submit(
        ConnectivityState::ConnectedNew,
        StateContext::with_mac("AA:BB:CC:DD:EE:FF"),
    );
    sender.submit(ConnectivityState::ScanningInProgress, StateContext::default());
    sender
        .update_state(ConnectivityState::Disconnected, StateContext::default())
        .unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "connecting",
            "connected_new AA:BB:CC:DD:EE:FF",
            "scanning",
            "disconnected",
        ]
    );
    assert_eq!(
        orchestrator.snapshots().current(),
        ConnectivityState::Disconnected
    );
    orchestrator.shutdown();
}

#[test]
fn repeated_state_is_not_fanned_out_twice() {
    let dir = TempDir::new().unwrap();
    let db = test_db(&dir);
    let (registry, events) = recording_registry();

    let machine = StateMachine::new(registry, db, None);
    let orchestrator =
        Orchestrator::spawn(machine, TriggerSet::new(), Duration::from_secs(60)).unwrap();
    let sender = orchestrator.sender();

    sender
        .update_state(ConnectivityState::Connecting, StateContext::default())
        .unwrap();
    sender
        .update_state(ConnectivityState::Connecting, StateContext::default())
        .unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["connecting"]);
    orchestrator.shutdown();
}

#[test]
fn rejected_transition_reports_back_and_leaves_state_alone() {
    let dir = TempDir::new().unwrap();
    let db = test_db(&dir);
    let (registry, _events) = recording_registry();

    let machine = StateMachine::new(registry.clone(), db, None);
    let orchestrator =
        Orchestrator::spawn(machine, TriggerSet::new(), Duration::from_secs(60)).unwrap();
    let sender = orchestrator.sender();

    let err = sender
        .update_state(ConnectivityState::ConnectedHome, StateContext::default())
        .unwrap_err();
    assert!(err.to_string().contains("mac address"));
    assert_eq!(
        orchestrator.snapshots().current(),
        ConnectivityState::WaitingForNetwork
    );
    orchestrator.shutdown();
}

#[test]
fn trigger_tick_raises_one_deduplicated_alert() {
    let dir = TempDir::new().unwrap();
    let db = test_db(&dir);
    let (registry, _events) = recording_registry();
    let alerts = AlertManager::new(db.clone(), registry.clone(), None);

    let fired = Arc::new(AtomicUsize::new(0));
    let mut triggers = TriggerSet::new();
    {
        let manager = alerts.clone();
        let fired = Arc::clone(&fired);
        triggers.add(Trigger::new(
            "AlwaysOn",
            || async { Ok(true) },
            move || {
                let manager = manager.clone();
                fired.fetch_add(1, Ordering::SeqCst);
                async move {
                    manager.raise(
                        AlertRequest::new(
                            AlertCategory::General,
                            AlertLevel::Warning,
                            "Condition persists",
                        )
                        .deduplicated(),
                    )?;
                    Ok(())
                }
            },
        ));
    }

    let machine = StateMachine::new(registry, db.clone(), None);
    let orchestrator =
        Orchestrator::spawn(machine, triggers, Duration::from_millis(20)).unwrap();

    // Wait for several ticks.
    let deadline = Instant::now() + Duration::from_secs(5);
    while fired.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(fired.load(Ordering::SeqCst) >= 3, "trigger never fired");

    // Every tick re-raised, but deduplication kept it to a single row.
    let open = alerts.get_alerts(None, true, false, false).unwrap();
    let matching: Vec<_> = open
        .iter()
        .filter(|a| a.message == "Condition persists")
        .collect();
    assert_eq!(matching.len(), 1);
    orchestrator.shutdown();
}

#[test]
fn link_monitor_drives_transitions_at_runtime() {
    let dir = TempDir::new().unwrap();
    let db = test_db(&dir);
    let (registry, _events) = recording_registry();
    let alerts = AlertManager::new(db.clone(), registry.clone(), None);

    // A fake sysfs tree the monitor samples instead of /sys/class/net.
    let iface_dir = dir.path().join("net").join("test0");
    std::fs::create_dir_all(&iface_dir).unwrap();
    std::fs::write(iface_dir.join("operstate"), "up\n").unwrap();
    std::fs::write(iface_dir.join("carrier"), "1\n").unwrap();

    let machine = StateMachine::new(registry, db.clone(), None);
    let orchestrator =
        Orchestrator::spawn(machine, TriggerSet::new(), Duration::from_secs(60)).unwrap();
    let snapshots = orchestrator.snapshots();

    let config = Config::default();
    let events = NetworkEvents::new(&config, db, alerts, orchestrator.sender());
    let monitor = LinkMonitor::new(events, vec!["test0".to_string()])
        .sysfs_root(dir.path().join("net"))
        .poll_interval(Duration::from_millis(20))
        .spawn()
        .unwrap();

    let wait_for = |expected: ConnectivityState| {
        let deadline = Instant::now() + Duration::from_secs(5);
        while snapshots.current() != expected {
            assert!(
                Instant::now() < deadline,
                "never reached {expected}, still {}",
                snapshots.current()
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    };

    // The monitor primed on an up link, so pulling it must disconnect.
    std::fs::write(iface_dir.join("operstate"), "down\n").unwrap();
    std::fs::write(iface_dir.join("carrier"), "0\n").unwrap();
    wait_for(ConnectivityState::Disconnected);

    // Carrier back without an established link reads as a cable insert.
    std::fs::write(iface_dir.join("carrier"), "1\n").unwrap();
    wait_for(ConnectivityState::Connecting);

    monitor.stop();
    orchestrator.shutdown();
}

#[test]
fn shutdown_stops_accepting_transitions() {
    let dir = TempDir::new().unwrap();
    let db = test_db(&dir);
    let (registry, _events) = recording_registry();

    let machine = StateMachine::new(registry, db, None);
    let orchestrator =
        Orchestrator::spawn(machine, TriggerSet::new(), Duration::from_secs(60)).unwrap();
    let sender = orchestrator.sender();

    sender
        .update_state(ConnectivityState::Connecting, StateContext::default())
        .unwrap();
    orchestrator.shutdown();

    assert!(sender
        .update_state(ConnectivityState::Disconnected, StateContext::default())
        .is_err());
}
