//! Connectivity state machine.
//!
//! Owns the single source of truth for the current connectivity state and
//! its transition context. Transitions are serialized by the orchestrator;
//! this type itself performs one transition at a time and fans the resulting
//! event out to the plugin registry.
//!
//! Transitions are caller-driven: any state may move to any other. The only
//! enforced rules are no-op-on-equal-state and the per-state required-field
//! checks.

use crate::plugins::PluginRegistry;
use netwarden_common::{ConnectivityState, Database, StateContext, WardenError};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

pub type ObserverCallback = Box<dyn Fn(ConnectivityState, &StateContext) + Send + Sync>;

/// Read-only view of the machine, shared with other components.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub current: ConnectivityState,
    pub previous: ConnectivityState,
    pub context: StateContext,
}

/// Cheap handle for reading the current snapshot from any thread.
#[derive(Clone)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Snapshot>>,
}

impl SnapshotHandle {
    pub fn current(&self) -> ConnectivityState {
        self.inner.read().unwrap().current
    }

    pub fn previous(&self) -> ConnectivityState {
        self.inner.read().unwrap().previous
    }

    pub fn context(&self) -> StateContext {
        self.inner.read().unwrap().context.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().unwrap().clone()
    }
}

pub struct StateMachine {
    snapshot: Arc<RwLock<Snapshot>>,
    registry: Arc<PluginRegistry>,
    db: Database,
    observer: Option<ObserverCallback>,
}

impl StateMachine {
    pub fn new(registry: Arc<PluginRegistry>, db: Database, observer: Option<ObserverCallback>) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Snapshot {
                current: ConnectivityState::WaitingForNetwork,
                previous: ConnectivityState::WaitingForNetwork,
                context: StateContext::default(),
            })),
            registry,
            db,
            observer,
        }
    }

    pub fn handle(&self) -> SnapshotHandle {
        SnapshotHandle {
            inner: Arc::clone(&self.snapshot),
        }
    }

    pub fn current(&self) -> ConnectivityState {
        self.snapshot.read().unwrap().current
    }

    /// Request a transition. Equal-state requests are guaranteed no-ops with
    /// no observer notification and no fan-out. Requests that fail their
    /// required-field checks are rejected before any side effect.
    pub fn apply(&self, new_state: ConnectivityState, context: StateContext) -> Result<(), WardenError> {
        let previous = {
            let snapshot = self.snapshot.read().unwrap();
            if snapshot.current == new_state {
                debug!("State unchanged: {new_state}");
                return Ok(());
            }
            snapshot.current
        };

        if new_state.requires_mac() && context.mac.is_empty() {
            return Err(WardenError::Validation(format!(
                "{new_state} requires a mac address in the transition context"
            )));
        }
        if new_state == ConnectivityState::PerformAction {
            return self.perform_action(previous, context);
        }

        self.commit(new_state, context.clone());
        info!("State transition: {previous} -> {new_state}");

        match new_state {
            ConnectivityState::WaitingForNetwork => self.registry.on_waiting_for_network(),
            ConnectivityState::Disconnected => self.registry.on_disconnected(),
            ConnectivityState::Reconnecting => self.registry.on_reconnecting(),
            ConnectivityState::Connecting => self.registry.on_connecting(),
            ConnectivityState::ConnectedKnown => self.registry.on_connected_known(&context.mac),
            ConnectivityState::ConnectedHome => self.registry.on_connected_home(&context.mac),
            ConnectivityState::ConnectedNew => self.registry.on_connected_new(&context.mac),
            ConnectivityState::ConnectedBlacklisted => {
                self.registry.on_connected_blacklisted(&context.mac)
            }
            ConnectivityState::ScanningInProgress => self.registry.on_scanning_in_progress(),
            ConnectivityState::ScanCompleted => self.registry.on_scan_completed(),
            ConnectivityState::PerformAction => unreachable!("handled above"),
        }
        Ok(())
    }

    /// PERFORM_ACTION skips the per-state fan-out. The named plugin and the
    /// referenced network id are verified first; the action itself runs on
    /// an independent thread that is never joined, with an audit row in
    /// plugin_logs so unawaited executions stay observable.
    fn perform_action(&self, previous: ConnectivityState, context: StateContext) -> Result<(), WardenError> {
        let args = &context.perform_action_data;
        let plugin_name = args
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                WardenError::Validation(
                    "perform_action expects a plugin name in perform_action_data[0]".to_string(),
                )
            })?
            .to_string();
        let network_id = args
            .get(1)
            .and_then(|v| {
                v.as_i64()
                    .or_else(|| v.as_str().and_then(|s| s.parse::<i64>().ok()))
            })
            .ok_or_else(|| {
                WardenError::Validation(
                    "perform_action expects a network id in perform_action_data[1]".to_string(),
                )
            })?;

        if self.registry.get_by_name(&plugin_name).is_none() {
            return Err(WardenError::UnknownPlugin(plugin_name));
        }
        if !self.db.network_id_exists(network_id)? {
            return Err(WardenError::UnknownNetwork(network_id));
        }

        self.commit(ConnectivityState::PerformAction, context.clone());
        info!("State transition: {previous} -> PERFORM_ACTION ({plugin_name})");
        self.db.log_plugin_event(
            &plugin_name,
            &format!("perform_action dispatched (network_id={network_id})"),
        )?;

        let registry = Arc::clone(&self.registry);
        let args = context.perform_action_data;
        std::thread::spawn(move || {
            registry.perform_action(&args);
        });
        Ok(())
    }

    fn commit(&self, new_state: ConnectivityState, context: StateContext) {
        {
            let mut snapshot = self.snapshot.write().unwrap();
            snapshot.previous = snapshot.current;
            snapshot.current = new_state;
            snapshot.context = context;
        }
        if let Some(observer) = &self.observer {
            let snapshot = self.snapshot.read().unwrap();
            observer(snapshot.current, &snapshot.context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::Plugin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

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
        fn on_disconnected(&self) {
            self.events.lock().unwrap().push("disconnected".to_string());
        }
        fn on_connected_blacklisted(&self, mac: &str) {
            self.events.lock().unwrap().push(format!("blacklisted:{mac}"));
        }
        fn perform_action(&self, args: &[serde_json::Value]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("action:{}", args[0].as_str().unwrap_or("?")));
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        machine: StateMachine,
        events: Arc<Mutex<Vec<String>>>,
        observed: Arc<AtomicUsize>,
        db: Database,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("state.db"));
        db.init().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(PluginRegistry::with_plugins(vec![(
            Box::new(Recorder {
                events: events.clone(),
            }) as Box<dyn Plugin>,
            true,
            vec![],
        )]));
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();
        let observer: ObserverCallback = Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        Fixture {
            _dir: dir,
            machine: StateMachine::new(registry, db.clone(), Some(observer)),
            events,
            observed,
            db,
        }
    }

    #[test]
    fn repeated_identical_update_notifies_exactly_once() {
        let fx = fixture();
        fx.machine
            .apply(ConnectivityState::Disconnected, StateContext::default())
            .unwrap();
        fx.machine
            .apply(ConnectivityState::Disconnected, StateContext::default())
            .unwrap();

        assert_eq!(fx.observed.load(Ordering::SeqCst), 1);
        assert_eq!(fx.events.lock().unwrap().clone(), vec!["disconnected".to_string()]);
        assert_eq!(fx.machine.current(), ConnectivityState::Disconnected);
    }

    #[test]
    fn previous_state_tracks_the_last_transition() {
        let fx = fixture();
        fx.machine
            .apply(ConnectivityState::Connecting, StateContext::default())
            .unwrap();
        fx.machine
            .apply(ConnectivityState::Disconnected, StateContext::default())
            .unwrap();
        let snapshot = fx.machine.handle().snapshot();
        assert_eq!(snapshot.current, ConnectivityState::Disconnected);
        assert_eq!(snapshot.previous, ConnectivityState::Connecting);
    }

    #[test]
    fn connected_states_require_a_mac() {
        let fx = fixture();
        for state in [
            ConnectivityState::ConnectedBlacklisted,
            ConnectivityState::ConnectedHome,
            ConnectivityState::ConnectedNew,
            ConnectivityState::ConnectedKnown,
        ] {
            let err = fx.machine.apply(state, StateContext::default()).unwrap_err();
            assert!(matches!(err, WardenError::Validation(_)), "{state} must require a mac");
        }
        // The rejected requests had no side effects.
        assert_eq!(fx.observed.load(Ordering::SeqCst), 0);
        assert_eq!(fx.machine.current(), ConnectivityState::WaitingForNetwork);

        fx.machine
            .apply(
                ConnectivityState::ConnectedBlacklisted,
                StateContext::with_mac("DE:AD:BE:EF:00:01"),
            )
            .unwrap();
        assert_eq!(
            fx.events.lock().unwrap().clone(),
            vec!["blacklisted:DE:AD:BE:EF:00:01".to_string()]
        );
    }

    #[test]
    fn perform_action_rejects_unknown_plugin_and_network() {
        let fx = fixture();
        let network_id = fx.db.upsert_network("AA:BB:CC:DD:EE:FF", false, false).unwrap();

        let err = fx
            .machine
            .apply(
                ConnectivityState::PerformAction,
                StateContext::for_action(vec![serde_json::json!("NoSuchPlugin"), serde_json::json!(network_id)]),
            )
            .unwrap_err();
        assert!(matches!(err, WardenError::UnknownPlugin(_)));

        let err = fx
            .machine
            .apply(
                ConnectivityState::PerformAction,
                StateContext::for_action(vec![serde_json::json!("Recorder"), serde_json::json!(99999)]),
            )
            .unwrap_err();
        assert!(matches!(err, WardenError::UnknownNetwork(99999)));

        // Nothing executed, nothing audited.
        assert!(fx.events.lock().unwrap().iter().all(|e| !e.starts_with("action")));
        assert_eq!(fx.db.plugin_log_count("Recorder").unwrap(), 0);
    }

    #[test]
    fn perform_action_dispatches_in_background_with_audit_row() {
        let fx = fixture();
        let network_id = fx.db.upsert_network("AA:BB:CC:DD:EE:FF", false, false).unwrap();

        fx.machine
            .apply(
                ConnectivityState::PerformAction,
                StateContext::for_action(vec![serde_json::json!("Recorder"), serde_json::json!(network_id)]),
            )
            .unwrap();

        // Audit row is written synchronously, before dispatch.
        assert_eq!(fx.db.plugin_log_count("Recorder").unwrap(), 1);

        // The action itself runs on an untracked thread; wait for it.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if fx
                .events
                .lock()
                .unwrap()
                .contains(&"action:Recorder".to_string())
            {
                break;
            }
            assert!(Instant::now() < deadline, "perform_action never ran");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(fx.machine.current(), ConnectivityState::PerformAction);
    }
}
