//! Capability handler (plugin) registry and event fan-out.
//!
//! Plugins come from a static constructor table split into two partitions:
//! default plugins (enabled unless configured off) and optional plugins
//! (disabled unless configured on). Each constructor receives its
//! partition's per-name settings plus the shared database handle.
//!
//! Fan-out calls every registered plugin in registration order, regardless
//! of enabled/disabled status. Plugins that must stay quiet while disabled
//! check their own flag.

pub mod arpscan;
pub mod debug;
pub mod pushover;

use crate::config::{Config, PluginSettings};
use netwarden_common::{Alert, Database, WardenError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// An externally-reachable endpoint a plugin wants registered. The core only
/// records these; the presentation layer mounts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: String,
    pub path: String,
}

/// The fixed capability interface every plugin implements.
///
/// Lifecycle hooks are mandatory; event hooks default to no-ops.
pub trait Plugin: Send + Sync {
    /// Unique plugin name. Lookups are case-insensitive.
    fn name(&self) -> &str;

    fn on_setup(&self);
    fn on_enable(&self);
    fn on_disable(&self);

    fn on_waiting_for_network(&self) {}
    fn on_connecting(&self) {}
    fn on_connected_known(&self, _mac: &str) {}
    fn on_connected_home(&self, _mac: &str) {}
    fn on_connected_new(&self, _mac: &str) {}
    fn on_connected_blacklisted(&self, _mac: &str) {}
    fn on_disconnected(&self) {}
    fn on_reconnecting(&self) {}
    fn on_scanning_in_progress(&self) {}
    fn on_scan_completed(&self) {}

    fn on_alerting(&self, _alert: &Alert) {}
    fn on_alert_resolved(&self, _alert: &Alert) {}
    fn on_alert_closed(&self, _alert: &Alert) {}

    /// Generic action entry point. `args[0]` names the plugin expected to
    /// act, so every plugin can decide whether the request is for it.
    fn perform_action(&self, _args: &[serde_json::Value]) {}

    /// Asked once at load time.
    fn routes(&self) -> Vec<RouteSpec> {
        Vec::new()
    }
}

type Constructor = fn(&PluginSettings, &Database) -> Box<dyn Plugin>;

fn default_partition() -> &'static [(&'static str, Constructor)] {
    &[("arpscan", arpscan::ArpScanPlugin::construct)]
}

fn optional_partition() -> &'static [(&'static str, Constructor)] {
    &[
        ("debug", debug::DebugPlugin::construct),
        ("pushover", pushover::PushoverPlugin::construct),
    ]
}

struct PluginEntry {
    enabled: AtomicBool,
    dependencies: Vec<String>,
    handler: Box<dyn Plugin>,
}

pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
    routes: Vec<(String, RouteSpec)>,
    dependency_errors: Mutex<Vec<String>>,
}

impl PluginRegistry {
    /// Build the registry from the static constructor tables, run `on_setup`
    /// for plugins configured enabled, collect routes, and apply the
    /// configured enable/disable status.
    pub fn load(config: &Config, db: &Database) -> Self {
        let mut registry = Self {
            entries: Vec::new(),
            routes: Vec::new(),
            dependency_errors: Mutex::new(Vec::new()),
        };

        for (key, ctor) in default_partition() {
            let settings = config.default_plugins.get(*key).cloned().unwrap_or_default();
            registry.register(ctor(&settings, db), settings.enabled.unwrap_or(true), settings.dependencies);
        }
        for (key, ctor) in optional_partition() {
            let settings = config.optional_plugins.get(*key).cloned().unwrap_or_default();
            registry.register(ctor(&settings, db), settings.enabled.unwrap_or(false), settings.dependencies);
        }

        registry.finish_load();
        registry
    }

    /// Build a registry from explicit plugin instances. Used by tests and by
    /// embedders that bring their own handlers.
    pub fn with_plugins(plugins: Vec<(Box<dyn Plugin>, bool, Vec<String>)>) -> Self {
        let mut registry = Self {
            entries: Vec::new(),
            routes: Vec::new(),
            dependency_errors: Mutex::new(Vec::new()),
        };
        for (handler, enabled, dependencies) in plugins {
            registry.register(handler, enabled, dependencies);
        }
        registry.finish_load();
        registry
    }

    fn register(&mut self, handler: Box<dyn Plugin>, enabled: bool, dependencies: Vec<String>) {
        info!("Loaded plugin {} (enabled={})", handler.name(), enabled);
        self.entries.push(PluginEntry {
            enabled: AtomicBool::new(enabled),
            dependencies,
            handler,
        });
    }

    fn finish_load(&mut self) {
        // Setup runs once, only for plugins currently configured enabled.
        for entry in &self.entries {
            if entry.enabled.load(Ordering::SeqCst) {
                entry.handler.on_setup();
            }
        }
        // Each plugin is asked exactly once for its routes.
        for entry in &self.entries {
            for route in entry.handler.routes() {
                self.routes.push((entry.handler.name().to_string(), route));
            }
        }
        // Apply configured status, satisfying dependencies along the way.
        let names: Vec<(String, bool)> = self
            .entries
            .iter()
            .map(|e| (e.handler.name().to_string(), e.enabled.load(Ordering::SeqCst)))
            .collect();
        for (name, enabled) in names {
            if enabled {
                self.enable(&name);
            } else {
                self.disable(&name);
            }
        }
    }

    fn find(&self, name: &str) -> Option<&PluginEntry> {
        self.entries
            .iter()
            .find(|e| e.handler.name().eq_ignore_ascii_case(name))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&dyn Plugin> {
        self.find(name).map(|e| e.handler.as_ref())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.find(name)
            .map(|e| e.enabled.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.handler.name().to_string()).collect()
    }

    /// Routes collected at load time, as `(plugin, route)`.
    pub fn registered_routes(&self) -> &[(String, RouteSpec)] {
        &self.routes
    }

    /// Dependency failures recorded so far. They never abort an enable.
    pub fn dependency_errors(&self) -> Vec<String> {
        self.dependency_errors.lock().unwrap().clone()
    }

    /// Enable a plugin by case-insensitive name. Declared dependencies are
    /// satisfied first; a broken dependency is recorded and logged, and the
    /// enable still proceeds.
    pub fn enable(&self, name: &str) -> bool {
        let Some(entry) = self.find(name) else {
            warn!("enable: no plugin named '{name}'");
            return false;
        };
        for descriptor in &entry.dependencies {
            if let Err(e) = self.satisfy_dependency(descriptor) {
                warn!("Dependency of {} not satisfied: {e}", entry.handler.name());
                self.dependency_errors.lock().unwrap().push(e.to_string());
            }
        }
        entry.handler.on_enable();
        entry.enabled.store(true, Ordering::SeqCst);
        true
    }

    pub fn disable(&self, name: &str) -> bool {
        let Some(entry) = self.find(name) else {
            warn!("disable: no plugin named '{name}'");
            return false;
        };
        entry.handler.on_disable();
        entry.enabled.store(false, Ordering::SeqCst);
        true
    }

    /// Resolve a dotted dependency descriptor: the last two segments name
    /// another plugin and a zero-argument lifecycle method on it.
    fn satisfy_dependency(&self, descriptor: &str) -> Result<(), WardenError> {
        let parts: Vec<&str> = descriptor.split('.').collect();
        if parts.len() < 2 {
            return Err(WardenError::DependencyUnsatisfied(format!(
                "invalid descriptor '{descriptor}'"
            )));
        }
        let plugin_name = parts[parts.len() - 2];
        let method = parts[parts.len() - 1];
        let entry = self.find(plugin_name).ok_or_else(|| {
            WardenError::DependencyUnsatisfied(format!("plugin '{plugin_name}' not found"))
        })?;
        match method {
            "on_setup" => entry.handler.on_setup(),
            "on_enable" => entry.handler.on_enable(),
            "on_disable" => entry.handler.on_disable(),
            other => {
                return Err(WardenError::DependencyUnsatisfied(format!(
                    "method '{other}' not found in plugin '{plugin_name}'"
                )))
            }
        }
        Ok(())
    }

    // ── Fan-out ─────────────────────────────────────────────────────────
    // Registration order, every plugin, enabled or not.

    pub fn on_waiting_for_network(&self) {
        for e in &self.entries {
            e.handler.on_waiting_for_network();
        }
    }

    pub fn on_connecting(&self) {
        for e in &self.entries {
            e.handler.on_connecting();
        }
    }

    pub fn on_connected_known(&self, mac: &str) {
        for e in &self.entries {
            e.handler.on_connected_known(mac);
        }
    }

    pub fn on_connected_home(&self, mac: &str) {
        for e in &self.entries {
            e.handler.on_connected_home(mac);
        }
    }

    pub fn on_connected_new(&self, mac: &str) {
        for e in &self.entries {
            e.handler.on_connected_new(mac);
        }
    }

    pub fn on_connected_blacklisted(&self, mac: &str) {
        for e in &self.entries {
            e.handler.on_connected_blacklisted(mac);
        }
    }

    pub fn on_disconnected(&self) {
        for e in &self.entries {
            e.handler.on_disconnected();
        }
    }

    pub fn on_reconnecting(&self) {
        for e in &self.entries {
            e.handler.on_reconnecting();
        }
    }

    pub fn on_scanning_in_progress(&self) {
        for e in &self.entries {
            e.handler.on_scanning_in_progress();
        }
    }

    pub fn on_scan_completed(&self) {
        for e in &self.entries {
            e.handler.on_scan_completed();
        }
    }

    pub fn on_alerting(&self, alert: &Alert) {
        for e in &self.entries {
            e.handler.on_alerting(alert);
        }
    }

    pub fn on_alert_resolved(&self, alert: &Alert) {
        for e in &self.entries {
            e.handler.on_alert_resolved(alert);
        }
    }

    pub fn on_alert_closed(&self, alert: &Alert) {
        for e in &self.entries {
            e.handler.on_alert_closed(alert);
        }
    }

    pub fn perform_action(&self, args: &[serde_json::Value]) {
        for e in &self.entries {
            e.handler.perform_action(args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Records every hook invocation for assertions.
    struct Recorder {
        name: String,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn boxed(name: &str, events: Arc<Mutex<Vec<String>>>) -> Box<dyn Plugin> {
            Box::new(Self {
                name: name.to_string(),
                events,
            })
        }

        fn record(&self, event: &str) {
            self.events.lock().unwrap().push(format!("{}:{}", self.name, event));
        }
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            &self.name
        }
        fn on_setup(&self) {
            self.record("setup");
        }
        fn on_enable(&self) {
            self.record("enable");
        }
        fn on_disable(&self) {
            self.record("disable");
        }
        fn on_disconnected(&self) {
            self.record("disconnected");
        }
        fn on_connected_new(&self, mac: &str) {
            self.record(&format!("connected_new[{mac}]"));
        }
        fn perform_action(&self, args: &[serde_json::Value]) {
            self.record(&format!("action[{}]", args.len()));
        }
    }

    fn events() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let ev = events();
        let registry = PluginRegistry::with_plugins(vec![(Recorder::boxed("ScanLab", ev.clone()), false, vec![])]);
        assert!(registry.get_by_name("scanlab").is_some());
        assert!(registry.get_by_name("SCANLAB").is_some());
        assert!(registry.get_by_name("other").is_none());
        assert!(registry.enable("sCaNlAb"));
        assert!(registry.is_enabled("scanlab"));
    }

    #[test]
    fn setup_runs_only_for_enabled_plugins() {
        let ev = events();
        let _registry = PluginRegistry::with_plugins(vec![
            (Recorder::boxed("on", ev.clone()), true, vec![]),
            (Recorder::boxed("off", ev.clone()), false, vec![]),
        ]);
        let log = ev.lock().unwrap().clone();
        assert!(log.contains(&"on:setup".to_string()));
        assert!(!log.contains(&"off:setup".to_string()));
        // enable applied for "on", disable applied for "off"
        assert!(log.contains(&"on:enable".to_string()));
        assert!(log.contains(&"off:disable".to_string()));
    }

    #[test]
    fn missing_dependency_is_recorded_but_enable_proceeds() {
        let ev = events();
        let registry = PluginRegistry::with_plugins(vec![(
            Recorder::boxed("PluginX", ev.clone()),
            false,
            vec!["plugins.optional.nonexistent.on_enable".to_string()],
        )]);
        assert!(registry.enable("pluginx"));
        assert!(registry.is_enabled("pluginx"));
        assert!(ev.lock().unwrap().contains(&"PluginX:enable".to_string()));
        let errors = registry.dependency_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("nonexistent"));
    }

    #[test]
    fn dependency_invokes_named_method_on_other_plugin() {
        let ev = events();
        let registry = PluginRegistry::with_plugins(vec![
            (Recorder::boxed("base", ev.clone()), false, vec![]),
            (
                Recorder::boxed("dependent", ev.clone()),
                false,
                vec!["plugins.defaults.base.on_enable".to_string()],
            ),
        ]);
        ev.lock().unwrap().clear();
        registry.enable("dependent");
        let log = ev.lock().unwrap().clone();
        assert_eq!(log, vec!["base:enable".to_string(), "dependent:enable".to_string()]);
        assert!(registry.dependency_errors().is_empty());
    }

    #[test]
    fn unknown_method_is_a_dependency_error() {
        let ev = events();
        let registry = PluginRegistry::with_plugins(vec![
            (Recorder::boxed("base", ev.clone()), false, vec![]),
            (
                Recorder::boxed("dependent", ev.clone()),
                false,
                vec!["plugins.defaults.base.do_magic".to_string()],
            ),
        ]);
        registry.enable("dependent");
        let errors = registry.dependency_errors();
        assert!(errors.iter().any(|e| e.contains("do_magic")));
        assert!(registry.is_enabled("dependent"));
    }

    #[test]
    fn fan_out_reaches_disabled_plugins_in_registration_order() {
        let ev = events();
        let registry = PluginRegistry::with_plugins(vec![
            (Recorder::boxed("first", ev.clone()), true, vec![]),
            (Recorder::boxed("second", ev.clone()), false, vec![]),
        ]);
        ev.lock().unwrap().clear();
        registry.on_disconnected();
        let log = ev.lock().unwrap().clone();
        assert_eq!(log, vec!["first:disconnected".to_string(), "second:disconnected".to_string()]);
    }

    #[test]
    fn mac_carrying_events_pass_the_mac_through() {
        let ev = events();
        let registry = PluginRegistry::with_plugins(vec![(Recorder::boxed("p", ev.clone()), true, vec![])]);
        ev.lock().unwrap().clear();
        registry.on_connected_new("AA:BB:CC:DD:EE:FF");
        assert_eq!(
            ev.lock().unwrap().clone(),
            vec!["p:connected_new[AA:BB:CC:DD:EE:FF]".to_string()]
        );
    }
}
