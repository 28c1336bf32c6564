//! Debug plugin: logs every event it receives. Harmless to leave enabled on
//! development builds.

use super::Plugin;
use crate::config::PluginSettings;
use netwarden_common::{Alert, Database};
use tracing::{debug, info};

pub struct DebugPlugin {
    db: Database,
}

impl DebugPlugin {
    pub const NAME: &'static str = "Debug";

    pub fn construct(_settings: &PluginSettings, db: &Database) -> Box<dyn Plugin> {
        Box::new(Self { db: db.clone() })
    }
}

impl Plugin for DebugPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_setup(&self) {
        info!("[{}] Setup complete", Self::NAME);
    }

    fn on_enable(&self) {
        info!("[{}] Enabled", Self::NAME);
        let _ = self.db.log_plugin_event(Self::NAME, "Debug received enable signal");
    }

    fn on_disable(&self) {
        info!("[{}] Disabled", Self::NAME);
        let _ = self.db.log_plugin_event(Self::NAME, "Debug received disable signal");
    }

    fn on_waiting_for_network(&self) {
        debug!("[{}] waiting for network", Self::NAME);
    }

    fn on_connecting(&self) {
        debug!("[{}] connecting", Self::NAME);
    }

    fn on_connected_known(&self, mac: &str) {
        debug!("[{}] known network connected: {mac}", Self::NAME);
    }

    fn on_connected_home(&self, mac: &str) {
        debug!("[{}] home network connected: {mac}", Self::NAME);
    }

    fn on_connected_new(&self, mac: &str) {
        debug!("[{}] new network connected: {mac}", Self::NAME);
    }

    fn on_connected_blacklisted(&self, mac: &str) {
        debug!("[{}] blacklisted network connected: {mac}", Self::NAME);
    }

    fn on_disconnected(&self) {
        debug!("[{}] disconnected", Self::NAME);
    }

    fn on_reconnecting(&self) {
        debug!("[{}] reconnecting", Self::NAME);
    }

    fn on_scanning_in_progress(&self) {
        debug!("[{}] scanning in progress", Self::NAME);
    }

    fn on_scan_completed(&self) {
        debug!("[{}] scan completed", Self::NAME);
    }

    fn on_alerting(&self, alert: &Alert) {
        debug!("[{}] alert raised: [{}] {}", Self::NAME, alert.category, alert.message);
    }

    fn on_alert_resolved(&self, alert: &Alert) {
        debug!("[{}] alert resolved: [{}] {}", Self::NAME, alert.category, alert.message);
    }

    fn on_alert_closed(&self, alert: &Alert) {
        debug!("[{}] alert closed: [{}] {}", Self::NAME, alert.category, alert.message);
    }

    fn perform_action(&self, args: &[serde_json::Value]) {
        debug!("[{}] perform_action: {args:?}", Self::NAME);
    }
}
