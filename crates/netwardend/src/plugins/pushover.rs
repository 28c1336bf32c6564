//! Pushover plugin: forwards raised alerts to the Pushover API.
//!
//! Fan-out reaches plugins regardless of their enabled flag, so this plugin
//! tracks its own active state and stays quiet while disabled. Delivery
//! failures are logged, never fatal.

use super::Plugin;
use crate::config::PluginSettings;
use netwarden_common::{Alert, AlertLevel, Database};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

const API_URL: &str = "https://api.pushover.net/1/messages.json";

pub struct PushoverPlugin {
    db: Database,
    api_token: String,
    user_key: String,
    active: AtomicBool,
}

impl PushoverPlugin {
    pub const NAME: &'static str = "Pushover";

    pub fn construct(settings: &PluginSettings, db: &Database) -> Box<dyn Plugin> {
        let cfg = &settings.plugin_config;
        Box::new(Self {
            db: db.clone(),
            api_token: cfg["api_token"].as_str().unwrap_or_default().to_string(),
            user_key: cfg["user_key"].as_str().unwrap_or_default().to_string(),
            active: AtomicBool::new(false),
        })
    }

    fn send(&self, message: &str, level: AlertLevel) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        if self.api_token.is_empty() || self.user_key.is_empty() {
            warn!("[{}] Missing Pushover credentials", Self::NAME);
            return;
        }

        let _ = self
            .db
            .log_plugin_event(Self::NAME, &format!("Sending alert: {message}"));

        let priority = match level {
            AlertLevel::Info => "0",
            AlertLevel::Warning => "0",
            AlertLevel::Critical => "1",
        };
        let token = self.api_token.clone();
        let user = self.user_key.clone();
        let message = message.to_string();

        // The blocking client cannot run on a runtime thread, and delivery
        // must not stall the fan-out anyway.
        std::thread::spawn(move || {
            let client = match reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
            {
                Ok(c) => c,
                Err(e) => {
                    warn!("[{}] HTTP client error: {e}", Self::NAME);
                    return;
                }
            };
            let result = client
                .post(API_URL)
                .form(&[
                    ("token", token.as_str()),
                    ("user", user.as_str()),
                    ("message", message.as_str()),
                    ("priority", priority),
                ])
                .send();
            match result {
                Ok(response) if response.status().is_success() => {
                    info!("[{}] Alert delivered", Self::NAME);
                }
                Ok(response) => {
                    warn!("[{}] Pushover returned {}", Self::NAME, response.status());
                }
                Err(e) => {
                    warn!("[{}] Failed to deliver alert: {e}", Self::NAME);
                }
            }
        });
    }
}

impl Plugin for PushoverPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_setup(&self) {
        info!("[{}] Setup complete", Self::NAME);
    }

    fn on_enable(&self) {
        info!("[{}] Enabled", Self::NAME);
        self.active.store(true, Ordering::SeqCst);
        let _ = self.db.log_plugin_event(Self::NAME, "Pushover enabled");
    }

    fn on_disable(&self) {
        info!("[{}] Disabled", Self::NAME);
        self.active.store(false, Ordering::SeqCst);
        let _ = self.db.log_plugin_event(Self::NAME, "Pushover disabled");
    }

    fn on_alerting(&self, alert: &Alert) {
        self.send(
            &format!("[{}] {}", alert.category, alert.message),
            alert.level,
        );
    }

    fn on_alert_resolved(&self, alert: &Alert) {
        self.send(
            &format!("Resolved: [{}] {}", alert.category, alert.message),
            AlertLevel::Info,
        );
    }
}
