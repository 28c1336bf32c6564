//! Configuration management for netwardend.
//!
//! Loads the JSON config document from /etc/netwarden/config.json (or the
//! path in NETWARDEN_CONFIG) and falls back to defaults when absent.
//! String values of the form `env:NAME` resolve to environment variables at
//! load time, so secrets never live in the document itself.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/netwarden/config.json";

/// Environment variable overriding the config path
pub const CONFIG_PATH_ENV: &str = "NETWARDEN_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage location, shared by every component.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Plugins shipped with the daemon; enabled unless configured off.
    #[serde(default)]
    pub default_plugins: HashMap<String, PluginSettings>,

    /// Opt-in plugins; disabled unless configured on.
    #[serde(default)]
    pub optional_plugins: HashMap<String, PluginSettings>,

    #[serde(default)]
    pub network_flows: NetworkFlows,

    /// Per-device hardware capability flags.
    #[serde(default)]
    pub hardware: HashMap<String, DeviceFlag>,
}

fn default_database_path() -> String {
    "netwarden.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            default_plugins: HashMap::new(),
            optional_plugins: HashMap::new(),
            network_flows: NetworkFlows::default(),
            hardware: HashMap::new(),
        }
    }
}

/// Per-plugin configuration entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginSettings {
    /// None means "use the partition default" (on for default plugins,
    /// off for optional ones).
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Dotted dependency descriptors; the last two segments name another
    /// plugin and a zero-argument lifecycle method on it.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Free-form plugin-specific settings.
    #[serde(default)]
    pub plugin_config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkFlows {
    #[serde(default)]
    pub blacklisted_macs: Vec<String>,

    #[serde(default)]
    pub home_network_mac: String,

    #[serde(default = "default_monitored_interfaces")]
    pub monitored_interfaces: Vec<String>,
}

fn default_monitored_interfaces() -> Vec<String> {
    vec!["eth0".to_string()]
}

impl Default for NetworkFlows {
    fn default() -> Self {
        Self {
            blacklisted_macs: Vec::new(),
            home_network_mac: String::new(),
            monitored_interfaces: default_monitored_interfaces(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceFlag {
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Load from the default location, honoring NETWARDEN_CONFIG.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from a specific path, or defaults when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config from {}", path.display()))?;
        expand_env(&mut value);

        let config: Config = serde_json::from_value(value)
            .with_context(|| format!("invalid config document at {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Whether a hardware device capability is enabled.
    pub fn is_device_enabled(&self, device: &str) -> bool {
        self.hardware.get(device).map(|d| d.enabled).unwrap_or(false)
    }

    /// Uppercased blacklist for MAC comparison.
    pub fn blacklisted_macs_upper(&self) -> Vec<String> {
        self.network_flows
            .blacklisted_macs
            .iter()
            .map(|m| m.to_uppercase())
            .collect()
    }

    pub fn home_mac_upper(&self) -> String {
        self.network_flows.home_network_mac.to_uppercase()
    }
}

/// Recursively replace `env:NAME` strings with the value of `$NAME`.
/// A missing variable resolves to the empty string.
fn expand_env(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if let Some(var) = s.strip_prefix("env:") {
                *s = std::env::var(var).unwrap_or_default();
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                expand_env(item);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                expand_env(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/netwarden.json")).unwrap();
        assert_eq!(config.database_path, "netwarden.db");
        assert_eq!(config.network_flows.monitored_interfaces, vec!["eth0"]);
        assert!(config.default_plugins.is_empty());
    }

    #[test]
    fn env_strings_are_expanded() {
        std::env::set_var("NETWARDEN_TEST_TOKEN", "s3cret");
        let mut value: serde_json::Value = serde_json::from_str(
            r#"{
                "optional_plugins": {
                    "pushover": {
                        "enabled": true,
                        "plugin_config": {
                            "api_token": "env:NETWARDEN_TEST_TOKEN",
                            "user_key": "env:NETWARDEN_TEST_UNSET_VAR"
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        expand_env(&mut value);
        let config: Config = serde_json::from_value(value).unwrap();
        let settings = &config.optional_plugins["pushover"];
        assert_eq!(settings.plugin_config["api_token"], "s3cret");
        assert_eq!(settings.plugin_config["user_key"], "");
    }

    #[test]
    fn full_document_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "database_path": "/var/lib/netwarden/warden.db",
                "default_plugins": {{
                    "arpscan": {{ "enabled": true, "dependencies": [] }}
                }},
                "optional_plugins": {{
                    "debug": {{ "enabled": true }}
                }},
                "network_flows": {{
                    "blacklisted_macs": ["de:ad:be:ef:00:01"],
                    "home_network_mac": "aa:bb:cc:dd:ee:ff",
                    "monitored_interfaces": ["eth0", "wlan0"]
                }},
                "hardware": {{
                    "ups_hat_c": {{ "enabled": true }}
                }}
            }}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.database_path, "/var/lib/netwarden/warden.db");
        assert_eq!(config.blacklisted_macs_upper(), vec!["DE:AD:BE:EF:00:01"]);
        assert_eq!(config.home_mac_upper(), "AA:BB:CC:DD:EE:FF");
        assert!(config.is_device_enabled("ups_hat_c"));
        assert!(!config.is_device_enabled("rgb_led_hat"));
        assert_eq!(config.optional_plugins["debug"].enabled, Some(true));
    }
}
