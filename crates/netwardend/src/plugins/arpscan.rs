//! ArpScan plugin: enumerates hosts on the local network with `arp-scan`
//! and persists what it finds as device records.

use super::{Plugin, RouteSpec};
use crate::config::PluginSettings;
use netwarden_common::db::DeviceRecord;
use netwarden_common::Database;
use regex::Regex;
use std::process::Command;
use tracing::{info, warn};

pub struct ArpScanPlugin {
    db: Database,
}

/// Parsed `arp-scan` header plus discovered hosts.
#[derive(Debug, Default, PartialEq)]
pub struct ScanResult {
    pub interface: Option<String>,
    pub mac_address: Option<String>,
    pub ipv4: Option<String>,
    pub devices: Vec<ScannedDevice>,
}

#[derive(Debug, PartialEq)]
pub struct ScannedDevice {
    pub ip: String,
    pub mac: String,
    pub vendor: String,
    pub duplicate: bool,
}

impl ArpScanPlugin {
    pub const NAME: &'static str = "ArpScan";

    pub fn construct(_settings: &PluginSettings, db: &Database) -> Box<dyn Plugin> {
        Box::new(Self { db: db.clone() })
    }

    fn run_scan(&self, network_id: Option<i64>) {
        let output = match Command::new("arp-scan").arg("-l").output() {
            Ok(o) => o,
            Err(e) => {
                warn!("[{}] arp-scan failed to start: {e}", Self::NAME);
                let _ = self
                    .db
                    .log_plugin_event(Self::NAME, &format!("arp-scan failed: {e}"));
                return;
            }
        };
        if !output.status.success() {
            warn!("[{}] arp-scan exited with {}", Self::NAME, output.status);
            let _ = self
                .db
                .log_plugin_event(Self::NAME, &format!("arp-scan exited with {}", output.status));
            return;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result = parse_arp_scan(&stdout);
        info!("[{}] Discovered {} hosts", Self::NAME, result.devices.len());

        for device in &result.devices {
            let record = DeviceRecord {
                ip_address: device.ip.clone(),
                mac_address: device.mac.clone(),
                vendor: device.vendor.clone(),
                network_id,
                ..DeviceRecord::default()
            };
            if let Err(e) = self.db.insert_device(&record) {
                warn!("[{}] Failed to store device {}: {e}", Self::NAME, device.ip);
            }
        }
        let _ = self.db.log_plugin_event(
            Self::NAME,
            &format!("scan complete: {} hosts", result.devices.len()),
        );
    }
}

impl Plugin for ArpScanPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_setup(&self) {
        info!("[{}] Setup complete", Self::NAME);
    }

    fn on_enable(&self) {
        info!("[{}] Enabled", Self::NAME);
        let _ = self.db.log_plugin_event(Self::NAME, "ArpScan enabled");
    }

    fn on_disable(&self) {
        info!("[{}] Disabled", Self::NAME);
        let _ = self.db.log_plugin_event(Self::NAME, "ArpScan disabled");
    }

    /// `args[0]` names the acting plugin, `args[1]` the network id the scan
    /// results belong to.
    fn perform_action(&self, args: &[serde_json::Value]) {
        if args.first().and_then(|v| v.as_str()) != Some(Self::NAME) {
            return;
        }
        let network_id = args.get(1).and_then(|v| v.as_i64());
        info!("[{}] Running arp-scan (network_id={network_id:?})", Self::NAME);
        self.run_scan(network_id);
    }

    fn routes(&self) -> Vec<RouteSpec> {
        vec![RouteSpec {
            method: "GET".to_string(),
            path: "/plugins/arpscan/results".to_string(),
        }]
    }
}

/// Parse `arp-scan` stdout: an interface header line, a blank-ish preamble,
/// then one `ip  mac  vendor` row per host. A vendor trailing `(DUP: n)`
/// marks a duplicate response.
pub fn parse_arp_scan(output: &str) -> ScanResult {
    let mut result = ScanResult::default();
    let lines: Vec<&str> = output.trim().lines().collect();
    if lines.is_empty() {
        return result;
    }

    let header = Regex::new(r"Interface: (\S+), type: \S+, MAC: (\S+), IPv4: (\S+)").unwrap();
    if let Some(caps) = header.captures(lines[0]) {
        result.interface = Some(caps[1].to_string());
        result.mac_address = Some(caps[2].to_string());
        result.ipv4 = Some(caps[3].to_string());
    }

    let row = Regex::new(r"^(\d+\.\d+\.\d+\.\d+)\s+([0-9a-fA-F:]+)\s+(.*)$").unwrap();
    for line in lines.iter().skip(1) {
        let Some(caps) = row.captures(line) else {
            continue;
        };
        let mut vendor = caps[3].trim().to_string();
        let duplicate = vendor.contains("(DUP:");
        if duplicate {
            vendor = vendor
                .split(" (DUP:")
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        }
        result.devices.push(ScannedDevice {
            ip: caps[1].to_string(),
            mac: caps[2].to_string(),
            vendor,
            duplicate,
        });
    }
    result
}
