//! Network event ingestion. `NetworkEvents` identifies the upstream gateway,
//! classifies the network, records it, and submits the matching transition
//! to the orchestrator. `LinkMonitor` feeds it at runtime by polling the
//! kernel link state of the monitored interfaces and turning operstate and
//! carrier edges into events.

use crate::alerts::{AlertManager, AlertRequest};
use crate::config::Config;
use crate::orchestrator::StateSender;
use anyhow::{Context, Result};
use netwarden_common::{
    AlertCategory, AlertLevel, ConnectivityState, Database, StateContext, WardenError,
};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct NetworkEvents {
    db: Database,
    alerts: AlertManager,
    states: StateSender,
    blacklisted_macs: Vec<String>,
    home_mac: String,
}

impl NetworkEvents {
    pub fn new(config: &Config, db: Database, alerts: AlertManager, states: StateSender) -> Self {
        Self {
            db,
            alerts,
            states,
            blacklisted_macs: config.blacklisted_macs_upper(),
            home_mac: config.home_mac_upper(),
        }
    }

    /// A link came up on `interface`. Resolve the gateway MAC, classify it,
    /// record the network and enter the matching connected state.
    ///
    /// Gateway identification failure is not fatal: a warning alert is
    /// raised and the daemon treats the link as disconnected until the next
    /// event.
    pub fn handle_connected(&self, interface: &str) -> Result<()> {
        let mac = match gateway_mac() {
            Ok(mac) => mac.to_uppercase(),
            Err(e) => {
                warn!("Could not identify gateway on {interface}: {e}");
                if let Err(alert_err) = self.alerts.raise(
                    AlertRequest::new(
                        AlertCategory::Network,
                        AlertLevel::Warning,
                        format!("Could not identify the upstream gateway: {e}"),
                    )
                    .deduplicated(),
                ) {
                    warn!("Could not raise gateway alert: {alert_err}");
                }
                self.states
                    .submit(ConnectivityState::Disconnected, StateContext::default());
                return Ok(());
            }
        };

        let known = self.db.network_by_mac(&mac)?.is_some();
        let (state, blacklisted, home) =
            classify(&mac, &self.blacklisted_macs, &self.home_mac, known);
        let network_id = self.db.upsert_network(&mac, blacklisted, home)?;
        info!("Gateway {mac} on {interface} classified as {state} (network {network_id})");
        self.states.update_state(state, StateContext::with_mac(mac))
    }

    /// The link went away.
    pub fn handle_disconnected(&self) {
        self.states
            .submit(ConnectivityState::Disconnected, StateContext::default());
    }

    /// A cable was plugged in but the link is not yet usable.
    pub fn handle_cable_inserted(&self, interface: &str) {
        info!("Cable inserted on {interface}");
        self.states
            .submit(ConnectivityState::Connecting, StateContext::default());
    }
}

/// How often the link monitor samples the kernel link state.
pub const LINK_POLL_INTERVAL: Duration = Duration::from_secs(1);

const SYS_CLASS_NET: &str = "/sys/class/net";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LinkState {
    up: bool,
    carrier: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum LinkEvent {
    Connected(String),
    CableInserted(String),
    Disconnected,
}

/// Polls the monitored interfaces and feeds edges into `NetworkEvents`:
/// operstate reaching "up" means connected, carrier appearing without an up
/// link means a cable was inserted, the last up link going away means
/// disconnected. Steady state produces no events; the startup probe already
/// established the baseline.
pub struct LinkMonitor {
    events: NetworkEvents,
    interfaces: Vec<String>,
    root: PathBuf,
    poll: Duration,
}

impl LinkMonitor {
    pub fn new(events: NetworkEvents, interfaces: Vec<String>) -> Self {
        Self {
            events,
            interfaces,
            root: PathBuf::from(SYS_CLASS_NET),
            poll: LINK_POLL_INTERVAL,
        }
    }

    /// Monitor rooted at an arbitrary directory. Used by tests.
    pub fn sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Take the baseline sample, then start the poll thread. Sampling before
    /// the spawn means edges after this call are never missed.
    pub fn spawn(self) -> Result<LinkMonitorHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let baseline: Vec<LinkState> = self
            .interfaces
            .iter()
            .map(|name| self.sample(name))
            .collect();
        let thread = std::thread::Builder::new()
            .name("warden-linkmon".to_string())
            .spawn(move || self.run(baseline, &flag))
            .context("spawning link monitor thread")?;
        Ok(LinkMonitorHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn run(&self, mut states: Vec<LinkState>, stop: &AtomicBool) {
        info!("Link monitor watching {:?}", self.interfaces);
        while !stop.load(Ordering::SeqCst) {
            std::thread::sleep(self.poll);
            let now: Vec<LinkState> = self
                .interfaces
                .iter()
                .map(|name| self.sample(name))
                .collect();
            for event in link_edges(&self.interfaces, &states, &now) {
                self.dispatch(event);
            }
            states = now;
        }
    }

    fn sample(&self, interface: &str) -> LinkState {
        let base = self.root.join(interface);
        let operstate = std::fs::read_to_string(base.join("operstate"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        // Reading carrier fails while the interface is administratively
        // down; that counts as no carrier.
        let carrier = std::fs::read_to_string(base.join("carrier"))
            .map(|s| s.trim() == "1")
            .unwrap_or(false);
        LinkState {
            up: operstate == "up",
            carrier,
        }
    }

    fn dispatch(&self, event: LinkEvent) {
        match event {
            LinkEvent::Connected(interface) => {
                if let Err(e) = self.events.handle_connected(&interface) {
                    warn!("Link-up handling on {interface} failed: {e:#}");
                }
            }
            LinkEvent::CableInserted(interface) => {
                self.events.handle_cable_inserted(&interface);
            }
            LinkEvent::Disconnected => self.events.handle_disconnected(),
        }
    }
}

pub struct LinkMonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl LinkMonitorHandle {
    /// Stop the poll loop and wait for the thread to exit its current sleep.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Turn two consecutive link samples into events, per interface. The
/// disconnected event is global: it fires only when the last up interface
/// went down.
fn link_edges(interfaces: &[String], prev: &[LinkState], now: &[LinkState]) -> Vec<LinkEvent> {
    let mut events = Vec::new();
    for (i, name) in interfaces.iter().enumerate() {
        if now[i].up && !prev[i].up {
            events.push(LinkEvent::Connected(name.clone()));
        } else if now[i].carrier && !prev[i].carrier && !now[i].up {
            events.push(LinkEvent::CableInserted(name.clone()));
        }
    }
    let was_any_up = prev.iter().any(|s| s.up);
    let is_any_up = now.iter().any(|s| s.up);
    if was_any_up && !is_any_up {
        events.push(LinkEvent::Disconnected);
    }
    events
}

/// Map a gateway MAC to a connected state. Blacklist wins over home, home
/// wins over previously-seen; anything else is a new network.
fn classify(
    mac: &str,
    blacklisted: &[String],
    home_mac: &str,
    known: bool,
) -> (ConnectivityState, bool, bool) {
    if blacklisted.iter().any(|b| b == mac) {
        (ConnectivityState::ConnectedBlacklisted, true, false)
    } else if !home_mac.is_empty() && mac == home_mac {
        (ConnectivityState::ConnectedHome, false, true)
    } else if known {
        (ConnectivityState::ConnectedKnown, false, false)
    } else {
        (ConnectivityState::ConnectedNew, false, false)
    }
}

/// Resolve the MAC address of the default gateway.
fn gateway_mac() -> Result<String, WardenError> {
    let route = std::fs::read_to_string("/proc/net/route")?;
    let gateway = parse_default_gateway(&route)
        .ok_or_else(|| WardenError::ExternalTool("no default route".to_string()))?;

    // One throwaway ping so the kernel populates its ARP table.
    let _ = Command::new("ping")
        .args(["-c", "1", "-W", "1"])
        .arg(gateway.to_string())
        .output();

    let arp = std::fs::read_to_string("/proc/net/arp")?;
    parse_arp_entry(&arp, gateway).ok_or_else(|| {
        WardenError::ExternalTool(format!("no ARP entry for gateway {gateway}"))
    })
}

/// Find the default gateway in `/proc/net/route` content. Addresses there
/// are little-endian hex.
fn parse_default_gateway(route: &str) -> Option<Ipv4Addr> {
    const RTF_GATEWAY: u64 = 0x2;
    for line in route.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[1] != "00000000" {
            continue;
        }
        let flags = u64::from_str_radix(fields[3], 16).ok()?;
        if flags & RTF_GATEWAY == 0 {
            continue;
        }
        let raw = u32::from_str_radix(fields[2], 16).ok()?;
        return Some(Ipv4Addr::from(raw.swap_bytes()));
    }
    None
}

/// Find the hardware address for `ip` in `/proc/net/arp` content.
fn parse_arp_entry(arp: &str, ip: Ipv4Addr) -> Option<String> {
    let needle = ip.to_string();
    for line in arp.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 4 && fields[0] == needle && fields[3] != "00:00:00:00:00:00" {
            return Some(fields[3].to_string());
        }
    }
    None
}
