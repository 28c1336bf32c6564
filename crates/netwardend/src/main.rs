//! NetWarden daemon entry point.
//!
//! Wires the database, plugin registry, alert manager, trigger set and state
//! machine together, hands the latter two to the orchestrator, then waits for
//! a shutdown signal.

use anyhow::Result;
use netwarden_common::{ConnectivityState, Database, StateContext};
use netwardend::alerts::AlertManager;
use netwardend::config::Config;
use netwardend::network::{LinkMonitor, NetworkEvents};
use netwardend::orchestrator::{Orchestrator, TRIGGER_INTERVAL};
use netwardend::plugins::PluginRegistry;
use netwardend::state_machine::StateMachine;
use netwardend::triggers;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("NetWarden daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let db = Database::new(&config.database_path);
    db.init()?;
    info!("Database ready at {}", db.path().display());

    let registry = Arc::new(PluginRegistry::load(&config, &db));
    for (plugin, route) in registry.registered_routes() {
        info!("Route {} {} ({plugin})", route.method, route.path);
    }
    for error in registry.dependency_errors() {
        warn!("Plugin dependency problem: {error}");
    }

    let alerts = AlertManager::new(
        db.clone(),
        Arc::clone(&registry),
        Some(Box::new(|alert| {
            // Stand-in for the presentation push channel.
            info!("Alert update: {}", alert.to_json());
        })),
    );

    let machine = StateMachine::new(
        Arc::clone(&registry),
        db.clone(),
        Some(Box::new(|state, _context| {
            info!("State is now {state}");
        })),
    );

    let trigger_set = triggers::builtin(&alerts, &config);
    let orchestrator = Orchestrator::spawn(machine, trigger_set, TRIGGER_INTERVAL)?;

    let events = NetworkEvents::new(&config, db, alerts, orchestrator.sender());
    probe_initial_link(&config, &events, &orchestrator);
    let link_monitor =
        LinkMonitor::new(events, config.network_flows.monitored_interfaces.clone()).spawn()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    link_monitor.stop();
    orchestrator.shutdown();
    info!("NetWarden daemon stopped");
    Ok(())
}

/// Establish the starting state from the first monitored interface. Later
/// transitions come from link events delivered at runtime.
fn probe_initial_link(config: &Config, events: &NetworkEvents, orchestrator: &Orchestrator) {
    let Some(interface) = config.network_flows.monitored_interfaces.first() else {
        warn!("No monitored interfaces configured");
        return;
    };
    let operstate = std::fs::read_to_string(format!("/sys/class/net/{interface}/operstate"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if operstate == "up" {
        if let Err(e) = events.handle_connected(interface) {
            warn!("Initial link probe on {interface} failed: {e}");
        }
    } else {
        orchestrator
            .sender()
            .submit(ConnectivityState::WaitingForNetwork, StateContext::default());
    }
}
