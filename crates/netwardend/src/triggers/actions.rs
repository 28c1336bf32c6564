//! Trigger actions. Raises are deduplicated and resolves match by exact
//! `(category, message)`, so every action is idempotent across ticks.

use crate::alerts::{AlertManager, AlertRequest};
use anyhow::Result;
use netwarden_common::{AlertCategory, AlertLevel};

pub const MSG_INTERFACE_UNPLUGGED: &str = "Interface unplugged!";
pub const MSG_CPU_TEMP_HIGH: &str = "CPU temperature is high!";
pub const MSG_BATTERY_LOW: &str = "Battery level is low!";
pub const MSG_ON_BATTERY: &str = "Device is running on battery!";

pub fn alert_interface_unplugged(alerts: &AlertManager) -> Result<()> {
    alerts.raise(
        AlertRequest::new(AlertCategory::Interface, AlertLevel::Warning, MSG_INTERFACE_UNPLUGGED)
            .deduplicated(),
    )?;
    Ok(())
}

pub fn resolve_interface_unplugged(alerts: &AlertManager) -> Result<()> {
    resolve_matching(alerts, AlertCategory::Interface, MSG_INTERFACE_UNPLUGGED)
}

pub fn alert_cpu_temp_high(alerts: &AlertManager) -> Result<()> {
    alerts.raise(
        AlertRequest::new(AlertCategory::Temperature, AlertLevel::Info, MSG_CPU_TEMP_HIGH)
            .deduplicated(),
    )?;
    Ok(())
}

pub fn resolve_cpu_temp_high(alerts: &AlertManager) -> Result<()> {
    resolve_matching(alerts, AlertCategory::Temperature, MSG_CPU_TEMP_HIGH)
}

pub fn alert_battery_low(alerts: &AlertManager) -> Result<()> {
    alerts.raise(
        AlertRequest::new(AlertCategory::Battery, AlertLevel::Info, MSG_BATTERY_LOW).deduplicated(),
    )?;
    Ok(())
}

pub fn alert_on_battery(alerts: &AlertManager) -> Result<()> {
    alerts.raise(
        AlertRequest::new(AlertCategory::Battery, AlertLevel::Info, MSG_ON_BATTERY).deduplicated(),
    )?;
    Ok(())
}

pub fn resolve_on_battery(alerts: &AlertManager) -> Result<()> {
    resolve_matching(alerts, AlertCategory::Battery, MSG_ON_BATTERY)
}

fn resolve_matching(alerts: &AlertManager, category: AlertCategory, message: &str) -> Result<()> {
    if let Some(alert) = alerts.find_unresolved(category, message)? {
        alerts.resolve(&alert)?;
    }
    Ok(())
}
