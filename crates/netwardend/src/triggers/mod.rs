//! Polled condition/action triggers.
//!
//! Each trigger is an independent condition/action pair. The orchestrator
//! drives `check_all` on a fixed cadence; a failing trigger is logged and
//! never prevents the remaining triggers from being checked. The set holds
//! no state between ticks - idempotence is each action's job (raise
//! deduplicated, resolve by match).

pub mod actions;
pub mod conditions;

use crate::alerts::AlertManager;
use crate::config::Config;
use crate::hardware::BatteryGauge;
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

type ConditionFuture = Pin<Box<dyn Future<Output = Result<bool>> + Send>>;
type ActionFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

pub struct Trigger {
    name: String,
    condition: Box<dyn Fn() -> ConditionFuture + Send + Sync>,
    action: Box<dyn Fn() -> ActionFuture + Send + Sync>,
}

impl Trigger {
    pub fn new<C, CF, A, AF>(name: impl Into<String>, condition: C, action: A) -> Self
    where
        C: Fn() -> CF + Send + Sync + 'static,
        CF: Future<Output = Result<bool>> + Send + 'static,
        A: Fn() -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            condition: Box::new(move || Box::pin(condition())),
            action: Box::new(move || Box::pin(action())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn check_and_fire(&self) -> Result<()> {
        if (self.condition)().await? {
            debug!("Trigger {} fired", self.name);
            (self.action)().await?;
        }
        Ok(())
    }
}

/// Ordered trigger registry, mutable only by addition.
#[derive(Default)]
pub struct TriggerSet {
    triggers: Vec<Trigger>,
}

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Check every trigger in registration order. Triggers are sequential
    /// within a tick; a failure is isolated to its trigger.
    pub async fn check_all(&self) {
        for trigger in &self.triggers {
            if let Err(e) = trigger.check_and_fire().await {
                warn!("Error checking trigger {}: {e:#}", trigger.name);
            }
        }
    }
}

/// The built-in trigger set: interface link watch, CPU temperature watch,
/// and - when the UPS HAT capability is enabled - battery watch.
pub fn builtin(alerts: &AlertManager, config: &Config) -> TriggerSet {
    let mut set = TriggerSet::new();
    let monitored: Arc<Vec<String>> = Arc::new(config.network_flows.monitored_interfaces.clone());

    {
        let interfaces = Arc::clone(&monitored);
        let manager = alerts.clone();
        set.add(Trigger::new(
            "InterfaceUnplugged",
            move || {
                let interfaces = Arc::clone(&interfaces);
                async move { Ok(conditions::interface_unplugged(&interfaces).await) }
            },
            move || {
                let manager = manager.clone();
                async move { actions::alert_interface_unplugged(&manager) }
            },
        ));
    }
    {
        let interfaces = Arc::clone(&monitored);
        let manager = alerts.clone();
        set.add(Trigger::new(
            "InterfaceReplugged",
            move || {
                let interfaces = Arc::clone(&interfaces);
                async move { Ok(conditions::interface_replugged(&interfaces).await) }
            },
            move || {
                let manager = manager.clone();
                async move { actions::resolve_interface_unplugged(&manager) }
            },
        ));
    }
    {
        let manager = alerts.clone();
        set.add(Trigger::new(
            "CpuTempHigh",
            || async { Ok(conditions::cpu_temp_high().await) },
            move || {
                let manager = manager.clone();
                async move { actions::alert_cpu_temp_high(&manager) }
            },
        ));
    }
    {
        let manager = alerts.clone();
        set.add(Trigger::new(
            "CpuTempSafe",
            || async { Ok(conditions::cpu_temp_safe().await) },
            move || {
                let manager = manager.clone();
                async move { actions::resolve_cpu_temp_high(&manager) }
            },
        ));
    }

    if config.is_device_enabled("ups_hat_c") {
        let gauge = Arc::new(BatteryGauge::new("ups_hat_c"));
        {
            let gauge = Arc::clone(&gauge);
            let manager = alerts.clone();
            set.add(Trigger::new(
                "BatteryLow",
                move || {
                    let gauge = Arc::clone(&gauge);
                    async move { conditions::battery_low(&gauge).await }
                },
                move || {
                    let manager = manager.clone();
                    async move { actions::alert_battery_low(&manager) }
                },
            ));
        }
        {
            let gauge = Arc::clone(&gauge);
            let manager = alerts.clone();
            set.add(Trigger::new(
                "OnBattery",
                move || {
                    let gauge = Arc::clone(&gauge);
                    async move { conditions::on_battery(&gauge).await }
                },
                move || {
                    let manager = manager.clone();
                    async move { actions::alert_on_battery(&manager) }
                },
            ));
        }
        {
            let gauge = Arc::clone(&gauge);
            let manager = alerts.clone();
            set.add(Trigger::new(
                "PowerConnected",
                move || {
                    let gauge = Arc::clone(&gauge);
                    async move { conditions::power_connected(&gauge).await }
                },
                move || {
                    let manager = manager.clone();
                    async move { actions::resolve_on_battery(&manager) }
                },
            ));
        }
    }

    set
}
