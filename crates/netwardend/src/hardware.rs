//! Hardware probing for the battery-backed builds.
//!
//! The UPS HAT exposes itself through the kernel power-supply class, so the
//! gauge is a couple of sysfs reads. Whether the device is present at all is
//! a config capability flag; the gauge itself reports read errors upward and
//! lets the trigger engine decide what to do with them.

use anyhow::{Context, Result};
use std::path::PathBuf;

const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

pub struct BatteryGauge {
    base: PathBuf,
}

impl BatteryGauge {
    pub fn new(device: &str) -> Self {
        Self {
            base: PathBuf::from(POWER_SUPPLY_ROOT).join(device),
        }
    }

    /// Gauge rooted at an arbitrary directory. Used by tests.
    pub fn at(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Remaining charge, 0-100.
    pub async fn percent(&self) -> Result<f64> {
        let path = self.base.join("capacity");
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        raw.trim()
            .parse::<f64>()
            .with_context(|| format!("bad capacity reading '{}'", raw.trim()))
    }

    /// True while on external power ("Charging" or "Full").
    pub async fn is_charging(&self) -> Result<bool> {
        let path = self.base.join("status");
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(matches!(raw.trim(), "Charging" | "Full"))
    }
}
