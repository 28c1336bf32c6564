//! Trigger conditions. All read ambient hardware state and may suspend;
//! none of them hold state between evaluations.

use crate::hardware::BatteryGauge;
use anyhow::Result;
use std::path::Path;

const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";
const CPU_TEMP_LIMIT_C: f64 = 70.0;

async fn interface_is_up(name: &str) -> bool {
    // operstate reads "up", "down", "unknown", ... with a trailing newline.
    match tokio::fs::read_to_string(format!("/sys/class/net/{name}/operstate")).await {
        Ok(state) => state.trim() == "up",
        Err(_) => false, // an interface that vanished counts as unplugged
    }
}

/// True if any monitored interface is down or missing.
pub async fn interface_unplugged(interfaces: &[String]) -> bool {
    for name in interfaces {
        if !interface_is_up(name).await {
            return true;
        }
    }
    false
}

/// True if any monitored interface has link.
pub async fn interface_replugged(interfaces: &[String]) -> bool {
    for name in interfaces {
        if interface_is_up(name).await {
            return true;
        }
    }
    false
}

/// CPU temperature above the limit. An unreadable sensor reads as high:
/// fail-safe-alerting, not fail-silent.
pub async fn cpu_temp_high() -> bool {
    cpu_temp_high_at(Path::new(THERMAL_ZONE)).await
}

pub async fn cpu_temp_safe() -> bool {
    !cpu_temp_high().await
}

pub(crate) async fn cpu_temp_high_at(path: &Path) -> bool {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => match raw.trim().parse::<f64>() {
            Ok(millidegrees) => millidegrees / 1000.0 > CPU_TEMP_LIMIT_C,
            Err(_) => true,
        },
        Err(_) => true,
    }
}

/// Battery below 20% while discharging.
pub async fn battery_low(gauge: &BatteryGauge) -> Result<bool> {
    Ok(gauge.percent().await? < 20.0 && !gauge.is_charging().await?)
}

pub async fn on_battery(gauge: &BatteryGauge) -> Result<bool> {
    Ok(!gauge.is_charging().await?)
}

pub async fn power_connected(gauge: &BatteryGauge) -> Result<bool> {
    gauge.is_charging().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn unreadable_thermal_zone_reads_as_high() {
        assert!(cpu_temp_high_at(Path::new("/nonexistent/thermal/temp")).await);
    }

    #[tokio::test]
    async fn thermal_zone_threshold_is_70_degrees() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("temp");

        tokio::fs::write(&path, "45000\n").await.unwrap();
        assert!(!cpu_temp_high_at(&path).await);

        tokio::fs::write(&path, "71250\n").await.unwrap();
        assert!(cpu_temp_high_at(&path).await);
    }

    #[tokio::test]
    async fn garbage_sensor_output_reads_as_high() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("temp");
        tokio::fs::write(&path, "not-a-number\n").await.unwrap();
        assert!(cpu_temp_high_at(&path).await);
    }

    #[tokio::test]
    async fn missing_interface_counts_as_unplugged() {
        let interfaces = vec!["netwarden-test-no-such-if".to_string()];
        assert!(interface_unplugged(&interfaces).await);
        assert!(!interface_replugged(&interfaces).await);
    }
}
