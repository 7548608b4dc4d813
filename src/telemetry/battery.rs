//! Battery readings from the Linux power supply class

use crate::protocol::BatteryInfo;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default power supply class directory
pub const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// Read battery state from a power supply class directory.
///
/// Missing files or unreadable values leave the matching fields at their
/// defaults; this never fails.
pub async fn read_battery(root: &Path) -> BatteryInfo {
    let mut info = BatteryInfo::default();

    let Some(battery) = find_battery(root).await else {
        debug!(root = %root.display(), "No battery found");
        return info;
    };

    info.percent = read_value::<u8>(&battery.join("capacity")).await;

    if let Some(status) = read_trimmed(&battery.join("status")).await {
        info.charging = is_charging_status(&status);
    }

    let energy_now = read_value::<i64>(&battery.join("energy_now")).await;
    let power_now = read_value::<i64>(&battery.join("power_now")).await;
    let energy_full = if info.charging {
        read_value::<i64>(&battery.join("energy_full")).await
    } else {
        None
    };
    info.time_remaining_min = time_remaining_minutes(energy_now, power_now, energy_full);

    info
}

/// First supply whose `type` is `Battery`
async fn find_battery(root: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(root).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let device = entry.path();
        if read_trimmed(&device.join("type")).await.as_deref() == Some("Battery") {
            return Some(device);
        }
    }
    None
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|content| content.trim().to_string())
}

async fn read_value<V: std::str::FromStr>(path: &Path) -> Option<V> {
    read_trimmed(path).await?.parse().ok()
}

/// `Full` counts as charging: the deck is on external power
pub fn is_charging_status(status: &str) -> bool {
    matches!(status, "Charging" | "Full")
}

/// Minutes until empty, or until full when `energy_full` is given
pub fn time_remaining_minutes(
    energy_now: Option<i64>,
    power_now: Option<i64>,
    energy_full: Option<i64>,
) -> Option<i64> {
    let energy_now = energy_now?;
    let power_now = power_now.filter(|power| *power > 0)?;
    let energy = match energy_full {
        Some(full) => full - energy_now,
        None => energy_now,
    };
    let hours = energy as f64 / power_now as f64;
    Some((hours * 60.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_supply(root: &Path, name: &str, files: &[(&str, &str)]) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for (file, content) in files {
            std::fs::write(dir.join(file), format!("{content}\n")).unwrap();
        }
    }

    #[test]
    fn test_time_remaining_discharging() {
        assert_eq!(time_remaining_minutes(Some(20_000), Some(10_000), None), Some(120));
    }

    #[test]
    fn test_time_remaining_charging() {
        assert_eq!(
            time_remaining_minutes(Some(20_000), Some(10_000), Some(40_000)),
            Some(120)
        );
    }

    #[test]
    fn test_time_remaining_requires_positive_power() {
        assert_eq!(time_remaining_minutes(Some(20_000), Some(0), None), None);
        assert_eq!(time_remaining_minutes(None, Some(10), None), None);
    }

    #[test]
    fn test_charging_statuses() {
        assert!(is_charging_status("Charging"));
        assert!(is_charging_status("Full"));
        assert!(!is_charging_status("Discharging"));
        assert!(!is_charging_status("Not charging"));
    }

    #[tokio::test]
    async fn test_read_battery_from_sysfs() {
        let root = TempDir::new().unwrap();
        write_supply(root.path(), "ACAD", &[("type", "Mains"), ("online", "1")]);
        write_supply(
            root.path(),
            "BAT1",
            &[
                ("type", "Battery"),
                ("capacity", "87"),
                ("status", "Discharging"),
                ("energy_now", "30000000"),
                ("power_now", "15000000"),
            ],
        );

        let info = read_battery(root.path()).await;
        assert_eq!(info.percent, Some(87));
        assert!(!info.charging);
        assert_eq!(info.time_remaining_min, Some(120));
    }

    #[tokio::test]
    async fn test_read_battery_without_battery() {
        let root = TempDir::new().unwrap();
        write_supply(root.path(), "ACAD", &[("type", "Mains")]);
        assert_eq!(read_battery(root.path()).await, BatteryInfo::default());

        let missing = root.path().join("does-not-exist");
        assert_eq!(read_battery(&missing).await, BatteryInfo::default());
    }
}
