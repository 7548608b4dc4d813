//! Telemetry payloads published on `steamdeck/{device}/telemetry/{category}`
//!
//! Field names are part of the wire contract: discovery descriptors extract
//! values with `{{ value_json.<field> }}` templates, so renaming a field
//! silently breaks the matching Home Assistant entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Battery snapshot read from the power supply class
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatteryInfo {
    /// Charge level in percent
    pub percent: Option<u8>,
    /// True while charging or full on external power
    pub charging: bool,
    /// Minutes until empty (discharging) or full (charging)
    pub time_remaining_min: Option<i64>,
}

/// Storage snapshot for internal storage and the SD card
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiskInfo {
    pub internal_free_gb: Option<f64>,
    pub internal_total_gb: Option<f64>,
    pub internal_percent_used: Option<f64>,
    pub sd_free_gb: Option<f64>,
    pub sd_total_gb: Option<f64>,
    pub sd_percent_used: Option<f64>,
    pub sd_mounted: bool,
}

/// IPv4 addresses by interface family
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkInfo {
    pub ip_wifi: Option<String>,
    pub ip_ethernet: Option<String>,
    /// First non-loopback address found, whatever the interface
    pub ip_primary: Option<String>,
}

/// Game state as published on the game telemetry topic
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameStatePayload {
    pub game_name: Option<String>,
    pub app_id: Option<u64>,
    pub is_running: bool,
}

/// Download state as published on the download telemetry topic
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DownloadStatePayload {
    pub downloading: bool,
    pub download_progress: Option<f64>,
    pub download_rate_mbps: Option<f64>,
    /// Not resolved yet; always null on the wire
    pub download_app_name: Option<String>,
}

/// Everything the host sees when it asks for current telemetry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySnapshot {
    pub battery: BatteryInfo,
    pub disk: DiskInfo,
    pub network: NetworkInfo,
    pub game: GameStatePayload,
    pub download: DownloadStatePayload,
    pub collected_at: DateTime<Utc>,
}
