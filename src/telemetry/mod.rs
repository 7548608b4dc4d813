//! Hardware telemetry collection
//!
//! The publication cycle only sees [`TelemetrySource`]; [`SystemTelemetry`]
//! is the default implementation reading the local machine.

pub mod battery;
pub mod disk;
pub mod network;

use crate::protocol::{BatteryInfo, DiskInfo, NetworkInfo};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Telemetry collection errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command failed: {0}")]
    CommandFailed(String),
    #[error("Failed to parse command output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Collector task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Source of hardware snapshots for the publication cycle
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn battery(&self) -> Result<BatteryInfo, TelemetryError>;
    async fn disk(&self) -> Result<DiskInfo, TelemetryError>;
    async fn network(&self) -> Result<NetworkInfo, TelemetryError>;
}

/// Reads battery, disk and network state from the local system
#[derive(Debug, Clone)]
pub struct SystemTelemetry {
    power_supply_root: PathBuf,
}

impl Default for SystemTelemetry {
    fn default() -> Self {
        Self {
            power_supply_root: PathBuf::from(battery::POWER_SUPPLY_ROOT),
        }
    }
}

impl SystemTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read batteries from a different power supply directory
    pub fn with_power_supply_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.power_supply_root = root.into();
        self
    }
}

#[async_trait]
impl TelemetrySource for SystemTelemetry {
    async fn battery(&self) -> Result<BatteryInfo, TelemetryError> {
        Ok(battery::read_battery(&self.power_supply_root).await)
    }

    async fn disk(&self) -> Result<DiskInfo, TelemetryError> {
        let mounts = tokio::task::spawn_blocking(disk::list_mounts).await?;
        Ok(disk::summarize(&mounts))
    }

    async fn network(&self) -> Result<NetworkInfo, TelemetryError> {
        network::collect_network().await
    }
}
