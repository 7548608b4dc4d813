//! Telemetry publication cycle
//!
//! Every `publish_interval` seconds, while connected: re-run discovery if the
//! transport reconnected since the last pass, refresh presence, then publish
//! the enabled hardware categories retained. Game and download state are
//! event-driven and never published here.

use super::Bridge;
use crate::discovery::RegistrationSummary;
use crate::error::BridgeError;
use crate::protocol::SensorCategory;
use crate::telemetry::{TelemetryError, TelemetrySource};
use crate::transport::{publish_state, Transport};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Hardware categories the cycle polls, in publish order
pub const POLLED_CATEGORIES: [SensorCategory; 3] = [
    SensorCategory::Battery,
    SensorCategory::Disk,
    SensorCategory::Network,
];

/// What one iteration did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Set when discovery was re-run for a new session
    pub registration: Option<RegistrationSummary>,
    pub heartbeat: bool,
    pub published: Vec<SensorCategory>,
    pub failed: Vec<(SensorCategory, String)>,
}

/// Running cycle task and its stop signal
pub struct CycleHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CycleHandle {
    /// Signal the task and wait for it to finish its current iteration
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                error!(error = %e, "Publication cycle task failed");
            }
        }
    }
}

/// Start the cycle on its own task
pub fn spawn<T, S>(bridge: Arc<Bridge<T, S>>) -> CycleHandle
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run(bridge, shutdown_rx));
    CycleHandle {
        shutdown_tx,
        handle,
    }
}

async fn run<T, S>(bridge: Arc<Bridge<T, S>>, mut shutdown_rx: watch::Receiver<bool>)
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    info!("Publication cycle started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if bridge.transport.is_connected() {
            let report = bridge.run_cycle_once().await;
            if !report.failed.is_empty() {
                warn!(failed = report.failed.len(), "Publication cycle had failures");
            }
        } else {
            debug!("Not connected, skipping publication");
        }

        // Re-read so a settings change applies from the next tick
        let interval = bridge.settings.read().await.publish_interval();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("Publication cycle stopped");
}

impl<T, S> Bridge<T, S>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    /// One iteration of the cycle. Failures are recorded in the report.
    pub async fn run_cycle_once(&self) -> CycleReport {
        let span = crate::cycle_span!(generation = self.transport.session_generation());
        self.tick().instrument(span).await
    }

    async fn tick(&self) -> CycleReport {
        let settings = self.settings().await;
        let mut report = CycleReport::default();

        if self.needs_registration() {
            info!("New MQTT session, re-registering discovery");
            report.registration = Some(self.register_discovery(&settings).await);
        }

        match self.transport.publish_heartbeat().await {
            Ok(()) => report.heartbeat = true,
            Err(e) => warn!(error = %e, "Failed to publish heartbeat"),
        }

        for category in POLLED_CATEGORIES {
            if !settings.enabled_sensors.is_enabled(category) {
                continue;
            }
            match self.publish_hardware(category).await {
                Ok(()) => report.published.push(category),
                Err(e) => {
                    warn!(category = %category, error = %e, "Failed to publish telemetry");
                    report.failed.push((category, e.to_string()));
                }
            }
        }

        debug!(published = report.published.len(), "Publication cycle complete");
        report
    }

    async fn publish_hardware(&self, category: SensorCategory) -> Result<(), BridgeError> {
        let transport = self.transport.as_ref();
        let result = match category {
            SensorCategory::Battery => {
                let info = collected(self.telemetry.battery().await)?;
                publish_state(transport, category, &info).await
            }
            SensorCategory::Disk => {
                let info = collected(self.telemetry.disk().await)?;
                publish_state(transport, category, &info).await
            }
            SensorCategory::Network => {
                let info = collected(self.telemetry.network().await)?;
                publish_state(transport, category, &info).await
            }
            SensorCategory::Game | SensorCategory::Download => return Ok(()),
        };
        result.map_err(BridgeError::from)
    }
}

fn collected<V>(reading: Result<V, TelemetryError>) -> Result<V, BridgeError> {
    reading.map_err(|e| BridgeError::telemetry(e.to_string()))
}
