//! Host-facing bridge operations
//!
//! One [`Bridge`] per process owns the settings, the transport, the event
//! reconciler and the publication cycle. The control API and the CLI only
//! talk to the bridge.

pub mod cycle;

pub use cycle::{CycleHandle, CycleReport};

use crate::config::Settings;
use crate::discovery::{DiscoveryRegistrar, RegistrationSummary};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{DeviceEvent, EventError, TelemetrySnapshot};
use crate::reconciler::StateReconciler;
use crate::telemetry::{SystemTelemetry, TelemetrySource};
use crate::transport::{ConnectionState, MqttTransport, Transport};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Settings as shown to the host: password masked, plus the live flag
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    #[serde(flatten)]
    pub settings: Settings,
    pub connected: bool,
}

/// Connection flag plus the state machine label
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub state: String,
}

/// Production bridge: rumqttc transport and local hardware
pub type DeckBridge = Bridge<MqttTransport, SystemTelemetry>;

/// Telemetry bridge for one device
pub struct Bridge<T: Transport, S: TelemetrySource> {
    settings: RwLock<Settings>,
    settings_path: Option<PathBuf>,
    transport: Arc<T>,
    telemetry: Arc<S>,
    reconciler: StateReconciler<T>,
    /// Session generation the last discovery pass ran for; 0 means never
    registered_generation: AtomicU64,
    running: AtomicBool,
    cycle: Mutex<Option<CycleHandle>>,
}

impl DeckBridge {
    /// Bridge over a fresh MQTT client and the local system collectors
    pub fn system(settings: Settings, settings_path: Option<PathBuf>) -> Self {
        Self::new(
            settings,
            settings_path,
            Arc::new(MqttTransport::new()),
            Arc::new(SystemTelemetry::new()),
        )
    }
}

impl<T, S> Bridge<T, S>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    /// `settings_path` is where [`Bridge::save_settings`] persists; `None`
    /// keeps settings in memory only.
    pub fn new(
        settings: Settings,
        settings_path: Option<PathBuf>,
        transport: Arc<T>,
        telemetry: Arc<S>,
    ) -> Self {
        Self {
            settings: RwLock::new(settings),
            settings_path,
            reconciler: StateReconciler::new(transport.clone()),
            transport,
            telemetry,
            registered_generation: AtomicU64::new(0),
            running: AtomicBool::new(false),
            cycle: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn reconciler(&self) -> &StateReconciler<T> {
        &self.reconciler
    }

    pub fn settings_path(&self) -> Option<&Path> {
        self.settings_path.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current settings, unredacted
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn get_settings(&self) -> SettingsView {
        SettingsView {
            settings: self.settings.read().await.redacted(),
            connected: self.transport.is_connected(),
        }
    }

    /// Replace and persist the settings, then reconnect.
    ///
    /// A masked password keeps the stored one. The new settings are kept even
    /// when the reconnect fails; the failure is logged.
    pub async fn save_settings(&self, mut settings: Settings) -> BridgeResult<()> {
        {
            let current = self.settings.read().await;
            settings.restore_masked_password(&current);
        }
        settings.validate()?;

        if let Some(path) = &self.settings_path {
            settings.save_to_file(path)?;
        }
        *self.settings.write().await = settings.clone();

        if self.transport.is_connected() {
            self.disconnect().await;
        }
        if settings.has_broker() {
            if let Err(e) = self.connect().await {
                warn!(error = %e, "Reconnect after settings change failed");
            }
        }
        Ok(())
    }

    /// Configure the transport from settings, connect and register discovery
    pub async fn connect(&self) -> BridgeResult<()> {
        let settings = self.settings().await;
        self.transport.configure(settings.connection_settings());

        if let Err(e) = self.transport.connect().await {
            error!(host = %settings.mqtt_host, error = %e, "Error connecting to MQTT");
            return Err(e.into());
        }

        let summary = self.register_discovery(&settings).await;
        info!(
            published = summary.published,
            "MQTT connected and sensors registered"
        );
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    /// Try the given settings (or the stored ones) on a separate client
    pub async fn test_connection(&self, settings: Option<Settings>) -> BridgeResult<()> {
        let current = self.settings().await;
        let mut candidate = settings.unwrap_or_else(|| current.clone());
        candidate.restore_masked_password(&current);

        self.transport
            .test_connection(candidate.connection_settings())
            .await?;
        Ok(())
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        let state: ConnectionState = self.transport.connection_state();
        ConnectionStatus {
            connected: self.transport.is_connected(),
            state: state.label().to_string(),
        }
    }

    /// Run one publication cycle now
    pub async fn publish_now(&self) -> BridgeResult<CycleReport> {
        if !self.transport.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        Ok(self.run_cycle_once().await)
    }

    /// Fresh hardware readings plus the current game and download records.
    ///
    /// A failing collector leaves its section at defaults.
    pub async fn get_telemetry(&self) -> TelemetrySnapshot {
        let battery = self.telemetry.battery().await.unwrap_or_else(|e| {
            warn!(error = %e, "Battery telemetry unavailable");
            Default::default()
        });
        let disk = self.telemetry.disk().await.unwrap_or_else(|e| {
            warn!(error = %e, "Disk telemetry unavailable");
            Default::default()
        });
        let network = self.telemetry.network().await.unwrap_or_else(|e| {
            warn!(error = %e, "Network telemetry unavailable");
            Default::default()
        });
        let (game, download) = self.reconciler.snapshot().await;

        TelemetrySnapshot {
            battery,
            disk,
            network,
            game,
            download,
            collected_at: chrono::Utc::now(),
        }
    }

    /// Parse a raw host event and hand it to the reconciler.
    ///
    /// Unknown or malformed events are logged and returned as errors; they
    /// never change state.
    pub async fn ingest_event(&self, raw: &Value) -> BridgeResult<()> {
        let timestamp = raw.get("timestamp").and_then(Value::as_i64);
        let event = match DeviceEvent::from_value(raw) {
            Ok(event) => event,
            Err(e @ EventError::UnknownType(_)) => {
                warn!(error = %e, "Unknown event type");
                return Err(e.into());
            }
            Err(e) => {
                error!(error = %e, "Error processing event");
                return Err(e.into());
            }
        };

        debug!(
            event_type = event.event_type(),
            timestamp = ?timestamp.and_then(chrono::DateTime::from_timestamp_millis),
            "Received event"
        );
        let enabled = self.settings.read().await.enabled_sensors.clone();
        self.reconciler.ingest(&event, &enabled).await;
        Ok(())
    }

    /// Auto-connect when a broker is configured and start the cycle
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Bridge already running");
            return;
        }
        info!("Telemetry bridge starting");

        if self.settings.read().await.has_broker() {
            if let Err(e) = self.connect().await {
                warn!(error = %e, "Initial MQTT connection failed");
            }
        }

        *self.cycle.lock().await = Some(cycle::spawn(Arc::clone(self)));
        info!("Telemetry bridge started");
    }

    /// Stop the cycle, drop any pending download clear, then disconnect
    pub async fn shutdown(&self) {
        info!("Telemetry bridge stopping");
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.cycle.lock().await.take() {
            handle.stop().await;
        }
        self.reconciler.cancel_pending().await;
        self.transport.disconnect().await;
        info!("Telemetry bridge stopped");
    }

    async fn register_discovery(&self, settings: &Settings) -> RegistrationSummary {
        let generation = self.transport.session_generation();
        let registrar = DiscoveryRegistrar::new(self.transport.clone(), &settings.hostname);
        let summary = registrar.register_all(&settings.enabled_sensors).await;
        self.registered_generation.store(generation, Ordering::SeqCst);
        summary
    }

    /// True when the transport has accepted a handshake discovery has not seen
    fn needs_registration(&self) -> bool {
        self.transport.session_generation() != self.registered_generation.load(Ordering::SeqCst)
    }
}
