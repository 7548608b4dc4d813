//! Event-driven game and download state
//!
//! The host forwards game, download and power events; [`StateReconciler`]
//! applies them to one [`GameState`] and one [`DownloadState`] and publishes
//! the affected record right away, non-retained. Out-of-order events are
//! logged and still applied.

pub mod state;

pub use state::{DownloadState, GameState};

use crate::config::EnabledSensors;
use crate::protocol::{DeviceEvent, DownloadStatePayload, GameStatePayload, SensorCategory};
use crate::transport::{publish_state, Transport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// How long a completed download keeps showing 100%
pub const DOWNLOAD_CLEAR_DELAY: Duration = Duration::from_secs(1);

struct ReconcilerState {
    game: GameState,
    download: DownloadState,
    pending_clear: Option<JoinHandle<()>>,
    /// Bumped on every cancellation so a clear that already woke up is a no-op
    clear_token: u64,
}

impl ReconcilerState {
    fn cancel_clear(&mut self) {
        self.clear_token = self.clear_token.wrapping_add(1);
        if let Some(handle) = self.pending_clear.take() {
            handle.abort();
            debug!("Cancelled pending download clear");
        }
    }
}

/// Applies host events to the game and download records
pub struct StateReconciler<T: Transport> {
    transport: Arc<T>,
    inner: Arc<Mutex<ReconcilerState>>,
}

impl<T: Transport + 'static> StateReconciler<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            inner: Arc::new(Mutex::new(ReconcilerState {
                game: GameState::default(),
                download: DownloadState::default(),
                pending_clear: None,
                clear_token: 0,
            })),
        }
    }

    /// Apply one event and publish what it changed.
    ///
    /// Events are serialized through one lock, so publishes leave in the same
    /// order the events were applied.
    pub async fn ingest(&self, event: &DeviceEvent, enabled: &EnabledSensors) {
        let span = crate::event_span!(event_type = event.event_type());
        self.apply(event, enabled).instrument(span).await
    }

    async fn apply(&self, event: &DeviceEvent, enabled: &EnabledSensors) {
        let mut state = self.inner.lock().await;

        if event.is_download_event() {
            state.cancel_clear();
        }

        match event {
            DeviceEvent::GameStarted { app_id } => {
                if state.game.start(*app_id) {
                    warn!(
                        app_id = ?app_id,
                        "Received game_started but a game is already running"
                    );
                }
                info!(app_id = ?app_id, "Game started");
                self.publish_game(&state.game, enabled).await;
            }
            DeviceEvent::GameStopped { app_id } => {
                if !state.game.stop() {
                    warn!(
                        app_id = ?app_id,
                        "Received game_stopped but no game is running"
                    );
                }
                info!(app_id = ?app_id, "Game stopped");
                self.publish_game(&state.game, enabled).await;
            }
            DeviceEvent::DownloadStarted { app_id } => {
                if state.download.start(*app_id) {
                    warn!(
                        app_id = ?app_id,
                        "Received download_started but a download is already active"
                    );
                }
                info!(app_id = ?app_id, "Download started");
                self.publish_download(&state.download, enabled).await;
            }
            DeviceEvent::DownloadProgress { progress, rate } => {
                state.download.update_progress(*progress, *rate);
                debug!(progress = ?progress, rate_mbps = ?rate, "Download progress");
                self.publish_download(&state.download, enabled).await;
            }
            DeviceEvent::DownloadCompleted { app_id } => {
                info!(app_id = ?app_id, "Download completed");
                state.download.complete();
                self.publish_download(&state.download, enabled).await;
                self.schedule_clear(&mut state);
            }
            DeviceEvent::DownloadStopped {} => {
                info!("Download stopped");
                state.download.stop();
                self.publish_download(&state.download, enabled).await;
            }
            DeviceEvent::SystemSuspending {} => {
                info!("System suspending, finalizing state");
                if state.game.suspend() {
                    self.publish_game(&state.game, enabled).await;
                }
                if state.download.suspend() {
                    self.publish_download(&state.download, enabled).await;
                }
            }
            DeviceEvent::SystemResuming {} => {
                info!("System resuming, waiting for new events");
            }
            DeviceEvent::SystemShuttingDown {} => {
                info!("System shutting down, flushing state");
                state.cancel_clear();
                state.game.stop();
                state.download.stop();
                self.publish_game(&state.game, enabled).await;
                self.publish_download(&state.download, enabled).await;
            }
        }
    }

    /// Abort a pending post-completion clear, leaving the last values in place
    pub async fn cancel_pending(&self) {
        self.inner.lock().await.cancel_clear();
    }

    /// True while a completed download is waiting to be cleared
    pub async fn has_pending_clear(&self) -> bool {
        self.inner.lock().await.pending_clear.is_some()
    }

    pub async fn game_payload(&self) -> GameStatePayload {
        self.inner.lock().await.game.payload()
    }

    pub async fn download_payload(&self) -> DownloadStatePayload {
        self.inner.lock().await.download.payload()
    }

    /// Both payloads read under one lock
    pub async fn snapshot(&self) -> (GameStatePayload, DownloadStatePayload) {
        let state = self.inner.lock().await;
        (state.game.payload(), state.download.payload())
    }

    fn schedule_clear(&self, state: &mut ReconcilerState) {
        let inner = Arc::clone(&self.inner);
        let token = state.clear_token;

        state.pending_clear = Some(tokio::spawn(async move {
            tokio::time::sleep(DOWNLOAD_CLEAR_DELAY).await;
            let mut state = inner.lock().await;
            if state.clear_token != token {
                return;
            }
            state.download.clear_completed();
            state.pending_clear = None;
            debug!("Cleared completed download state");
        }));
    }

    async fn publish_game(&self, game: &GameState, enabled: &EnabledSensors) {
        self.publish_gated(SensorCategory::Game, &game.payload(), enabled)
            .await;
    }

    async fn publish_download(&self, download: &DownloadState, enabled: &EnabledSensors) {
        self.publish_gated(SensorCategory::Download, &download.payload(), enabled)
            .await;
    }

    /// Skipped, not queued, when the category is off or the session is down
    async fn publish_gated<P: Serialize + Sync>(
        &self,
        category: SensorCategory,
        payload: &P,
        enabled: &EnabledSensors,
    ) {
        if !enabled.is_enabled(category) {
            debug!(category = %category, "Category disabled, skipping publish");
            return;
        }
        if !self.transport.is_connected() {
            debug!(category = %category, "Not connected, skipping publish");
            return;
        }

        match publish_state(self.transport.as_ref(), category, payload).await {
            Ok(()) => debug!(category = %category, "Published state"),
            Err(e) => warn!(category = %category, error = %e, "Failed to publish state"),
        }
    }
}
