//! In-memory game and download records
//!
//! Transitions here are pure; the reconciler decides what to publish and
//! what to log around them.

use crate::protocol::{DownloadStatePayload, GameStatePayload};

/// The game currently running on the device, if any
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameState {
    pub is_running: bool,
    pub app_id: Option<u64>,
    /// Not resolved from the app id yet
    pub app_name: Option<String>,
}

impl GameState {
    /// Mark `app_id` as running. Returns true if a game was already running.
    pub fn start(&mut self, app_id: Option<u64>) -> bool {
        let was_running = self.is_running;
        self.is_running = true;
        self.app_id = app_id;
        self.app_name = None;
        was_running
    }

    /// Clear the running game. Returns true if a game was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running;
        self.is_running = false;
        self.app_id = None;
        self.app_name = None;
        was_running
    }

    /// Drop the running flag but keep the app id. Returns true if it changed.
    pub fn suspend(&mut self) -> bool {
        std::mem::replace(&mut self.is_running, false)
    }

    pub fn payload(&self) -> GameStatePayload {
        GameStatePayload {
            game_name: self.app_name.clone(),
            app_id: self.app_id,
            is_running: self.is_running,
        }
    }
}

/// The active (or just finished) download
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadState {
    pub downloading: bool,
    /// Percent complete, 0 to 100
    pub progress: Option<f64>,
    pub rate_mbps: Option<f64>,
    pub app_id: Option<u64>,
}

impl DownloadState {
    /// Begin a download at zero progress. Returns true if one was already active.
    pub fn start(&mut self, app_id: Option<u64>) -> bool {
        let was_downloading = self.downloading;
        self.downloading = true;
        self.app_id = app_id;
        self.progress = Some(0.0);
        self.rate_mbps = Some(0.0);
        was_downloading
    }

    /// Progress reports imply an active download even without a start event
    pub fn update_progress(&mut self, progress: Option<f64>, rate_mbps: Option<f64>) {
        self.downloading = true;
        self.progress = progress;
        self.rate_mbps = rate_mbps;
    }

    /// Hold 100% until [`DownloadState::clear_completed`] runs
    pub fn complete(&mut self) {
        self.downloading = false;
        self.progress = Some(100.0);
        self.rate_mbps = Some(0.0);
    }

    /// Forget progress, rate and app id after the completion grace period
    pub fn clear_completed(&mut self) {
        self.progress = None;
        self.rate_mbps = None;
        self.app_id = None;
    }

    pub fn stop(&mut self) {
        self.downloading = false;
        self.clear_completed();
    }

    /// Drop the downloading flag but keep progress. Returns true if it changed.
    pub fn suspend(&mut self) -> bool {
        std::mem::replace(&mut self.downloading, false)
    }

    pub fn payload(&self) -> DownloadStatePayload {
        DownloadStatePayload {
            downloading: self.downloading,
            download_progress: self.progress,
            download_rate_mbps: self.rate_mbps,
            download_app_name: None,
        }
    }
}
