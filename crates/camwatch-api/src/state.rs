//! Application state.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use camwatch_core::{CameraConfig, CameraRuntime, RecorderHandle, RecordingIndex, SettingsStore};
use camwatch_models::SensorState;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub settings: Arc<SettingsStore>,
    pub index: Arc<RecordingIndex>,
    pub recorder: RecorderHandle,
    pub sensor_state: watch::Receiver<SensorState>,
    pub recordings_path: PathBuf,
    pub state_file: PathBuf,
}

impl AppState {
    /// Handles into a running camera runtime.
    pub fn new(config: ApiConfig, camera: &CameraConfig, runtime: &CameraRuntime) -> Self {
        Self {
            config,
            settings: runtime.settings(),
            index: runtime.index(),
            recorder: runtime.recorder(),
            sensor_state: runtime.state(),
            recordings_path: camera.recordings_path.clone(),
            state_file: camera.state_file.clone(),
        }
    }
}
