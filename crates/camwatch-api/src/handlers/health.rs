//! Health check handler.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use camwatch_models::RecordingPhase;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub recordings_path: String,
    pub state_file: String,
    pub recording_state: RecordingPhase,
    pub timestamp: String,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "camwatch".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        recordings_path: state.recordings_path.display().to_string(),
        state_file: state.state_file.display().to_string(),
        recording_state: state.recorder.status().phase,
        timestamp: Utc::now().to_rfc3339(),
    })
}
