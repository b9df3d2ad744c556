//! Detection settings handlers.
//!
//! Every write goes through [`SettingsStore::update`], which validates the
//! merged result before publishing it.
//!
//! [`SettingsStore::update`]: camwatch_core::SettingsStore::update

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use camwatch_models::{DetectionSettings, SettingsPatch};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response to a successful settings change.
#[derive(Serialize)]
pub struct SettingsUpdateResponse {
    pub status: String,
    pub settings: DetectionSettings,
}

async fn apply(state: &AppState, patch: SettingsPatch) -> ApiResult<Json<SettingsUpdateResponse>> {
    let settings = state.settings.update(patch).await?;
    Ok(Json(SettingsUpdateResponse {
        status: "ok".to_string(),
        settings,
    }))
}

/// Current settings.
pub async fn get_settings(State(state): State<AppState>) -> Json<DetectionSettings> {
    Json(state.settings.get())
}

/// Partial update from a JSON body.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> ApiResult<Json<SettingsUpdateResponse>> {
    if patch.is_empty() {
        return Err(ApiError::bad_request("No settings provided"));
    }
    apply(&state, patch).await
}

/// Horizontal ROI bounds in percent.
pub async fn set_roi_x(
    State(state): State<AppState>,
    Path((start, end)): Path<(u32, u32)>,
) -> ApiResult<Json<SettingsUpdateResponse>> {
    apply(&state, SettingsPatch::roi_x(start, end)).await
}

/// Vertical ROI bounds in percent.
pub async fn set_roi_y(
    State(state): State<AppState>,
    Path((start, end)): Path<(u32, u32)>,
) -> ApiResult<Json<SettingsUpdateResponse>> {
    apply(&state, SettingsPatch::roi_y(start, end)).await
}

/// Motion area threshold.
pub async fn set_threshold(
    State(state): State<AppState>,
    Path(value): Path<u64>,
) -> ApiResult<Json<SettingsUpdateResponse>> {
    apply(&state, SettingsPatch::threshold(value)).await
}
