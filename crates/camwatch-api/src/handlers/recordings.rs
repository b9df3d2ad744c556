//! Recording list, favourite and delete handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use camwatch_models::Recording;

use crate::error::ApiResult;
use crate::state::AppState;

/// List recordings, newest first.
pub async fn list_recordings(State(state): State<AppState>) -> Json<Vec<Recording>> {
    Json(state.index.list().await)
}

/// Optional favourite request body. Without it the flag is toggled.
#[derive(Debug, Default, Deserialize)]
pub struct FavoriteRequest {
    pub favorite: Option<bool>,
}

#[derive(Serialize)]
pub struct FavoriteResponse {
    pub status: String,
    pub filename: String,
    pub favorite: bool,
}

/// Set or toggle the favourite flag.
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<FavoriteRequest>>,
) -> ApiResult<Json<FavoriteResponse>> {
    let requested = body.and_then(|Json(req)| req.favorite);
    let recording = state.index.set_favorite(&name, requested).await?;

    Ok(Json(FavoriteResponse {
        status: "ok".to_string(),
        filename: recording.filename,
        favorite: recording.favorite,
    }))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub status: String,
    pub filename: String,
}

/// Delete a recording and its screenshots.
pub async fn delete_recording(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    state.index.delete(&name).await?;
    info!(recording = %name, "Recording deleted via API");

    Ok(Json(DeleteResponse {
        status: "deleted".to_string(),
        filename: name,
    }))
}
