//! Sensor state handler.

use axum::extract::State;
use axum::Json;

use camwatch_models::SensorState;

use crate::state::AppState;

/// Latest sensor state, the same document written to the state file.
pub async fn get_state(State(state): State<AppState>) -> Json<SensorState> {
    Json(state.sensor_state.borrow().clone())
}
