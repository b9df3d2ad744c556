//! API routes.

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::handlers::{
    delete_recording, get_settings, get_state, health, list_recordings, set_roi_x, set_roi_y,
    set_threshold, toggle_favorite, update_settings,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
///
/// Anything outside `/api` and `/metrics` is served from the recordings
/// directory (videos and screenshots).
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let recording_routes = Router::new()
        .route("/recordings", get(list_recordings))
        .route("/recordings/:name", delete(delete_recording))
        .route("/recordings/:name/favorite", post(toggle_favorite));

    let settings_routes = Router::new()
        .route("/settings", get(get_settings).post(update_settings))
        .route("/settings/roi/:x1/:x2", post(set_roi_x))
        .route("/settings/roi_y/:y1/:y2", post(set_roi_y))
        .route("/settings/threshold/:value", post(set_threshold));

    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/state", get(get_state))
        .merge(recording_routes)
        .merge(settings_routes);

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let files = ServeDir::new(&state.recordings_path);

    Router::new()
        .nest("/api", api_routes)
        .merge(metrics_routes)
        .fallback_service(files)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
