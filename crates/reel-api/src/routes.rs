//! API routes.

use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    cancel_export, export_history, get_export, health, list_presets, ready, start_export,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;
use crate::ws::ws_export;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Static segments are registered alongside `/:job_id`; axum prefers them.
    let export_routes = Router::new()
        .route("/start", post(start_export))
        .route("/progress/:job_id", get(get_export))
        .route("/cancel/:job_id", post(cancel_export))
        .route("/history", get(export_history))
        .route("/presets", get(list_presets))
        .route("/ws", get(ws_export))
        .route("/:job_id", get(get_export).delete(cancel_export));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api/export", export_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
