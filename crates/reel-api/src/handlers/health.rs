//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub status: String,
    pub active_jobs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_slots: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Readiness check endpoint (readiness probe).
///
/// Ready once the FFmpeg tool chain is reachable.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let active_jobs = state
        .engine
        .list()
        .await
        .iter()
        .filter(|job| !job.is_terminal())
        .count();
    let available_slots = state.engine.available_slots();

    let check = reel_media::check_ffmpeg().and_then(|_| reel_media::check_ffprobe());
    match check {
        Ok(_) => Ok(Json(ReadinessResponse {
            status: "ready".to_string(),
            active_jobs,
            available_slots,
            error: None,
        })),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready".to_string(),
                active_jobs,
                available_slots,
                error: Some(e.to_string()),
            }),
        )),
    }
}
