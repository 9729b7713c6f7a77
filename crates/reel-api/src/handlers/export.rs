//! Export job handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use reel_models::{builtin_presets, ExportPreset, Job, JobId, JobStatus, RenderSettings};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response for a newly submitted job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExportResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Point-in-time view of a job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobSnapshot {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            stage: job.stage,
            output_path: job.output_path,
            error: job.error_message,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

/// Response to a cancel request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelExportResponse {
    pub job_id: JobId,
    /// False when the job had already finished
    pub accepted: bool,
}

/// Submit a render job.
///
/// Only the body shape is checked here; settings problems surface as a
/// failed job when it starts.
pub async fn start_export(
    State(state): State<AppState>,
    body: Result<Json<RenderSettings>, JsonRejection>,
) -> ApiResult<Json<StartExportResponse>> {
    let Json(settings) = body?;
    let job_id = state.engine.submit(settings).await;
    info!(job_id = %job_id, "Export job submitted");

    Ok(Json(StartExportResponse {
        job_id,
        status: JobStatus::Queued,
    }))
}

/// Current state of one job.
pub async fn get_export(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let job = state.engine.get(&JobId::from_string(job_id)).await?;
    Ok(Json(job.into()))
}

/// Request cancellation of a job.
pub async fn cancel_export(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelExportResponse>> {
    let job_id = JobId::from_string(job_id);
    if state.engine.registry().entry(&job_id).await.is_none() {
        return Err(ApiError::not_found(format!("Job {} not found", job_id)));
    }

    let accepted = state.engine.cancel(&job_id).await;
    info!(job_id = %job_id, accepted, "Export cancel requested");

    Ok(Json(CancelExportResponse { job_id, accepted }))
}

/// Every job this process has seen, oldest first.
pub async fn export_history(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.engine.list().await.into_iter().map(JobSnapshot::from).collect())
}

pub async fn list_presets() -> Json<Vec<ExportPreset>> {
    Json(builtin_presets())
}
