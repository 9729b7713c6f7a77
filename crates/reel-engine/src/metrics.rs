//! Engine metrics, recorded through the `metrics` facade.
//!
//! Without an installed recorder these calls are no-ops.

use metrics::{counter, histogram};
use reel_models::{JobStatus, Stage};

pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "reel_export_jobs_submitted_total";
    pub const JOBS_FINISHED_TOTAL: &str = "reel_export_jobs_finished_total";
    pub const STAGES_STARTED_TOTAL: &str = "reel_export_stages_started_total";
    pub const CONTAINED_ERRORS_TOTAL: &str = "reel_export_contained_errors_total";
    pub const RENDER_DURATION_SECONDS: &str = "reel_export_render_duration_seconds";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

/// Record a job reaching a terminal state.
pub fn record_job_finished(status: JobStatus) {
    let labels = [("status", status.as_str().to_string())];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
}

pub fn record_stage_started(stage: Stage) {
    let labels = [("stage", stage.label().to_string())];
    counter!(names::STAGES_STARTED_TOTAL, &labels).increment(1);
}

/// Record per-item errors that a stage skipped over.
pub fn record_contained_errors(stage: Stage, count: usize) {
    if count == 0 {
        return;
    }
    let labels = [("stage", stage.label().to_string())];
    counter!(names::CONTAINED_ERRORS_TOTAL, &labels).increment(count as u64);
}

pub fn record_render_duration(status: JobStatus, duration_secs: f64) {
    let labels = [("status", status.as_str().to_string())];
    histogram!(names::RENDER_DURATION_SECONDS, &labels).record(duration_secs);
}
