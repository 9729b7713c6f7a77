//! Export job definition and status machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::settings::RenderSettings;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Export job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for the executor
    #[default]
    Queued,
    /// Pipeline running
    Rendering,
    /// Output written
    Completed,
    /// Aborted by a fatal error
    Failed,
    /// Stopped at a stage boundary on request
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Rendering => "rendering",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Allowed forward transitions.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Rendering)
                | (Queued, Failed)
                | (Queued, Cancelled)
                | (Rendering, Completed)
                | (Rendering, Failed)
                | (Rendering, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One submitted render request and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Progress percentage (0-100), never decreases
    pub progress: u8,
    /// Current stage label
    pub stage: String,
    pub settings: RenderSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(settings: RenderSettings) -> Self {
        Self::with_id(JobId::new(), settings)
    }

    pub fn with_id(id: JobId, settings: RenderSettings) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            stage: "Queued".to_string(),
            settings,
            created_at: now,
            updated_at: now,
            completed_at: None,
            output_path: None,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// `Queued -> Rendering`.
    pub fn start_rendering(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Rendering)
    }

    /// Record stage progress. Percent is clamped to 100 and never moves
    /// backwards. Returns the effective percent, or `None` if the job is not
    /// rendering.
    pub fn set_progress(&mut self, percent: u8, stage: impl Into<String>) -> Option<u8> {
        if self.status != JobStatus::Rendering {
            return None;
        }
        self.progress = self.progress.max(percent.min(100));
        self.stage = stage.into();
        self.updated_at = Utc::now();
        Some(self.progress)
    }

    /// `Rendering -> Completed`.
    pub fn complete(&mut self, output_path: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.stage = "Complete".to_string();
        self.output_path = Some(output_path.into());
        Ok(())
    }

    /// `Queued | Rendering -> Failed`.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::Failed)?;
        self.stage = "Failed".to_string();
        self.error_message = Some(error.into());
        Ok(())
    }

    /// `Queued | Rendering -> Cancelled`.
    pub fn cancel(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Cancelled)?;
        self.stage = "Cancelled".to_string();
        self.output_path = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(RenderSettings::new("a.mp4"))
    }

    #[test]
    fn test_job_creation() {
        let job = job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_job_status_transitions() {
        let mut job = job();
        job.start_rendering().unwrap();
        assert_eq!(job.status, JobStatus::Rendering);

        assert_eq!(job.set_progress(50, "Processing audio"), Some(50));
        job.complete("out.mp4").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output_path.as_deref(), Some("out.mp4"));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = job();
        job.start_rendering().unwrap();
        job.set_progress(30, "Processing subtitles");
        assert_eq!(job.set_progress(15, "late"), Some(30));
        assert_eq!(job.set_progress(250, "over"), Some(100));
    }

    #[test]
    fn test_progress_ignored_unless_rendering() {
        let mut job = job();
        assert_eq!(job.set_progress(10, "x"), None);
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job();
        job.cancel().unwrap();
        assert!(job.start_rendering().is_err());
        assert!(job.fail("boom").is_err());
        assert!(job.cancel().is_err());
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_queued_can_fail_directly() {
        let mut job = job();
        job.fail("Source video not found").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0);
        assert!(job.complete("x").is_err());
    }

    #[test]
    fn test_queued_cannot_complete() {
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&JobStatus::Cancelled).unwrap(), "\"cancelled\"");
    }
}
