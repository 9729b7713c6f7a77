//! Engine error types.

use reel_media::MediaError;
use reel_models::{JobId, ModelError};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Source video unavailable: {0}")]
    SourceUnavailable(String),

    #[error("{stage} failed: {message}")]
    StageFailed { stage: &'static str, message: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }

    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Wrap a media error raised inside a pipeline stage.
    pub fn stage(stage: &'static str, err: MediaError) -> Self {
        Self::StageFailed {
            stage,
            message: err.describe(),
        }
    }
}
