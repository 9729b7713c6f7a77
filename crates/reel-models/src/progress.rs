//! Progress protocol messages.
//!
//! These messages are what the live stream carries; the JSON shape matches
//! what the editor client already parses (`type` tag, `progress` payload,
//! `outputPath` on completion, `error` on failure).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Render pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadingVideo,
    ApplyingEffects,
    ProcessingSubtitles,
    ProcessingAudio,
    RenderingVideo,
    Complete,
}

impl Stage {
    /// Human-readable label shown to clients.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::LoadingVideo => "Loading video",
            Stage::ApplyingEffects => "Applying effects",
            Stage::ProcessingSubtitles => "Processing subtitles",
            Stage::ProcessingAudio => "Processing audio",
            Stage::RenderingVideo => "Rendering video",
            Stage::Complete => "Complete",
        }
    }

    /// Progress percentage reported when the stage starts.
    pub fn percent(&self) -> u8 {
        match self {
            Stage::LoadingVideo => 5,
            Stage::ApplyingEffects => 15,
            Stage::ProcessingSubtitles => 30,
            Stage::ProcessingAudio => 50,
            Stage::RenderingVideo => 70,
            Stage::Complete => 100,
        }
    }

    /// Map encoder-reported progress (0-100) into the render stage window.
    /// Never reaches 100; only `Complete` does.
    pub fn encode_percent(encoder_percent: f64) -> u8 {
        let start = Stage::RenderingVideo.percent() as f64;
        let span = 99.0 - start;
        let fraction = if encoder_percent.is_finite() {
            (encoder_percent / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (start + span * fraction).floor() as u8
    }
}

/// A single progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// Percentage (0-100)
    pub percent: u8,
    /// Stage label
    pub stage: String,
    /// Seconds since the job entered rendering
    pub elapsed_seconds: f64,
    /// Estimated seconds until completion
    pub estimated_remaining_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_frame: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
}

impl ProgressUpdate {
    /// Build an update, estimating remaining time linearly from elapsed time.
    pub fn new(percent: u8, stage: impl Into<String>, elapsed_seconds: f64) -> Self {
        let percent = percent.min(100);
        Self {
            percent,
            stage: stage.into(),
            elapsed_seconds,
            estimated_remaining_seconds: estimate_remaining(percent, elapsed_seconds),
            current_frame: None,
            total_frames: None,
        }
    }

    pub fn with_frames(mut self, current: u64, total: Option<u64>) -> Self {
        self.current_frame = Some(current);
        self.total_frames = total;
        self
    }

    pub fn with_eta(mut self, seconds: f64) -> Self {
        if seconds.is_finite() && seconds >= 0.0 {
            self.estimated_remaining_seconds = seconds;
        }
        self
    }
}

fn estimate_remaining(percent: u8, elapsed: f64) -> f64 {
    if percent == 0 || percent >= 100 || !elapsed.is_finite() || elapsed <= 0.0 {
        return 0.0;
    }
    elapsed * f64::from(100 - percent) / f64::from(percent)
}

/// Event pushed to a live progress consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportEvent {
    /// Stage progress
    Progress { progress: ProgressUpdate },

    /// Job completed
    Complete {
        #[serde(rename = "outputPath")]
        output_path: String,
    },

    /// Job failed
    Error { error: String },

    /// Job cancelled
    Cancelled,
}

impl ExportEvent {
    pub fn progress(update: ProgressUpdate) -> Self {
        ExportEvent::Progress { progress: update }
    }

    pub fn complete(output_path: impl Into<String>) -> Self {
        ExportEvent::Complete {
            output_path: output_path.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        ExportEvent::Error {
            error: error.into(),
        }
    }

    /// Terminal events end the stream for a job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExportEvent::Progress { .. })
    }

    /// Message type tag as sent on the wire.
    pub fn type_str(&self) -> &'static str {
        match self {
            ExportEvent::Progress { .. } => "progress",
            ExportEvent::Complete { .. } => "complete",
            ExportEvent::Error { .. } => "error",
            ExportEvent::Cancelled => "cancelled",
        }
    }
}
