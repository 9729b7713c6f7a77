//! Shared data models for the Reel export engine.
//!
//! This crate provides Serde-serializable types for:
//! - Render requests (source, overlays, audio tracks, effects, output settings)
//! - Export jobs and their status machine
//! - Encoding presets and defaults
//! - Progress events pushed to live consumers

pub mod encoding;
pub mod error;
pub mod job;
pub mod progress;
pub mod settings;

// Re-export common types
pub use encoding::{
    builtin_presets, Bitrate, ContainerFormat, EncodeParams, ExportPreset, OutputMetadata,
    Quality, Resolution,
};
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobId, JobStatus};
pub use progress::{ExportEvent, ProgressUpdate, Stage};
pub use settings::{
    AudioTrackSpec, EffectKind, EffectSpec, OutputSettings, OverlaySpec, OverlayStyle, Position,
    RenderSettings,
};
