//! FFmpeg-based media operations for the export pipeline.
//!
//! This crate provides:
//! - Video probing ([`MediaProbe`])
//! - Media path resolution ([`MediaStore`])
//! - The in-flight [`VideoStream`] value and the stages that transform it:
//!   effects, text overlays and audio attachment
//! - The final encode via FFmpeg ([`Encoder`])

pub mod audio;
pub mod command;
pub mod contain;
pub mod effects;
pub mod encoder;
pub mod error;
pub mod overlay;
pub mod probe;
pub mod progress;
pub mod storage;
pub mod stream;

pub use audio::AudioAttacher;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use contain::Contained;
pub use effects::{AppliedEffect, EffectError, EffectStage};
pub use encoder::{EncodeOutput, EncodeRequest, Encoder, FfmpegEncoder, FilterGraph};
pub use error::{MediaError, MediaResult};
pub use overlay::{OverlayCompositor, OverlayError, RenderableOverlay, Rgba, StyleError, TextStyle};
pub use probe::{FfprobeProbe, MediaProbe, VideoInfo};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use storage::{LocalMediaStore, MediaStore};
pub use stream::{AudioSource, FilterNode, StreamHandle, VideoStream};
