//! Render request model.
//!
//! A [`RenderSettings`] value is created once at submission and never
//! mutated afterwards. Field names follow the web client's camelCase wire
//! format; aliases accept the older editor payloads (`videoPath`,
//! `subtitles`, `exportSettings`, `start`/`end`, effect `type`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::encoding::{
    Bitrate, ContainerFormat, EncodeParams, OutputMetadata, Quality, Resolution,
    DEFAULT_AUDIO_BITRATE, DEFAULT_VIDEO_BITRATE, FALLBACK_FPS,
};
use crate::error::{ModelError, ModelResult};

/// Immutable description of one render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenderSettings {
    /// Path of the base video
    #[serde(alias = "videoPath")]
    #[validate(length(min = 1, message = "source video path is required"))]
    pub source_video_path: String,

    /// Timed text overlays, in composition order
    #[serde(default, alias = "subtitles")]
    pub overlays: Vec<OverlaySpec>,

    /// Candidate audio tracks, in preference order
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrackSpec>,

    /// Visual effects, applied in this order
    #[serde(default)]
    pub effects: Vec<EffectSpec>,

    /// Encoder settings
    #[serde(default, alias = "exportSettings")]
    #[validate(nested)]
    pub output_settings: OutputSettings,

    /// Output file path; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl RenderSettings {
    /// Create settings for a source video with no overlays, audio or effects.
    pub fn new(source_video_path: impl Into<String>) -> Self {
        Self {
            source_video_path: source_video_path.into(),
            overlays: Vec::new(),
            audio_tracks: Vec::new(),
            effects: Vec::new(),
            output_settings: OutputSettings::default(),
            output_path: None,
        }
    }

    pub fn with_overlay(mut self, overlay: OverlaySpec) -> Self {
        self.overlays.push(overlay);
        self
    }

    pub fn with_effect(mut self, kind: impl Into<String>, value: f64) -> Self {
        self.effects.push(EffectSpec::new(kind, value));
        self
    }

    pub fn with_audio_track(mut self, track: AudioTrackSpec) -> Self {
        self.audio_tracks.push(track);
        self
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Requested output path, ignoring blank values.
    pub fn requested_output_path(&self) -> Option<&str> {
        self.output_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Check the top-level request shape.
    ///
    /// Per-item problems in overlays, effects and audio tracks are not
    /// reported here; the render stages contain those individually.
    pub fn check(&self) -> ModelResult<()> {
        if self.source_video_path.trim().is_empty() {
            return Err(ModelError::invalid_settings("source video path is required"));
        }
        self.validate()
            .map_err(|e| ModelError::invalid_settings(e.to_string()))
    }
}

/// Output (encoder) settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OutputSettings {
    /// Frames per second; defaults to the source frame rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(exclusive_min = 0.0, max = 240.0))]
    pub fps: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_bitrate: Option<Bitrate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<Bitrate>,

    #[serde(default, alias = "format")]
    pub container_format: ContainerFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub resolution: Option<Resolution>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OutputMetadata>,
}

impl OutputSettings {
    /// Apply fixed presets for every unset field.
    pub fn resolve(&self, source_fps: Option<f64>) -> EncodeParams {
        let fps = self
            .fps
            .filter(|f| f.is_finite() && *f > 0.0)
            .or(source_fps.filter(|f| f.is_finite() && *f > 0.0))
            .unwrap_or(FALLBACK_FPS);

        let video_codec = non_blank(self.video_codec.as_deref())
            .unwrap_or_else(|| self.container_format.default_video_codec().to_string());
        let audio_codec = non_blank(self.audio_codec.as_deref())
            .unwrap_or_else(|| self.container_format.default_audio_codec().to_string());

        let video_bitrate = self
            .video_bitrate
            .as_ref()
            .and_then(Bitrate::to_ffmpeg)
            .or_else(|| self.quality.map(|q| q.video_bitrate().to_string()))
            .unwrap_or_else(|| DEFAULT_VIDEO_BITRATE.to_string());
        let audio_bitrate = self
            .audio_bitrate
            .as_ref()
            .and_then(Bitrate::to_ffmpeg)
            .unwrap_or_else(|| DEFAULT_AUDIO_BITRATE.to_string());

        EncodeParams {
            fps,
            video_codec,
            video_bitrate,
            audio_codec,
            audio_bitrate,
            container: self.container_format,
            resolution: self.resolution,
            metadata: self.metadata.clone().unwrap_or_default(),
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// A timed text overlay request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySpec {
    #[serde(default)]
    pub text: String,
    #[serde(alias = "start", alias = "startTime")]
    pub start_seconds: f64,
    #[serde(alias = "end", alias = "endTime")]
    pub end_seconds: f64,
    #[serde(default)]
    pub style: OverlayStyle,
}

impl OverlaySpec {
    pub fn new(text: impl Into<String>, start_seconds: f64, end_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            end_seconds,
            style: OverlayStyle::default(),
        }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    /// Whether the time window is usable (`end > start`, both finite, start >= 0).
    pub fn has_valid_window(&self) -> bool {
        self.start_seconds.is_finite()
            && self.end_seconds.is_finite()
            && self.start_seconds >= 0.0
            && self.end_seconds > self.start_seconds
    }
}

/// Overlay styling as submitted. Every field is optional and loosely typed;
/// parsing happens when the overlay is built so that a bad value degrades to
/// the fallback style instead of rejecting the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverlayStyle {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "fontFamily")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

/// Vertical placement of an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Top,
    Center,
    #[default]
    Bottom,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Top => "top",
            Position::Center => "center",
            Position::Bottom => "bottom",
        }
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "top" => Ok(Position::Top),
            "center" | "middle" => Ok(Position::Center),
            "bottom" => Ok(Position::Bottom),
            other => Err(format!("unknown position '{}'", other)),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A visual effect request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EffectSpec {
    /// Effect kind name; unknown kinds are ignored by the effect stage
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: f64,
}

impl EffectSpec {
    pub fn new(kind: impl Into<String>, value: f64) -> Self {
        Self {
            kind: kind.into(),
            value,
        }
    }

    /// Parsed kind, or `None` if the kind is not supported.
    pub fn effect_kind(&self) -> Option<EffectKind> {
        self.kind.parse().ok()
    }
}

/// Supported effect kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Brightness,
    Contrast,
    Saturation,
    Hue,
    Blur,
    Sharpen,
    Vignette,
    Pixelate,
}

impl EffectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::Brightness => "brightness",
            EffectKind::Contrast => "contrast",
            EffectKind::Saturation => "saturation",
            EffectKind::Hue => "hue",
            EffectKind::Blur => "blur",
            EffectKind::Sharpen => "sharpen",
            EffectKind::Vignette => "vignette",
            EffectKind::Pixelate => "pixelate",
        }
    }

    /// The value that leaves the video unchanged.
    pub fn identity(&self) -> f64 {
        match self {
            EffectKind::Saturation | EffectKind::Pixelate => 1.0,
            _ => 0.0,
        }
    }

    /// Accepted value range (inclusive).
    pub fn range(&self) -> (f64, f64) {
        match self {
            EffectKind::Brightness => (-100.0, 100.0),
            EffectKind::Contrast => (-100.0, 200.0),
            EffectKind::Saturation => (0.0, 3.0),
            EffectKind::Hue => (-180.0, 180.0),
            EffectKind::Blur => (0.0, 50.0),
            EffectKind::Sharpen | EffectKind::Vignette => (0.0, 100.0),
            EffectKind::Pixelate => (1.0, 64.0),
        }
    }
}

impl FromStr for EffectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "brightness" => Ok(EffectKind::Brightness),
            "contrast" => Ok(EffectKind::Contrast),
            "saturation" => Ok(EffectKind::Saturation),
            "hue" => Ok(EffectKind::Hue),
            "blur" => Ok(EffectKind::Blur),
            "sharpen" => Ok(EffectKind::Sharpen),
            "vignette" => Ok(EffectKind::Vignette),
            "pixelate" => Ok(EffectKind::Pixelate),
            other => Err(format!("unknown effect '{}'", other)),
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioTrackSpec {
    pub path: String,
    /// Linear gain (1.0 = unchanged)
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "volume")]
    pub gain: Option<f64>,
}

impl AudioTrackSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            gain: None,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = Some(gain);
        self
    }

    /// Gain is absent, or finite and non-negative.
    pub fn has_valid_gain(&self) -> bool {
        self.gain.map_or(true, |g| g.is_finite() && g >= 0.0)
    }
}
