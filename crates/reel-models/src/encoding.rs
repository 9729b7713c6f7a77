//! Video encoding configuration and export presets.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default video bitrate (matches the "medium" quality level)
pub const DEFAULT_VIDEO_BITRATE: &str = "3000k";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
/// Frame rate used when neither the request nor the source provides one
pub const FALLBACK_FPS: f64 = 30.0;
/// Largest accepted output dimension
pub const MAX_DIMENSION: u32 = 8192;

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Mp4,
    Webm,
    Mov,
    Avi,
    Mkv,
}

impl ContainerFormat {
    /// File extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Webm => "webm",
            ContainerFormat::Mov => "mov",
            ContainerFormat::Avi => "avi",
            ContainerFormat::Mkv => "mkv",
        }
    }

    /// Muxer name passed to FFmpeg `-f`.
    pub fn muxer(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Webm => "webm",
            ContainerFormat::Mov => "mov",
            ContainerFormat::Avi => "avi",
            ContainerFormat::Mkv => "matroska",
        }
    }

    /// Video codec used when the request does not name one.
    pub fn default_video_codec(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "libvpx-vp9",
            _ => DEFAULT_VIDEO_CODEC,
        }
    }

    /// Audio codec used when the request does not name one.
    pub fn default_audio_codec(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "libopus",
            _ => DEFAULT_AUDIO_CODEC,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Quality level, mapped to a video bitrate when none is given explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
    Ultra,
}

impl Quality {
    pub fn video_bitrate(&self) -> &'static str {
        match self {
            Quality::Low => "1000k",
            Quality::Medium => "3000k",
            Quality::High => "8000k",
            Quality::Ultra => "20000k",
        }
    }
}

/// Bitrate given either as kbps number (`192`) or FFmpeg string (`"192k"`, `"5M"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Bitrate {
    Kbps(u32),
    Text(String),
}

impl Bitrate {
    /// Render as an FFmpeg bitrate argument. Returns `None` for unusable values.
    pub fn to_ffmpeg(&self) -> Option<String> {
        match self {
            Bitrate::Kbps(0) => None,
            Bitrate::Kbps(kbps) => Some(format!("{}k", kbps)),
            Bitrate::Text(s) => {
                let s = s.trim();
                let digits = s.trim_end_matches(['k', 'K', 'm', 'M']);
                if digits.is_empty() || digits.parse::<f64>().map_or(true, |v| v <= 0.0) {
                    None
                } else {
                    Some(s.to_string())
                }
            }
        }
    }
}

/// Output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct Resolution {
    #[validate(range(min = 1, max = 8192))]
    pub width: u32,
    #[validate(range(min = 1, max = 8192))]
    pub height: u32,
}

/// Container metadata tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutputMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

impl OutputMetadata {
    /// Non-empty `(key, value)` pairs in a stable order.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("title", self.title.as_deref()),
            ("description", self.description.as_deref()),
            ("artist", self.artist.as_deref()),
            ("album", self.album.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.filter(|v| !v.trim().is_empty()).map(|v| (k, v)))
        .collect()
    }
}

/// Fully resolved encoder parameters (all defaults applied).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeParams {
    pub fps: f64,
    pub video_codec: String,
    pub video_bitrate: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub container: ContainerFormat,
    pub resolution: Option<Resolution>,
    pub metadata: OutputMetadata,
}

impl EncodeParams {
    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-r".to_string(),
            format_fps(self.fps),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-b:v".to_string(),
            self.video_bitrate.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ];

        for (key, value) in self.metadata.entries() {
            args.push("-metadata".to_string());
            args.push(format!("{}={}", key, value));
        }

        if self.container == ContainerFormat::Mp4 || self.container == ContainerFormat::Mov {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }

        args.extend(["-f".to_string(), self.container.muxer().to_string()]);
        args
    }
}

fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{:.3}", fps)
    }
}

/// A named export preset offered to clients.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportPreset {
    pub name: String,
    pub format: ContainerFormat,
    pub resolution: Resolution,
    pub quality: Quality,
    pub fps: u32,
    pub audio_codec: String,
    pub audio_bitrate: u32,
    pub video_bitrate: String,
}

/// Built-in export presets.
pub fn builtin_presets() -> Vec<ExportPreset> {
    vec![
        ExportPreset {
            name: "720p HD".to_string(),
            format: ContainerFormat::Mp4,
            resolution: Resolution { width: 1280, height: 720 },
            quality: Quality::Medium,
            fps: 30,
            audio_codec: "aac".to_string(),
            audio_bitrate: 128,
            video_bitrate: "5M".to_string(),
        },
        ExportPreset {
            name: "1080p Full HD".to_string(),
            format: ContainerFormat::Mp4,
            resolution: Resolution { width: 1920, height: 1080 },
            quality: Quality::High,
            fps: 30,
            audio_codec: "aac".to_string(),
            audio_bitrate: 192,
            video_bitrate: "15M".to_string(),
        },
        ExportPreset {
            name: "1080p WebM".to_string(),
            format: ContainerFormat::Webm,
            resolution: Resolution { width: 1920, height: 1080 },
            quality: Quality::High,
            fps: 30,
            audio_codec: "libopus".to_string(),
            audio_bitrate: 192,
            video_bitrate: "12M".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_forms() {
        assert_eq!(Bitrate::Kbps(192).to_ffmpeg().as_deref(), Some("192k"));
        assert_eq!(Bitrate::Text("5M".into()).to_ffmpeg().as_deref(), Some("5M"));
        assert_eq!(Bitrate::Kbps(0).to_ffmpeg(), None);
        assert_eq!(Bitrate::Text("fast".into()).to_ffmpeg(), None);
        assert_eq!(Bitrate::Text("-3k".into()).to_ffmpeg(), None);
    }

    #[test]
    fn test_bitrate_deserializes_number_or_string() {
        let n: Bitrate = serde_json::from_str("256").unwrap();
        assert_eq!(n, Bitrate::Kbps(256));
        let s: Bitrate = serde_json::from_str("\"320k\"").unwrap();
        assert_eq!(s, Bitrate::Text("320k".into()));
    }

    #[test]
    fn test_webm_defaults() {
        assert_eq!(ContainerFormat::Webm.default_video_codec(), "libvpx-vp9");
        assert_eq!(ContainerFormat::Webm.default_audio_codec(), "libopus");
        assert_eq!(ContainerFormat::Mkv.muxer(), "matroska");
    }

    #[test]
    fn test_ffmpeg_args() {
        let params = EncodeParams {
            fps: 29.97,
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            video_bitrate: DEFAULT_VIDEO_BITRATE.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            container: ContainerFormat::Mp4,
            resolution: None,
            metadata: OutputMetadata {
                title: Some("Surah".into()),
                artist: Some("  ".into()),
                ..Default::default()
            },
        };
        let args = params.to_ffmpeg_args();
        assert!(args.contains(&"29.970".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"title=Surah".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("artist=")));
        assert!(args.contains(&"+faststart".to_string()));
    }

    #[test]
    fn test_presets() {
        let presets = builtin_presets();
        assert_eq!(presets.len(), 3);
        assert_eq!(presets[2].format, ContainerFormat::Webm);
    }
}
