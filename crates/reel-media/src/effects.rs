//! Visual effects stage.
//!
//! Effects are applied strictly in request order. Colour effects are
//! defined per sample (clamped to 0..=255 after each effect), which makes
//! the order observable: brightness then contrast is not contrast then
//! brightness.

use reel_models::{EffectKind, EffectSpec};
use thiserror::Error;
use tracing::warn;

use crate::contain::{fold_continue, Contained};
use crate::stream::{FilterNode, VideoStream};

/// Why a single effect could not be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EffectError {
    #[error("effect '{kind}' has a non-finite value")]
    NonFinite { kind: EffectKind },

    #[error("effect '{kind}' value {value} is outside [{min}, {max}]")]
    OutOfRange {
        kind: EffectKind,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// A validated effect, ready to be placed in the filter chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedEffect {
    pub kind: EffectKind,
    pub value: f64,
}

impl AppliedEffect {
    pub fn new(kind: EffectKind, value: f64) -> Self {
        Self { kind, value }
    }

    /// Validate a requested value for `kind`.
    pub fn validated(kind: EffectKind, value: f64) -> Result<Self, EffectError> {
        if !value.is_finite() {
            return Err(EffectError::NonFinite { kind });
        }
        let (min, max) = kind.range();
        if value < min || value > max {
            return Err(EffectError::OutOfRange {
                kind,
                value,
                min,
                max,
            });
        }
        Ok(Self::new(kind, value))
    }

    pub fn is_identity(&self) -> bool {
        match self.kind {
            EffectKind::Pixelate => self.value.round() <= 1.0,
            kind => self.value == kind.identity(),
        }
    }

    /// FFmpeg filter for this effect.
    pub fn ffmpeg_filter(&self) -> String {
        let v = self.value;
        match self.kind {
            EffectKind::Brightness => format!("eq=brightness={}", num(v / 100.0)),
            EffectKind::Contrast => format!("eq=contrast={}", num(1.0 + v / 100.0)),
            EffectKind::Saturation => format!("eq=saturation={}", num(v)),
            EffectKind::Hue => format!("hue=h={}", num(v)),
            EffectKind::Blur => format!("gblur=sigma={}", num(v)),
            EffectKind::Sharpen => format!("unsharp=5:5:{}", num(v / 100.0 * 1.5)),
            EffectKind::Vignette => {
                format!("vignette=angle={}", num(v / 100.0 * std::f64::consts::FRAC_PI_2))
            }
            EffectKind::Pixelate => {
                let n = v.round().max(1.0) as u32;
                if n <= 1 {
                    "null".to_string()
                } else {
                    format!(
                        "scale=iw/{n}:ih/{n}:flags=neighbor,scale=iw*{n}:ih*{n}:flags=neighbor",
                        n = n
                    )
                }
            }
        }
    }

    /// Apply the effect to one RGB sample.
    pub fn apply_sample(&self, rgb: [u8; 3]) -> [u8; 3] {
        let v = self.value;
        match self.kind {
            EffectKind::Brightness => {
                let offset = v / 100.0 * 255.0;
                rgb.map(|c| clamp_channel(f64::from(c) + offset))
            }
            EffectKind::Contrast => {
                let factor = 1.0 + v / 100.0;
                rgb.map(|c| clamp_channel((f64::from(c) - 128.0) * factor + 128.0))
            }
            EffectKind::Saturation => {
                let [r, g, b] = rgb.map(f64::from);
                let luma = 0.299 * r + 0.587 * g + 0.114 * b;
                [r, g, b].map(|c| clamp_channel(luma + (c - luma) * v))
            }
            _ => rgb,
        }
    }
}

fn clamp_channel(c: f64) -> u8 {
    c.round().clamp(0.0, 255.0) as u8
}

/// Format a filter argument without trailing zeros.
fn num(v: f64) -> String {
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Applies the requested effects to a stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectStage;

impl EffectStage {
    pub fn new() -> Self {
        Self
    }

    /// Apply `effects` in order. Unknown kinds are ignored. An effect that
    /// fails validation is skipped and the stream from before it is carried
    /// forward; the failure is returned in [`Contained::errors`].
    pub fn apply(&self, stream: VideoStream, effects: &[EffectSpec]) -> Contained<VideoStream> {
        let known = effects.iter().filter_map(|spec| {
            let kind = spec.effect_kind();
            if kind.is_none() {
                warn!(effect = %spec.kind, "Ignoring unknown effect");
            }
            kind.map(|k| (k, spec.value))
        });

        let out = fold_continue(stream, known, |stream, (kind, value)| {
            AppliedEffect::validated(*kind, *value)
                .map(|effect| stream.clone().with_node(FilterNode::Effect(effect)))
        });

        for error in &out.errors {
            warn!(error = %error, "Skipping effect");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::VideoInfo;

    fn stream() -> VideoStream {
        VideoStream::open(
            "a.mp4",
            VideoInfo {
                duration: 4.0,
                width: 640,
                height: 360,
                fps: Some(25.0),
                codec: "h264".into(),
                has_audio: false,
                size: 0,
            },
        )
    }

    fn spec(kind: &str, value: f64) -> EffectSpec {
        EffectSpec::new(kind, value)
    }

    #[test]
    fn test_empty_effects_is_identity() {
        let out = EffectStage::new().apply(stream(), &[]);
        assert_eq!(out.value, stream());
        assert!(!out.has_errors());
    }

    #[test]
    fn test_order_matters_for_brightness_and_contrast() {
        let stage = EffectStage::new();
        let a = stage
            .apply(stream(), &[spec("brightness", 20.0), spec("contrast", 50.0)])
            .into_value();
        let b = stage
            .apply(stream(), &[spec("contrast", 50.0), spec("brightness", 20.0)])
            .into_value();
        assert_eq!(a.sample([100, 100, 100]), [163, 163, 163]);
        assert_eq!(b.sample([100, 100, 100]), [137, 137, 137]);
    }

    #[test]
    fn test_order_matters_for_brightness_and_saturation() {
        let stage = EffectStage::new();
        let px = [200, 100, 50];
        let a = stage
            .apply(stream(), &[spec("brightness", 50.0), spec("saturation", 0.5)])
            .into_value();
        let b = stage
            .apply(stream(), &[spec("saturation", 0.5), spec("brightness", 50.0)])
            .into_value();
        assert_ne!(a.sample(px), b.sample(px));
    }

    #[test]
    fn test_identity_effect_commutes() {
        let stage = EffectStage::new();
        let pairs = [
            (spec("brightness", 0.0), spec("contrast", 40.0)),
            (spec("saturation", 1.0), spec("contrast", 40.0)),
            (spec("saturation", 1.0), spec("brightness", -25.0)),
            (spec("contrast", 0.0), spec("saturation", 2.0)),
        ];
        for (identity, other) in pairs {
            let a = stage
                .apply(stream(), &[identity.clone(), other.clone()])
                .into_value();
            let b = stage.apply(stream(), &[other, identity]).into_value();
            for px in [[0, 0, 0], [90, 128, 200], [30, 220, 60], [255, 255, 255]] {
                assert_eq!(a.sample(px), b.sample(px), "{:?}", px);
            }
        }
    }

    #[test]
    fn test_unknown_effect_ignored() {
        let out = EffectStage::new().apply(stream(), &[spec("sparkle", 3.0), spec("blur", 2.0)]);
        assert_eq!(out.value.effects().count(), 1);
        assert!(!out.has_errors());
    }

    #[test]
    fn test_invalid_effect_skipped_rest_applied() {
        let out = EffectStage::new().apply(
            stream(),
            &[
                spec("brightness", 10.0),
                spec("contrast", 900.0),
                spec("saturation", 1.5),
            ],
        );
        let kinds: Vec<_> = out.value.effects().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EffectKind::Brightness, EffectKind::Saturation]);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("contrast"));
    }

    #[test]
    fn test_ffmpeg_filters() {
        assert_eq!(AppliedEffect::new(EffectKind::Brightness, 20.0).ffmpeg_filter(), "eq=brightness=0.2");
        assert_eq!(AppliedEffect::new(EffectKind::Contrast, 50.0).ffmpeg_filter(), "eq=contrast=1.5");
        assert_eq!(AppliedEffect::new(EffectKind::Hue, -90.0).ffmpeg_filter(), "hue=h=-90");
        assert_eq!(AppliedEffect::new(EffectKind::Pixelate, 1.0).ffmpeg_filter(), "null");
        assert!(AppliedEffect::new(EffectKind::Pixelate, 8.0)
            .ffmpeg_filter()
            .starts_with("scale=iw/8:ih/8"));
    }

    #[test]
    fn test_clamping() {
        let e = AppliedEffect::new(EffectKind::Brightness, 100.0);
        assert_eq!(e.apply_sample([10, 200, 255]), [255, 255, 255]);
        let e = AppliedEffect::new(EffectKind::Contrast, -100.0);
        assert_eq!(e.apply_sample([0, 255, 40]), [128, 128, 128]);
    }
}
