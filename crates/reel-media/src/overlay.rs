//! Text overlay compositing.
//!
//! Overlays with an unusable time window (or no text) are dropped. An
//! overlay whose style cannot be built keeps its text and window and is
//! drawn with [`TextStyle::fallback`].

use reel_models::{OverlaySpec, OverlayStyle, Position};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::contain::{collect_continue, Contained};
use crate::stream::{FilterNode, VideoStream};

const DEFAULT_FONT: &str = "Sans";
const DEFAULT_FONT_SIZE: u32 = 48;
const MAX_FONT_SIZE: f64 = 512.0;
const MAX_STROKE_WIDTH: f64 = 50.0;

/// Why an overlay was dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverlayError {
    #[error("overlay '{text}' has an invalid time window [{start}, {end}]")]
    InvalidWindow { text: String, start: f64, end: f64 },

    #[error("overlay at {start}s has no text")]
    EmptyText { start: f64 },
}

/// Why an overlay style could not be built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StyleError {
    #[error("invalid {field} '{value}'")]
    InvalidColor { field: &'static str, value: String },

    #[error("invalid font size {0}")]
    InvalidFontSize(f64),

    #[error("invalid stroke width {0}")]
    InvalidStrokeWidth(f64),

    #[error("invalid font '{0}'")]
    InvalidFont(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("invalid opacity {0}")]
    InvalidOpacity(f64),
}

/// An RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Alpha in 0.0..=1.0
    pub a: f64,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(..)`, `rgba(..)` or a
    /// basic colour name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(body) = s.strip_prefix("rgba(").and_then(|b| b.strip_suffix(')')) {
            return parse_functional(body, true);
        }
        if let Some(body) = s.strip_prefix("rgb(").and_then(|b| b.strip_suffix(')')) {
            return parse_functional(body, false);
        }
        named_color(&s)
    }

    fn with_opacity(self, opacity: f64) -> Self {
        Self {
            a: (self.a * opacity).clamp(0.0, 1.0),
            ..self
        }
    }

    /// FFmpeg colour syntax (`0xRRGGBB@alpha`).
    pub fn to_ffmpeg(&self) -> String {
        format!("0x{:02X}{:02X}{:02X}@{:.3}", self.r, self.g, self.b, self.a)
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut it = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
            Some(Rgba::opaque(it.next()??, it.next()??, it.next()??))
        }
        6 | 8 if hex.is_ascii() => {
            let mut color = Rgba::opaque(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?);
            if hex.len() == 8 {
                color.a = f64::from(byte(&hex[6..8])?) / 255.0;
            }
            Some(color)
        }
        _ => None,
    }
}

fn parse_functional(body: &str, with_alpha: bool) -> Option<Rgba> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != if with_alpha { 4 } else { 3 } {
        return None;
    }
    let channel = |s: &str| s.parse::<u8>().ok();
    let mut color = Rgba::opaque(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?);
    if with_alpha {
        let a: f64 = parts[3].parse().ok()?;
        if !(0.0..=1.0).contains(&a) {
            return None;
        }
        color.a = a;
    }
    Some(color)
}

fn named_color(name: &str) -> Option<Rgba> {
    let color = match name {
        "white" => Rgba::WHITE,
        "black" => Rgba::BLACK,
        "red" => Rgba::opaque(255, 0, 0),
        "green" => Rgba::opaque(0, 128, 0),
        "blue" => Rgba::opaque(0, 0, 255),
        "yellow" => Rgba::opaque(255, 255, 0),
        "cyan" => Rgba::opaque(0, 255, 255),
        "magenta" => Rgba::opaque(255, 0, 255),
        "orange" => Rgba::opaque(255, 165, 0),
        "gray" | "grey" => Rgba::opaque(128, 128, 128),
        "transparent" => Rgba { a: 0.0, ..Rgba::BLACK },
        _ => return None,
    };
    Some(color)
}

/// Resolved overlay style.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: String,
    pub font_size: u32,
    pub color: Rgba,
    pub background: Option<Rgba>,
    pub stroke: Option<(Rgba, f64)>,
    pub position: Position,
    pub opacity: f64,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: DEFAULT_FONT.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            color: Rgba::WHITE,
            background: None,
            stroke: None,
            position: Position::Bottom,
            opacity: 1.0,
        }
    }
}

impl TextStyle {
    /// Style used when the requested one cannot be built: white on a
    /// translucent black box, centered.
    pub fn fallback() -> Self {
        Self {
            background: Some(Rgba { a: 0.6, ..Rgba::BLACK }),
            position: Position::Center,
            ..Self::default()
        }
    }

    /// Build a style from request values, starting from the defaults.
    pub fn try_from_spec(spec: &OverlayStyle) -> Result<Self, StyleError> {
        let mut style = Self::default();

        if let Some(font) = spec.font.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            if font.chars().any(|c| matches!(c, '\'' | '\\' | ':' | ';' | ',' | '[' | ']') || c.is_control()) {
                return Err(StyleError::InvalidFont(font.to_string()));
            }
            style.font = font.to_string();
        }

        if let Some(size) = spec.font_size {
            if !size.is_finite() || size < 1.0 || size > MAX_FONT_SIZE {
                return Err(StyleError::InvalidFontSize(size));
            }
            style.font_size = size.round() as u32;
        }

        if let Some(color) = spec.color.as_deref() {
            style.color = parse_color("color", color)?;
        }
        if let Some(bg) = spec.background_color.as_deref() {
            style.background = Some(parse_color("background color", bg)?);
        }

        let stroke_width = match spec.stroke_width {
            Some(w) if !w.is_finite() || w < 0.0 || w > MAX_STROKE_WIDTH => {
                return Err(StyleError::InvalidStrokeWidth(w));
            }
            other => other,
        };
        let stroke_color = spec
            .stroke_color
            .as_deref()
            .map(|c| parse_color("stroke color", c))
            .transpose()?;
        style.stroke = match (stroke_color, stroke_width) {
            (_, Some(w)) if w == 0.0 => None,
            (Some(color), width) => Some((color, width.unwrap_or(2.0))),
            (None, Some(width)) => Some((Rgba::BLACK, width)),
            (None, None) => None,
        };

        if let Some(position) = spec.position.as_deref() {
            style.position = position.parse().map_err(StyleError::InvalidPosition)?;
        }

        if let Some(opacity) = spec.opacity {
            if !opacity.is_finite() {
                return Err(StyleError::InvalidOpacity(opacity));
            }
            style.opacity = opacity.clamp(0.0, 1.0);
        }

        Ok(style)
    }

    fn font_option(&self) -> String {
        let lower = self.font.to_lowercase();
        if lower.ends_with(".ttf") || lower.ends_with(".otf") || lower.ends_with(".ttc") {
            format!("fontfile='{}'", self.font)
        } else {
            format!("font='{}'", self.font)
        }
    }
}

fn parse_color(field: &'static str, value: &str) -> Result<Rgba, StyleError> {
    Rgba::parse(value).ok_or_else(|| StyleError::InvalidColor {
        field,
        value: value.to_string(),
    })
}

/// An overlay ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableOverlay {
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub style: TextStyle,
    /// Set when the requested style was replaced by the fallback
    pub style_error: Option<String>,
}

impl RenderableOverlay {
    /// FFmpeg `drawtext` filter reading the overlay text from `text_file`.
    ///
    /// Text goes through a file so that quotes, colons and percent signs in
    /// user text need no filter-graph escaping.
    pub fn drawtext_filter(&self, text_file: &Path) -> String {
        let style = &self.style;
        let mut opts = vec![
            style.font_option(),
            format!("textfile='{}'", escape_path(text_file)),
            "expansion=none".to_string(),
            format!("fontsize={}", style.font_size),
            format!("fontcolor={}", style.color.with_opacity(style.opacity).to_ffmpeg()),
        ];
        if let Some(bg) = style.background {
            opts.push("box=1".to_string());
            opts.push(format!("boxcolor={}", bg.with_opacity(style.opacity).to_ffmpeg()));
            opts.push(format!("boxborderw={}", (style.font_size / 4).max(4)));
        }
        if let Some((color, width)) = style.stroke {
            opts.push(format!("borderw={}", width.round() as u32));
            opts.push(format!("bordercolor={}", color.with_opacity(style.opacity).to_ffmpeg()));
        }
        opts.push("x=(w-text_w)/2".to_string());
        opts.push(format!("y={}", y_expression(style.position)));
        opts.push(format!(
            "enable='between(t,{:.3},{:.3})'",
            self.start_seconds, self.end_seconds
        ));
        format!("drawtext={}", opts.join(":"))
    }
}

fn y_expression(position: Position) -> &'static str {
    match position {
        Position::Top => "h/20",
        Position::Center => "(h-text_h)/2",
        Position::Bottom => "h-text_h-h/20",
    }
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
}

/// Builds overlays from requests and composites them onto a stream.
#[derive(Debug, Clone, Default)]
pub struct OverlayCompositor;

impl OverlayCompositor {
    pub fn new() -> Self {
        Self
    }

    /// Turn overlay requests into drawable overlays, preserving order.
    pub fn build(&self, specs: &[OverlaySpec]) -> Contained<Vec<RenderableOverlay>> {
        let out = collect_continue(specs, |spec| self.build_one(spec));
        for error in &out.errors {
            warn!(error = %error, "Dropping overlay");
        }
        out
    }

    fn build_one(&self, spec: &OverlaySpec) -> Result<RenderableOverlay, OverlayError> {
        if !spec.has_valid_window() {
            return Err(OverlayError::InvalidWindow {
                text: spec.text.clone(),
                start: spec.start_seconds,
                end: spec.end_seconds,
            });
        }
        if spec.text.trim().is_empty() {
            return Err(OverlayError::EmptyText {
                start: spec.start_seconds,
            });
        }

        let (style, style_error) = match TextStyle::try_from_spec(&spec.style) {
            Ok(style) => (style, None),
            Err(e) => {
                warn!(error = %e, text = %spec.text, "Using fallback overlay style");
                (TextStyle::fallback(), Some(e.to_string()))
            }
        };

        Ok(RenderableOverlay {
            text: spec.text.clone(),
            start_seconds: spec.start_seconds,
            end_seconds: spec.end_seconds,
            style,
            style_error,
        })
    }

    /// Draw `overlays` onto the stream, in order. Later overlays draw on top.
    pub fn composite(&self, stream: VideoStream, overlays: Vec<RenderableOverlay>) -> VideoStream {
        overlays
            .into_iter()
            .fold(stream, |stream, overlay| stream.with_node(FilterNode::Text(overlay)))
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

    #[test]
    fn test_color_parsing() {
        assert_eq!(Rgba::parse("#fff"), Some(Rgba::WHITE));
        assert_eq!(Rgba::parse("#FF0000"), Some(Rgba::opaque(255, 0, 0)));
        assert_eq!(Rgba::parse("rgb(1, 2, 3)"), Some(Rgba::opaque(1, 2, 3)));
        assert_eq!(Rgba::parse("rgba(0,0,0,0.5)").map(|c| c.a), Some(0.5));
        assert_eq!(Rgba::parse("#00000080").map(|c| c.r), Some(0));
        assert_eq!(Rgba::parse("Yellow"), Some(Rgba::opaque(255, 255, 0)));
        assert_eq!(Rgba::parse("#ggg"), None);
        assert_eq!(Rgba::parse("chartreuse-ish"), None);
        assert_eq!(Rgba::WHITE.to_ffmpeg(), "0xFFFFFF@1.000");
    }

    #[test]
    fn test_empty_overlays_is_identity() {
        let compositor = OverlayCompositor::new();
        let built = compositor.build(&[]);
        assert!(built.value.is_empty());
        assert_eq!(compositor.composite(stream(), built.value), stream());
    }

    #[test]
    fn test_invalid_window_dropped() {
        let built = OverlayCompositor::new().build(&[
            OverlaySpec::new("X", 0.0, -1.0),
            OverlaySpec::new("ok", 1.0, 2.0),
            OverlaySpec::new("  ", 1.0, 2.0),
        ]);
        assert_eq!(built.value.len(), 1);
        assert_eq!(built.value[0].text, "ok");
        assert_eq!(built.errors.len(), 2);
    }

    #[test]
    fn test_bad_style_uses_fallback() {
        let spec = OverlaySpec::new("Hello", 0.0, 2.0).with_style(OverlayStyle {
            color: Some("not-a-color".into()),
            font_size: Some(72.0),
            ..Default::default()
        });
        let built = OverlayCompositor::new().build(&[spec]);
        assert_eq!(built.value.len(), 1);
        let overlay = &built.value[0];
        assert_eq!(overlay.text, "Hello");
        assert_eq!(overlay.end_seconds, 2.0);
        assert_eq!(overlay.style, TextStyle::fallback());
        assert!(overlay.style_error.as_deref().unwrap().contains("not-a-color"));
        assert!(!built.has_errors());
    }

    #[test]
    fn test_style_values_applied() {
        let style = TextStyle::try_from_spec(&OverlayStyle {
            font: Some("DejaVu Sans".into()),
            font_size: Some(36.0),
            color: Some("#ffcc00".into()),
            stroke_width: Some(3.0),
            position: Some("top".into()),
            opacity: Some(0.5),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(style.font, "DejaVu Sans");
        assert_eq!(style.font_size, 36);
        assert_eq!(style.stroke, Some((Rgba::BLACK, 3.0)));
        assert_eq!(style.position, Position::Top);

        assert!(TextStyle::try_from_spec(&OverlayStyle {
            font_size: Some(0.0),
            ..Default::default()
        })
        .is_err());
        let clamped = TextStyle::try_from_spec(&OverlayStyle {
            opacity: Some(-0.5),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(clamped.opacity, 0.0);
        assert!(TextStyle::try_from_spec(&OverlayStyle {
            opacity: Some(f64::NAN),
            ..Default::default()
        })
        .is_err());
        assert!(TextStyle::try_from_spec(&OverlayStyle {
            position: Some("left".into()),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_composite_preserves_order() {
        let compositor = OverlayCompositor::new();
        let built = compositor.build(&[
            OverlaySpec::new("first", 0.0, 3.0),
            OverlaySpec::new("second", 1.0, 2.0),
        ]);
        let stream = compositor.composite(stream(), built.value);
        let texts: Vec<_> = stream.overlays().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_drawtext_filter() {
        let overlay = OverlayCompositor::new()
            .build(&[OverlaySpec::new("it's 5:00", 1.5, 4.0)])
            .value
            .remove(0);
        let filter = overlay.drawtext_filter(Path::new("/tmp/job/overlay_0.txt"));
        assert!(filter.starts_with("drawtext=font='Sans':textfile='/tmp/job/overlay_0.txt'"));
        assert!(filter.contains("fontsize=48"));
        assert!(filter.contains("enable='between(t,1.500,4.000)'"));
        assert!(filter.contains("y=h-text_h-h/20"));
        assert!(!filter.contains("it's"));
    }

    #[test]
    fn test_background_color_drawn_as_requested() {
        let style = TextStyle::try_from_spec(&OverlayStyle {
            background_color: Some("#000000".into()),
            ..Default::default()
        })
        .unwrap();
        let overlay = RenderableOverlay {
            text: "Hi".into(),
            start_seconds: 0.0,
            end_seconds: 1.0,
            style,
            style_error: None,
        };
        let filter = overlay.drawtext_filter(Path::new("/s/overlay_0.txt"));
        assert!(filter.contains("boxcolor=0x000000@1.000"), "{}", filter);

        let fallback = RenderableOverlay {
            style: TextStyle::fallback(),
            ..overlay
        };
        let filter = fallback.drawtext_filter(Path::new("/s/overlay_0.txt"));
        assert!(filter.contains("boxcolor=0x000000@0.600"), "{}", filter);
    }
}
