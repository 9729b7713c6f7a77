//! In-flight render value.
//!
//! A [`VideoStream`] is the thing the pipeline stages transform: the probed
//! source plus an ordered list of filter nodes and the chosen audio source.
//! Stages take a stream and return a new one; nothing is encoded until the
//! [`Encoder`](crate::encoder::Encoder) turns the stream into a filter graph.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::effects::AppliedEffect;
use crate::error::MediaResult;
use crate::overlay::RenderableOverlay;
use crate::probe::VideoInfo;

/// One node of the video filter chain, in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Effect(AppliedEffect),
    Text(RenderableOverlay),
}

/// Where the output's audio comes from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AudioSource {
    /// Keep whatever audio the source video carries
    #[default]
    Original,
    /// Replace it with an external track
    External { path: PathBuf, gain: Option<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStream {
    source: PathBuf,
    info: VideoInfo,
    nodes: Vec<FilterNode>,
    audio: AudioSource,
}

impl VideoStream {
    pub fn open(source: impl Into<PathBuf>, info: VideoInfo) -> Self {
        Self {
            source: source.into(),
            info,
            nodes: Vec::new(),
            audio: AudioSource::Original,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn audio(&self) -> &AudioSource {
        &self.audio
    }

    pub fn effects(&self) -> impl Iterator<Item = &AppliedEffect> {
        self.nodes.iter().filter_map(|n| match n {
            FilterNode::Effect(e) => Some(e),
            FilterNode::Text(_) => None,
        })
    }

    pub fn overlays(&self) -> impl Iterator<Item = &RenderableOverlay> {
        self.nodes.iter().filter_map(|n| match n {
            FilterNode::Text(o) => Some(o),
            FilterNode::Effect(_) => None,
        })
    }

    pub fn with_node(mut self, node: FilterNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_audio(mut self, audio: AudioSource) -> Self {
        self.audio = audio;
        self
    }

    /// Evaluate the colour effects of the chain on one RGB sample, in order.
    /// Spatial effects (blur, sharpen, vignette, pixelate) and text leave a
    /// single sample unchanged.
    pub fn sample(&self, rgb: [u8; 3]) -> [u8; 3] {
        self.effects().fold(rgb, |px, effect| effect.apply_sample(px))
    }
}

/// Per-job scratch directory for filter scripts and overlay text files.
///
/// Removed on [`StreamHandle::release`], or on drop if release is never
/// reached.
#[derive(Debug)]
pub struct StreamHandle {
    dir: TempDir,
}

impl StreamHandle {
    /// Create a scratch directory under `work_root` (system temp dir when
    /// `None`).
    pub fn open(work_root: Option<&Path>, label: &str) -> MediaResult<Self> {
        let prefix = format!("reel-{}-", label);
        let dir = match work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix(&prefix).tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix(&prefix).tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the scratch directory and everything in it.
    pub fn release(self) -> MediaResult<()> {
        self.dir.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::EffectKind;

    fn info() -> VideoInfo {
        VideoInfo {
            duration: 10.0,
            width: 1280,
            height: 720,
            fps: Some(30.0),
            codec: "h264".into(),
            has_audio: true,
            size: 0,
        }
    }

    #[test]
    fn test_sample_applies_effects_in_order() {
        let stream = VideoStream::open("a.mp4", info())
            .with_node(FilterNode::Effect(AppliedEffect::new(EffectKind::Brightness, 20.0)))
            .with_node(FilterNode::Effect(AppliedEffect::new(EffectKind::Contrast, 50.0)));
        // 100 + 51 = 151, then (151 - 128) * 1.5 + 128 = 162.5
        assert_eq!(stream.sample([100, 100, 100]), [163, 163, 163]);
        assert_eq!(stream.effects().count(), 2);
        assert_eq!(stream.overlays().count(), 0);
    }

    #[test]
    fn test_stream_handle_release_removes_dir() {
        let root = tempfile::tempdir().unwrap();
        let handle = StreamHandle::open(Some(root.path()), "job").unwrap();
        let path = handle.path().to_path_buf();
        std::fs::write(path.join("graph.txt"), "null").unwrap();
        assert!(path.exists());
        handle.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_stream_handle_drop_removes_dir() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let handle = StreamHandle::open(Some(root.path()), "job").unwrap();
            handle.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
