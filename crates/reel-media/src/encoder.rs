//! Final encode: turns a [`VideoStream`] into an output file.

use async_trait::async_trait;
use reel_models::EncodeParams;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::progress::ProgressCallback;
use crate::stream::{AudioSource, FilterNode, VideoStream};

const VIDEO_OUT: &str = "[vout]";
const AUDIO_OUT: &str = "[aout]";

/// Everything the encoder needs for one job.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub stream: VideoStream,
    pub params: EncodeParams,
    pub output_path: PathBuf,
    /// Directory for intermediate files; owned and removed by the caller
    pub scratch_dir: PathBuf,
}

/// Result of a finished encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOutput {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Writes the final output file.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, request: EncodeRequest, on_progress: ProgressCallback) -> MediaResult<EncodeOutput>;
}

/// The filter graph for one encode, plus the overlay text files it reads.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    pub script: String,
    pub text_files: Vec<(PathBuf, String)>,
    /// Audio mapping for the output
    pub audio_map: Option<String>,
    /// Whether an external audio track is read as input 1
    pub external_audio: Option<PathBuf>,
}

impl FilterGraph {
    /// Build the graph. Overlay text files are named after their position in
    /// the chain and placed in `scratch_dir`.
    pub fn build(stream: &VideoStream, params: &EncodeParams, scratch_dir: &Path) -> Self {
        let mut text_files = Vec::new();
        let mut chain: Vec<String> = Vec::new();

        for (idx, node) in stream.nodes().iter().enumerate() {
            match node {
                FilterNode::Effect(effect) => {
                    if !effect.is_identity() {
                        chain.push(effect.ffmpeg_filter());
                    }
                }
                FilterNode::Text(overlay) => {
                    let path = scratch_dir.join(format!("overlay_{}.txt", idx));
                    chain.push(overlay.drawtext_filter(&path));
                    text_files.push((path, overlay.text.clone()));
                }
            }
        }

        if let Some(res) = params.resolution {
            chain.push(format!("scale={}:{}", res.width, res.height));
        }
        chain.push("format=yuv420p".to_string());

        let mut script = format!("[0:v]{}{}", chain.join(","), VIDEO_OUT);

        let (audio_map, external_audio) = match stream.audio() {
            AudioSource::External { path, gain } => {
                let chain = external_audio_chain(*gain, stream.info().duration);
                if chain.is_empty() {
                    (Some("1:a".to_string()), Some(path.clone()))
                } else {
                    script.push_str(&format!(";[1:a]{}{}", chain.join(","), AUDIO_OUT));
                    (Some(AUDIO_OUT.to_string()), Some(path.clone()))
                }
            }
            AudioSource::Original if stream.info().has_audio => (Some("0:a".to_string()), None),
            AudioSource::Original => (None, None),
        };

        Self {
            script,
            text_files,
            audio_map,
            external_audio,
        }
    }
}

/// Filters for a replacement audio track. The track is padded with silence
/// and trimmed to the source duration so the output keeps the video length.
fn external_audio_chain(gain: Option<f64>, source_duration: f64) -> Vec<String> {
    let mut chain = Vec::new();
    if let Some(gain) = gain {
        chain.push(format!("volume={:.3}", gain));
    }
    if source_duration.is_finite() && source_duration > 0.0 {
        chain.push("apad".to_string());
        chain.push(format!("atrim=0:{:.3}", source_duration));
    }
    chain
}

/// [`Encoder`] that runs FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    runner: FfmpegRunner,
}

impl FfmpegEncoder {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    fn command(request: &EncodeRequest, graph: &FilterGraph, script_path: &Path) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(request.stream.source(), &request.output_path);
        if let Some(audio) = &graph.external_audio {
            cmd = cmd.input(audio);
        }
        cmd = cmd.filter_complex_script(script_path).map(VIDEO_OUT);

        let mut args = request.params.to_ffmpeg_args();
        match &graph.audio_map {
            Some(audio_map) => {
                cmd = cmd.map(audio_map.clone());
            }
            None => {
                // No audio stream to encode
                strip_audio_args(&mut args);
                args.push("-an".to_string());
            }
        }
        cmd.output_args(args)
    }
}

fn strip_audio_args(args: &mut Vec<String>) {
    let mut i = 0;
    while i < args.len() {
        if args[i] == "-c:a" || args[i] == "-b:a" {
            args.drain(i..(i + 2).min(args.len()));
        } else {
            i += 1;
        }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, request: EncodeRequest, on_progress: ProgressCallback) -> MediaResult<EncodeOutput> {
        let graph = FilterGraph::build(&request.stream, &request.params, &request.scratch_dir);

        for (path, text) in &graph.text_files {
            tokio::fs::write(path, text).await?;
        }
        let script_path = request.scratch_dir.join("filter_graph.txt");
        tokio::fs::write(&script_path, &graph.script).await?;

        if let Some(parent) = request.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = Self::command(&request, &graph, &script_path);
        info!(
            output = %request.output_path.display(),
            container = %request.params.container,
            "Encoding"
        );
        self.runner.run_with_progress(&cmd, on_progress).await?;

        let metadata = tokio::fs::metadata(&request.output_path)
            .await
            .map_err(|_| MediaError::ffmpeg_failed("FFmpeg produced no output file", None, None))?;

        Ok(EncodeOutput {
            path: request.output_path,
            size_bytes: metadata.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::AppliedEffect;
    use crate::overlay::OverlayCompositor;
    use crate::probe::VideoInfo;
    use reel_models::{EffectKind, OutputSettings, OverlaySpec, Resolution};

    fn stream(has_audio: bool) -> VideoStream {
        VideoStream::open(
            "/in/a.mp4",
            VideoInfo {
                duration: 4.0,
                width: 640,
                height: 360,
                fps: Some(25.0),
                codec: "h264".into(),
                has_audio,
                size: 0,
            },
        )
    }

    #[test]
    fn test_graph_keeps_node_order() {
        let compositor = OverlayCompositor::new();
        let overlays = compositor.build(&[OverlaySpec::new("Hi", 0.0, 1.0)]).value;
        let stream = compositor.composite(
            stream(true).with_node(FilterNode::Effect(AppliedEffect::new(EffectKind::Contrast, 50.0))),
            overlays,
        );
        let graph = FilterGraph::build(&stream, &OutputSettings::default().resolve(None), Path::new("/s"));

        let contrast = graph.script.find("eq=contrast").unwrap();
        let text = graph.script.find("drawtext").unwrap();
        assert!(contrast < text);
        assert!(graph.script.starts_with("[0:v]"));
        assert!(graph.script.ends_with("format=yuv420p[vout]"));
        assert_eq!(graph.text_files, vec![(PathBuf::from("/s/overlay_1.txt"), "Hi".to_string())]);
        assert_eq!(graph.audio_map.as_deref(), Some("0:a"));
    }

    #[test]
    fn test_graph_external_audio_with_gain() {
        let stream = stream(false).with_audio(AudioSource::External {
            path: PathBuf::from("/m/music.mp3"),
            gain: Some(0.5),
        });
        let mut settings = OutputSettings::default();
        settings.resolution = Some(Resolution { width: 1280, height: 720 });
        let graph = FilterGraph::build(&stream, &settings.resolve(None), Path::new("/s"));
        assert!(graph.script.contains("scale=1280:720"));
        assert!(graph.script.ends_with(";[1:a]volume=0.500,apad,atrim=0:4.000[aout]"));
        assert_eq!(graph.audio_map.as_deref(), Some("[aout]"));
        assert_eq!(graph.external_audio, Some(PathBuf::from("/m/music.mp3")));
    }

    #[test]
    fn test_command_without_audio_drops_audio_args() {
        let request = EncodeRequest {
            stream: stream(false),
            params: OutputSettings::default().resolve(None),
            output_path: PathBuf::from("/out/x.mp4"),
            scratch_dir: PathBuf::from("/s"),
        };
        let graph = FilterGraph::build(&request.stream, &request.params, &request.scratch_dir);
        assert_eq!(graph.audio_map, None);
        let args = FfmpegEncoder::command(&request, &graph, Path::new("/s/filter_graph.txt")).build_args();
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert!(args.contains(&"[vout]".to_string()));
    }

    #[test]
    fn test_external_audio_keeps_video_length() {
        let mut info = stream(true).info().clone();
        info.duration = 10.0;
        let stream = VideoStream::open("/in/a.mp4", info).with_audio(AudioSource::External {
            path: PathBuf::from("/m/jingle.wav"),
            gain: None,
        });
        let request = EncodeRequest {
            stream,
            params: OutputSettings::default().resolve(None),
            output_path: PathBuf::from("/out/x.mp4"),
            scratch_dir: PathBuf::from("/s"),
        };
        let graph = FilterGraph::build(&request.stream, &request.params, &request.scratch_dir);
        assert!(graph.script.ends_with(";[1:a]apad,atrim=0:10.000[aout]"), "{}", graph.script);
        assert_eq!(graph.audio_map.as_deref(), Some("[aout]"));

        let args = FfmpegEncoder::command(&request, &graph, Path::new("/s/filter_graph.txt")).build_args();
        assert!(!args.contains(&"-shortest".to_string()));
        let maps: Vec<_> = args
            .windows(2)
            .filter(|w| w[0] == "-map")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(maps, vec!["[vout]", "[aout]"]);
    }
}
