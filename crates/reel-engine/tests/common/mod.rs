//! Test doubles for the media collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use reel_engine::{EngineConfig, ExportEngine, JobEntry, StageObserver};
use reel_media::{
    EncodeOutput, EncodeRequest, Encoder, FfmpegProgress, MediaError, MediaProbe, MediaResult,
    MediaStore, ProgressCallback, VideoInfo,
};
use reel_models::{ExportEvent, Job, JobId, Stage};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Resolves only the names it was given.
pub struct FakeStore {
    existing: HashSet<String>,
}

impl FakeStore {
    pub fn with(names: &[&str]) -> Self {
        Self {
            existing: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[async_trait]
impl MediaStore for FakeStore {
    async fn resolve(&self, reference: &str) -> MediaResult<PathBuf> {
        if self.existing.contains(reference) {
            Ok(PathBuf::from("/media").join(reference))
        } else {
            Err(MediaError::FileNotFound(PathBuf::from(reference)))
        }
    }
}

/// Returns a fixed 4 second, 25 fps clip; fails for `corrupt.mp4`.
pub struct FakeProbe;

pub fn clip_info() -> VideoInfo {
    VideoInfo {
        duration: 4.0,
        width: 1280,
        height: 720,
        fps: Some(25.0),
        codec: "h264".into(),
        has_audio: true,
        size: 1024,
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        if path.ends_with("corrupt.mp4") {
            return Err(MediaError::InvalidVideo("No video stream found".into()));
        }
        Ok(clip_info())
    }
}

type FinishHook = Box<dyn Fn() + Send + Sync>;

/// Records requests, reports progress, and writes a small output file.
#[derive(Default)]
pub struct FakeEncoder {
    pub requests: Mutex<Vec<EncodeRequest>>,
    pub fail: bool,
    /// Write a truncated output file before failing
    pub partial_output: bool,
    /// When set, the encode waits for a notification before finishing
    pub gate: Option<Arc<Notify>>,
    /// Called just before a successful encode returns
    on_finish: Mutex<Option<FinishHook>>,
}

impl FakeEncoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Fails after FFmpeg had already started writing the output.
    pub fn failing_with_partial_output() -> Self {
        Self {
            fail: true,
            partial_output: true,
            ..Default::default()
        }
    }

    pub fn on_finish(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_finish.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> EncodeRequest {
        self.requests.lock().unwrap().last().cloned().expect("encoder was not called")
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(&self, request: EncodeRequest, on_progress: ProgressCallback) -> MediaResult<EncodeOutput> {
        self.requests.lock().unwrap().push(request.clone());
        assert!(request.scratch_dir.is_dir(), "scratch dir must exist during encode");

        on_progress(FfmpegProgress {
            frame: 50,
            out_time_us: 2_000_000,
            speed: 2.0,
            ..Default::default()
        });

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.fail {
            if self.partial_output {
                if let Some(parent) = request.output_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&request.output_path, b"trunc").await?;
            }
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with status 1",
                Some("Unknown encoder 'libnothing'".into()),
                Some(1),
            ));
        }

        on_progress(FfmpegProgress {
            frame: 100,
            out_time_us: 4_000_000,
            speed: 2.0,
            is_complete: true,
            ..Default::default()
        });

        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output_path, b"fake video").await?;
        {
            let hook = self.on_finish.lock().unwrap();
            if let Some(hook) = hook.as_ref() {
                hook();
            }
        }
        Ok(EncodeOutput {
            path: request.output_path,
            size_bytes: 10,
        })
    }
}

/// Raises the cancel flag when the job enters `stage`.
pub struct CancelAt(pub Stage);

impl StageObserver for CancelAt {
    fn stage_started(&self, entry: &JobEntry, stage: Stage) {
        if stage == self.0 {
            entry.raise_cancel();
        }
    }
}

pub struct Harness {
    pub engine: ExportEngine,
    pub encoder: Arc<FakeEncoder>,
    pub dir: TempDir,
}

impl Harness {
    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("exports")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    /// Scratch directories still present under the work dir.
    pub fn leftover_scratch(&self) -> usize {
        std::fs::read_dir(self.work_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub fn config(dir: &TempDir, max_concurrent_jobs: usize) -> EngineConfig {
    EngineConfig {
        max_concurrent_jobs,
        output_dir: dir.path().join("exports"),
        work_dir: dir.path().join("work"),
        media_root: None,
        encode_timeout: None,
    }
}

pub fn harness(encoder: FakeEncoder) -> Harness {
    harness_with(encoder, None, 2)
}

pub fn harness_with(
    encoder: FakeEncoder,
    observer: Option<Arc<dyn StageObserver>>,
    max_concurrent_jobs: usize,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let encoder = Arc::new(encoder);
    let store = Arc::new(FakeStore::with(&["a.mp4", "corrupt.mp4", "music.mp3"]));
    let config = config(&dir, max_concurrent_jobs);
    let engine = match observer {
        Some(observer) => ExportEngine::with_observer(
            config,
            store,
            Arc::new(FakeProbe),
            encoder.clone(),
            observer,
        ),
        None => ExportEngine::new(config, store, Arc::new(FakeProbe), encoder.clone()),
    };
    Harness { engine, encoder, dir }
}

/// Poll until the job is terminal.
pub async fn wait_terminal(engine: &ExportEngine, id: &JobId) -> Job {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = engine.get(id).await.unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not finish")
}

/// Percentages of all progress events, in order.
pub fn percents(events: &[ExportEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            ExportEvent::Progress { progress } => Some(progress.percent),
            _ => None,
        })
        .collect()
}

pub fn stages(events: &[ExportEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ExportEvent::Progress { progress } => Some(progress.stage.clone()),
            _ => None,
        })
        .collect()
}
