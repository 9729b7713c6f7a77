//! Render executor: drives one job through the pipeline.
//!
//! Stages run strictly in order. Cancellation is checked at every stage
//! boundary and once more, under the job lock, when the encode has
//! finished; a started encode is never interrupted. The job's scratch
//! directory is released on every exit path, and an output file is only
//! left behind by a completed job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use reel_media::{
    AudioAttacher, EffectStage, EncodeOutput, EncodeRequest, Encoder, FfmpegProgress, MediaProbe,
    MediaStore, OverlayCompositor, StreamHandle, VideoInfo, VideoStream,
};
use reel_models::{ExportEvent, Job, JobStatus, ProgressUpdate, RenderSettings, Stage};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::ProgressSender;
use crate::registry::JobEntry;

/// Notified when a job enters a pipeline stage.
pub trait StageObserver: Send + Sync {
    fn stage_started(&self, entry: &JobEntry, stage: Stage);
}

/// Source media resolved and probed before rendering starts.
#[derive(Debug, Clone)]
struct PreparedSource {
    path: PathBuf,
    info: VideoInfo,
}

enum RenderOutcome {
    Completed(EncodeOutput),
    /// Stopped at a stage boundary before the encode
    Cancelled,
}

/// Per-job pipeline context.
struct JobRun<'a> {
    entry: &'a JobEntry,
    progress: &'a ProgressSender,
    logger: &'a JobLogger,
    started: Instant,
}

impl JobRun<'_> {
    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Record the stage on the job and emit a progress event with the
    /// effective (non-decreasing) percent.
    async fn report(&self, update: ProgressUpdate) {
        let stage = update.stage.clone();
        let effective = self
            .entry
            .update(|job| job.set_progress(update.percent, stage))
            .await;
        if let Some(percent) = effective {
            let mut update = update;
            if percent != update.percent {
                update = ProgressUpdate {
                    percent,
                    ..update
                };
            }
            self.progress.send(ExportEvent::progress(update));
        }
    }
}

/// Runs render jobs against the media collaborators.
pub struct RenderExecutor {
    config: Arc<EngineConfig>,
    store: Arc<dyn MediaStore>,
    probe: Arc<dyn MediaProbe>,
    encoder: Arc<dyn Encoder>,
    effects: EffectStage,
    overlays: OverlayCompositor,
    audio: AudioAttacher,
    observers: Vec<Arc<dyn StageObserver>>,
}

impl RenderExecutor {
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<dyn MediaStore>,
        probe: Arc<dyn MediaProbe>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        Self {
            config,
            audio: AudioAttacher::new(Arc::clone(&store)),
            store,
            probe,
            encoder,
            effects: EffectStage::new(),
            overlays: OverlayCompositor::new(),
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Execute the job held by `entry`, pushing events into `progress`.
    /// Always ends with exactly one terminal event.
    pub async fn run(&self, entry: Arc<JobEntry>, progress: ProgressSender) {
        let logger = JobLogger::new(entry.id(), "export");
        let span = logger.create_span();
        self.run_job(&entry, &progress, &logger).instrument(span).await
    }

    async fn run_job(&self, entry: &JobEntry, progress: &ProgressSender, logger: &JobLogger) {
        let job = entry.snapshot().await;
        if job.is_terminal() {
            // Cancelled while queued
            metrics::record_job_finished(job.status);
            emit_terminal(progress, &job);
            return;
        }

        logger.log_start(&job.settings.source_video_path);

        let source = match self.prepare(&job.settings).await {
            Ok(source) => source,
            Err(e) => {
                let message = e.to_string();
                logger.log_error(&message);
                let job = entry
                    .update(|job| {
                        let _ = job.fail(message);
                        job.clone()
                    })
                    .await;
                metrics::record_job_finished(job.status);
                emit_terminal(progress, &job);
                return;
            }
        };

        if entry.update(|job| job.start_rendering()).await.is_err() {
            let job = entry.snapshot().await;
            metrics::record_job_finished(job.status);
            emit_terminal(progress, &job);
            return;
        }

        let run = JobRun {
            entry,
            progress,
            logger,
            started: Instant::now(),
        };

        let mut scratch: Option<StreamHandle> = None;
        let result = self.render(&run, &job, source, &mut scratch).await;

        if let Some(handle) = scratch.take() {
            if let Err(e) = handle.release() {
                logger.log_warning(&format!("Failed to remove scratch directory: {}", e));
            }
        }

        let final_job = match result {
            Ok(RenderOutcome::Completed(output)) => {
                let path = output.path.to_string_lossy().to_string();
                // Cancel requests raise the flag under this same lock, so an
                // accepted cancel is never followed by a completion.
                let finished = entry
                    .update(|job| {
                        let completed = if entry.cancel_requested() {
                            job.cancel().map(|_| false)
                        } else {
                            job.complete(path.clone()).map(|_| true)
                        };
                        completed.map(|completed| (completed, job.clone()))
                    })
                    .await;
                match finished {
                    Ok((true, job)) => {
                        progress.send(ExportEvent::progress(ProgressUpdate::new(
                            100,
                            Stage::Complete.label(),
                            run.elapsed(),
                        )));
                        logger.log_completion(&format!("{} ({} bytes)", path, output.size_bytes));
                        job
                    }
                    Ok((false, job)) => {
                        remove_output(&output.path, logger).await;
                        logger.log_completion("cancelled after encode");
                        job
                    }
                    Err(e) => {
                        logger.log_error(&e.to_string());
                        entry.snapshot().await
                    }
                }
            }
            Ok(RenderOutcome::Cancelled) => {
                logger.log_completion("cancelled");
                entry
                    .update(|job| {
                        let _ = job.cancel();
                        job.clone()
                    })
                    .await
            }
            Err(e) => {
                let message = e.to_string();
                logger.log_error(&message);
                entry
                    .update(|job| {
                        let _ = job.fail(message);
                        job.clone()
                    })
                    .await
            }
        };

        metrics::record_job_finished(final_job.status);
        metrics::record_render_duration(final_job.status, run.elapsed());
        emit_terminal(progress, &final_job);
    }

    /// Entry checks: settings shape, source resolution, probe.
    async fn prepare(&self, settings: &RenderSettings) -> EngineResult<PreparedSource> {
        settings
            .check()
            .map_err(|e| EngineError::invalid_settings(e.to_string()))?;

        let path = self
            .store
            .resolve(&settings.source_video_path)
            .await
            .map_err(|e| EngineError::source_unavailable(e.describe()))?;

        let info = self
            .probe
            .probe(&path)
            .await
            .map_err(|e| EngineError::source_unavailable(e.describe()))?;

        Ok(PreparedSource { path, info })
    }

    async fn render(
        &self,
        run: &JobRun<'_>,
        job: &Job,
        source: PreparedSource,
        scratch: &mut Option<StreamHandle>,
    ) -> EngineResult<RenderOutcome> {
        let settings = &job.settings;

        // Stage 1: load
        if !self.enter(run, Stage::LoadingVideo).await {
            return Ok(RenderOutcome::Cancelled);
        }
        let handle = StreamHandle::open(Some(self.config.work_dir.as_path()), job.id.as_str())
            .map_err(|e| EngineError::stage(Stage::LoadingVideo.label(), e))?;
        let scratch_dir = handle.path().to_path_buf();
        *scratch = Some(handle);
        let stream = VideoStream::open(&source.path, source.info.clone());

        // Stage 2: effects
        if !self.enter(run, Stage::ApplyingEffects).await {
            return Ok(RenderOutcome::Cancelled);
        }
        let effected = self.effects.apply(stream, &settings.effects);
        self.note_contained(run, Stage::ApplyingEffects, &effected.errors);
        let stream = effected.value;

        // Stage 3: overlays
        if !self.enter(run, Stage::ProcessingSubtitles).await {
            return Ok(RenderOutcome::Cancelled);
        }
        let stream = if settings.overlays.is_empty() {
            stream
        } else {
            let built = self.overlays.build(&settings.overlays);
            self.note_contained(run, Stage::ProcessingSubtitles, &built.errors);
            self.overlays.composite(stream, built.value)
        };

        // Stage 4: audio
        if !self.enter(run, Stage::ProcessingAudio).await {
            return Ok(RenderOutcome::Cancelled);
        }
        let stream = self.audio.attach(stream, &settings.audio_tracks).await;

        // Stage 5: encode
        if !self.enter(run, Stage::RenderingVideo).await {
            return Ok(RenderOutcome::Cancelled);
        }
        let params = settings.output_settings.resolve(source.info.fps);
        let total_frames = source.info.frame_count(params.fps);
        let output_path = self.output_path(job);
        let request = EncodeRequest {
            output_path: output_path.clone(),
            stream,
            params,
            scratch_dir,
        };

        match self
            .encode_with_progress(run, request, source.info.duration, total_frames)
            .await
        {
            Ok(output) => Ok(RenderOutcome::Completed(output)),
            Err(e) => {
                // A failed or timed-out encode may have written part of the file
                remove_output(&output_path, run.logger).await;
                Err(e)
            }
        }
    }

    /// Stage boundary: check for cancellation, then announce the stage.
    /// Returns `false` if the job should stop.
    async fn enter(&self, run: &JobRun<'_>, stage: Stage) -> bool {
        if run.entry.cancel_requested() {
            run.logger.log_warning(&format!("Cancelled before {}", stage.label()));
            return false;
        }
        run.logger.log_stage(stage, stage.percent());
        metrics::record_stage_started(stage);
        run.report(ProgressUpdate::new(stage.percent(), stage.label(), run.elapsed()))
            .await;
        for observer in &self.observers {
            observer.stage_started(run.entry, stage);
        }
        true
    }

    fn note_contained(&self, run: &JobRun<'_>, stage: Stage, errors: &[String]) {
        metrics::record_contained_errors(stage, errors.len());
        for error in errors {
            run.logger.log_warning(&format!("{}: {}", stage.label(), error));
        }
    }

    /// Run the encoder while relaying its progress into the job.
    async fn encode_with_progress(
        &self,
        run: &JobRun<'_>,
        request: EncodeRequest,
        duration: f64,
        total_frames: Option<u64>,
    ) -> EngineResult<EncodeOutput> {
        let (tx, mut rx) = mpsc::unbounded_channel::<FfmpegProgress>();
        let callback = Box::new(move |p: FfmpegProgress| {
            let _ = tx.send(p);
        });

        let encode = self.encoder.encode(request, callback);
        let relay = async {
            while let Some(p) = rx.recv().await {
                let mut update = ProgressUpdate::new(
                    Stage::encode_percent(p.percentage(duration)),
                    Stage::RenderingVideo.label(),
                    run.elapsed(),
                )
                .with_frames(p.frame, total_frames);
                if let Some(eta) = p.eta_seconds(duration) {
                    update = update.with_eta(eta);
                }
                run.report(update).await;
            }
        };

        // The relay ends when the encoder drops the callback.
        let (result, ()) = tokio::join!(encode, relay);
        result.map_err(|e| EngineError::stage(Stage::RenderingVideo.label(), e))
    }

    /// Requested output path, or `{output_dir}/export_{job_id}.{ext}`.
    fn output_path(&self, job: &Job) -> PathBuf {
        match job.settings.requested_output_path() {
            Some(path) => PathBuf::from(path),
            None => self.config.output_dir.join(format!(
                "export_{}.{}",
                job.id,
                job.settings.output_settings.container_format.extension()
            )),
        }
    }
}

fn emit_terminal(progress: &ProgressSender, job: &Job) {
    let event = match job.status {
        JobStatus::Completed => ExportEvent::complete(job.output_path.clone().unwrap_or_default()),
        JobStatus::Failed => ExportEvent::error(
            job.error_message
                .clone()
                .unwrap_or_else(|| "Export failed".to_string()),
        ),
        JobStatus::Cancelled => ExportEvent::Cancelled,
        // Not terminal; nothing to send
        JobStatus::Queued | JobStatus::Rendering => return,
    };
    progress.send(event);
}

async fn remove_output(path: &Path, logger: &JobLogger) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => logger.log_warning(&format!("Failed to remove {}: {}", path.display(), e)),
    }
}
