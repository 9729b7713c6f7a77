//! Export engine facade: registry, admission control and job tasks.

use std::sync::Arc;

use reel_media::{Encoder, FfmpegEncoder, FfmpegRunner, FfprobeProbe, LocalMediaStore, MediaProbe, MediaStore};
use reel_models::{Job, JobId, RenderSettings};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::executor::{RenderExecutor, StageObserver};
use crate::metrics;
use crate::progress::{progress_channel, ProgressReceiver, ProgressSender};
use crate::registry::{JobEntry, JobRegistry};

/// Entry point for submitting and tracking export jobs.
///
/// Cheap to clone; clones share the registry and the admission semaphore.
#[derive(Clone)]
pub struct ExportEngine {
    registry: Arc<JobRegistry>,
    executor: Arc<RenderExecutor>,
    permits: Option<Arc<Semaphore>>,
}

impl ExportEngine {
    /// Engine with the production collaborators (local files, ffprobe,
    /// ffmpeg).
    pub fn from_config(config: EngineConfig) -> Self {
        let store: Arc<dyn MediaStore> = match &config.media_root {
            Some(root) => Arc::new(LocalMediaStore::with_root(root)),
            None => Arc::new(LocalMediaStore::new()),
        };
        let mut runner = FfmpegRunner::new();
        if let Some(timeout) = config.encode_timeout {
            runner = runner.with_timeout(timeout.as_secs());
        }
        Self::new(
            config,
            store,
            Arc::new(FfprobeProbe::new()),
            Arc::new(FfmpegEncoder::new(runner)),
        )
    }

    pub fn new(
        config: EngineConfig,
        store: Arc<dyn MediaStore>,
        probe: Arc<dyn MediaProbe>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        Self::build(config, |config| RenderExecutor::new(config, store, probe, encoder))
    }

    /// Engine whose executor also notifies `observer` at every stage.
    pub fn with_observer(
        config: EngineConfig,
        store: Arc<dyn MediaStore>,
        probe: Arc<dyn MediaProbe>,
        encoder: Arc<dyn Encoder>,
        observer: Arc<dyn StageObserver>,
    ) -> Self {
        Self::build(config, |config| {
            RenderExecutor::new(config, store, probe, encoder).with_observer(observer)
        })
    }

    fn build(config: EngineConfig, executor: impl FnOnce(Arc<EngineConfig>) -> RenderExecutor) -> Self {
        let max_concurrent_jobs = config.max_concurrent_jobs;
        let permits = (max_concurrent_jobs > 0).then(|| Arc::new(Semaphore::new(max_concurrent_jobs)));
        info!(
            max_concurrent_jobs,
            output_dir = %config.output_dir.display(),
            "Export engine ready"
        );
        Self {
            registry: Arc::new(JobRegistry::new()),
            executor: Arc::new(executor(Arc::new(config))),
            permits,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Submit a job that will only be polled.
    pub async fn submit(&self, settings: RenderSettings) -> JobId {
        let entry = self.registry.submit(settings).await;
        let id = entry.id().clone();
        self.spawn(entry, ProgressSender::detached());
        id
    }

    /// Submit a job and receive its live progress events.
    pub async fn submit_streaming(&self, settings: RenderSettings) -> (JobId, ProgressReceiver) {
        let entry = self.registry.submit(settings).await;
        let id = entry.id().clone();
        let (tx, rx) = progress_channel();
        self.spawn(entry, tx);
        (id, rx)
    }

    pub async fn get(&self, id: &JobId) -> EngineResult<Job> {
        self.registry.get(id).await
    }

    pub async fn cancel(&self, id: &JobId) -> bool {
        self.registry.request_cancel(id).await
    }

    pub async fn list(&self) -> Vec<Job> {
        self.registry.list().await
    }

    /// Number of renders that may start right now.
    pub fn available_slots(&self) -> Option<usize> {
        self.permits.as_ref().map(|p| p.available_permits())
    }

    fn spawn(&self, entry: Arc<JobEntry>, progress: ProgressSender) {
        metrics::record_job_submitted();
        let executor = Arc::clone(&self.executor);
        let permits = self.permits.clone();

        tokio::spawn(async move {
            // Wait for a render slot while queued; a cancel request wins.
            let _permit = match permits {
                Some(semaphore) => tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    _ = entry.cancelled() => {
                        debug!(job_id = %entry.id(), "Cancelled while waiting for a render slot");
                        None
                    }
                },
                None => None,
            };
            executor.run(entry, progress).await;
        });
    }
}
