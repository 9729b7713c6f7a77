//! In-memory job registry.
//!
//! The map is the only shared mutable structure. Each job sits behind its
//! own async mutex so that the executor and cancel requests serialize per
//! job without contending on the map.

use reel_models::{Job, JobId, JobStatus, RenderSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// One registered job: its record and its cancel flag.
#[derive(Debug)]
pub struct JobEntry {
    id: JobId,
    job: Mutex<Job>,
    cancel_tx: watch::Sender<bool>,
}

impl JobEntry {
    fn new(job: Job) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id: job.id.clone(),
            job: Mutex::new(job),
            cancel_tx,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Copy of the current job record.
    pub async fn snapshot(&self) -> Job {
        self.job.lock().await.clone()
    }

    /// Run `f` with the job record locked.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Job) -> R) -> R {
        let mut job = self.job.lock().await;
        f(&mut job)
    }

    pub fn cancel_requested(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Raise the cancel flag without touching the job status.
    pub fn raise_cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe_cancel();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|flag| *flag).await;
    }
}

/// Registry of all jobs submitted since process start.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `Queued` job.
    pub async fn submit(&self, settings: RenderSettings) -> Arc<JobEntry> {
        let job = Job::new(settings);
        let id = job.id.clone();
        let entry = Arc::new(JobEntry::new(job));
        self.jobs.write().await.insert(id.clone(), Arc::clone(&entry));
        debug!(job_id = %id, "Job registered");
        entry
    }

    pub async fn entry(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Snapshot of a job.
    pub async fn get(&self, id: &JobId) -> EngineResult<Job> {
        match self.entry(id).await {
            Some(entry) => Ok(entry.snapshot().await),
            None => Err(EngineError::JobNotFound(id.clone())),
        }
    }

    /// Request cancellation. Returns `true` if the job exists and was not
    /// already terminal. A queued job is cancelled on the spot; a rendering
    /// job has its flag raised for the executor to observe.
    pub async fn request_cancel(&self, id: &JobId) -> bool {
        let Some(entry) = self.entry(id).await else {
            return false;
        };

        // The flag is raised under the job lock so the executor's final
        // complete-or-cancel decision cannot miss an accepted request.
        let accepted = entry
            .update(|job| {
                let accepted = match job.status {
                    JobStatus::Queued => job.cancel().is_ok(),
                    JobStatus::Rendering => true,
                    _ => false,
                };
                if accepted {
                    entry.raise_cancel();
                }
                accepted
            })
            .await;

        if accepted {
            info!(job_id = %id, "Cancellation requested");
        }
        accepted
    }

    /// Snapshots of all jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let entries: Vec<Arc<JobEntry>> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.snapshot().await);
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RenderSettings {
        RenderSettings::new("a.mp4")
    }

    #[tokio::test]
    async fn test_submit_and_get() {
        let registry = JobRegistry::new();
        let entry = registry.submit(settings()).await;
        let job = registry.get(entry.id()).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.settings.source_video_path, "a.mp4");
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let registry = JobRegistry::new();
        assert!(matches!(
            registry.get(&JobId::from_string("nope")).await,
            Err(EngineError::JobNotFound(_))
        ));
        assert!(!registry.request_cancel(&JobId::from_string("nope")).await);
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let registry = JobRegistry::new();
        let entry = registry.submit(settings()).await;
        assert!(registry.request_cancel(entry.id()).await);
        assert_eq!(entry.snapshot().await.status, JobStatus::Cancelled);
        assert!(entry.cancel_requested());
        // Already terminal
        assert!(!registry.request_cancel(entry.id()).await);
    }

    #[tokio::test]
    async fn test_cancel_rendering_job_raises_flag() {
        let registry = JobRegistry::new();
        let entry = registry.submit(settings()).await;
        entry.update(|job| job.start_rendering()).await.unwrap();
        assert!(registry.request_cancel(entry.id()).await);
        assert_eq!(entry.snapshot().await.status, JobStatus::Rendering);
        assert!(entry.cancel_requested());
        entry.cancelled().await;
    }

    #[tokio::test]
    async fn test_list_in_submission_order() {
        let registry = JobRegistry::new();
        let a = registry.submit(settings()).await;
        let b = registry.submit(settings()).await;
        let jobs = registry.list().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(registry.len().await, 2);
        let ids: Vec<_> = jobs.iter().map(|j| j.id.clone()).collect();
        assert!(ids.contains(a.id()) && ids.contains(b.id()));
    }

    #[tokio::test]
    async fn test_cancel_flag_raised_under_job_lock() {
        let registry = Arc::new(JobRegistry::new());
        let entry = registry.submit(settings()).await;
        entry.update(|job| job.start_rendering()).await.unwrap();

        // While the executor holds the job, a cancel request must wait.
        let held = entry.job.lock().await;
        let cancel = {
            let registry = Arc::clone(&registry);
            let id = entry.id().clone();
            tokio::spawn(async move { registry.request_cancel(&id).await })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!entry.cancel_requested());
        assert_eq!(held.status, JobStatus::Rendering);
        drop(held);

        assert!(cancel.await.unwrap());
        assert!(entry.cancel_requested());
    }
}
