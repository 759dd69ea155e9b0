//! In-memory job table.
//!
//! Holds the jobs the daemon accepted since it started, together with their
//! live progress. Queued and running jobs always stay; only the most
//! recently finished `retention` terminal jobs are kept. The SQLite history
//! in `db::jobs` receives every status transition and outlives eviction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use super::models::{Job, JobStatus};
use super::report::Report;

pub const DEFAULT_RETENTION: usize = 1000;

/// Thread-safe job table shared via `AppContext`.
#[derive(Clone)]
pub struct JobStore {
    inner: Arc<RwLock<HashMap<String, Job>>>,
    changed: Arc<Notify>,
    retention: usize,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: Arc::default(),
            changed: Arc::default(),
            retention: retention.max(1),
        }
    }

    pub async fn insert(&self, job: Job) {
        let mut map = self.inner.write().await;
        map.insert(job.id.clone(), job);
        drop(map);
        self.changed.notify_waiters();
    }

    pub async fn get(&self, job_id: &str) -> Option<Job> {
        let map = self.inner.read().await;
        map.get(job_id).cloned()
    }

    /// All jobs, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let map = self.inner.read().await;
        let mut jobs: Vec<Job> = map.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        jobs
    }

    pub async fn count_by_status(&self, status: JobStatus) -> usize {
        let map = self.inner.read().await;
        map.values().filter(|job| job.status == status).count()
    }

    /// Move a queued job to `Running`. Returns `false` if the job is unknown
    /// or no longer queued (e.g. cancelled while waiting).
    pub async fn start(&self, job_id: &str) -> bool {
        let mut map = self.inner.write().await;
        let Some(job) = map.get_mut(job_id) else {
            return false;
        };
        if !JobStatus::can_transition(job.status, JobStatus::Running) {
            return false;
        }

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        drop(map);
        self.changed.notify_waiters();
        true
    }

    /// Raise the progress of a running job. Lower values are ignored.
    pub async fn set_progress(&self, job_id: &str, progress: u8) {
        let mut map = self.inner.write().await;
        if let Some(job) = map.get_mut(job_id) {
            if job.status == JobStatus::Running {
                job.progress = job.progress.max(progress.min(100));
            }
        }
    }

    /// Apply a terminal transition. Status, reason and report are written in
    /// one critical section so readers never see a report without its final
    /// status. Returns the updated job, or `None` if the transition is not
    /// allowed from the job's current state.
    pub async fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        reason: Option<String>,
        report: Option<Report>,
    ) -> Option<Job> {
        debug_assert!(status.is_terminal());

        let mut map = self.inner.write().await;
        let job = map.get_mut(job_id)?;
        if !JobStatus::can_transition(job.status, status) {
            return None;
        }

        job.status = status;
        job.reason = reason;
        job.report = report;
        job.finished_at = Some(Utc::now());
        if status == JobStatus::Finished {
            job.progress = 100;
        }
        let snapshot = job.clone();
        self.evict_terminal(&mut map);
        drop(map);

        self.changed.notify_waiters();
        Some(snapshot)
    }

    /// Fail a job that has not started. Returns `None` if the job already
    /// left `Queued`.
    pub async fn fail_queued(&self, job_id: &str, reason: &str) -> Option<Job> {
        let mut map = self.inner.write().await;
        let job = map.get_mut(job_id)?;
        if job.status != JobStatus::Queued {
            return None;
        }

        job.status = JobStatus::Failed;
        job.reason = Some(reason.to_string());
        job.finished_at = Some(Utc::now());
        let snapshot = job.clone();
        self.evict_terminal(&mut map);
        drop(map);

        self.changed.notify_waiters();
        Some(snapshot)
    }

    /// Drop the oldest terminal jobs beyond the retention limit.
    fn evict_terminal(&self, map: &mut HashMap<String, Job>) {
        let mut terminal: Vec<_> = map
            .values()
            .filter(|job| job.status.is_terminal())
            .map(|job| (job.finished_at, job.id.clone()))
            .collect();
        if terminal.len() <= self.retention {
            return;
        }

        terminal.sort();
        let excess = terminal.len() - self.retention;
        for (_, id) in terminal.into_iter().take(excess) {
            map.remove(&id);
        }
        debug!(evicted = excess, "Evicted finished jobs from memory");
    }

    /// Wait until the job reaches a terminal state. Returns `None` if the
    /// job is unknown.
    pub async fn wait_terminal(&self, job_id: &str) -> Option<Job> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let job = self.get(job_id).await?;
            if job.status.is_terminal() {
                return Some(job);
            }

            notified.await;
        }
    }
}
