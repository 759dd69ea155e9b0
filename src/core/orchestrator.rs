//! Job dispatcher.
//!
//! `submit` validates synchronously, records a `Queued` job and spawns its
//! execution. Each execution waits for the per-log lock (mutating jobs
//! only), then for a concurrency permit, and only then moves to `Running`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::locks::LogLocks;
use super::models::{Job, JobId, JobStatus, JobType};
use super::notifications::JobEvent;
use super::workers::{JobRequest, Worker, WorkerContext, WorkerOutcome};
use crate::context::AppContext;
use crate::db;
use crate::error::{JobError, SubmitError};

pub const CANCELLED_BEFORE_EXECUTION: &str = "Cancelled before execution";

#[derive(Clone)]
pub struct Orchestrator {
    ctx: AppContext,
    locks: LogLocks,
    permits: Arc<Semaphore>,
    cancels: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl Orchestrator {
    pub fn new(ctx: AppContext) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs.max(1)));
        Self {
            ctx,
            locks: LogLocks::new(),
            permits,
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Decode, validate and enqueue a job given its type tag.
    pub async fn submit_tagged(
        &self,
        job_type: &str,
        payload: serde_json::Value,
    ) -> Result<JobId, SubmitError> {
        self.submit(JobRequest::from_tagged(job_type, payload)?).await
    }

    /// Validate and enqueue a job. Returns as soon as the job is recorded.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, SubmitError> {
        let job_type = request.job_type();
        let mut worker = request.into_worker();
        worker.prepare(&self.ctx.servers)?;

        let job = Job::new(Uuid::now_v7().to_string(), job_type, worker.describe());
        let job_id = job.id.clone();
        let cancel = CancellationToken::new();

        self.ctx.jobs.insert(job.clone()).await;
        self.tokens().insert(job_id.clone(), cancel.clone());
        if let Err(e) = db::jobs::create(&self.ctx.db, &job).await {
            warn!(job_id = %job_id, error = %e, "Failed to record job history");
        }

        info!(job_id = %job_id, job_type = %job_type, "Job queued: {}", job.description);

        let this = self.clone();
        let span = info_span!("job", job_id = %job_id, job_type = %job_type);
        tokio::spawn(
            async move { this.run_job(job.id, worker, cancel).await }.instrument(span),
        );

        Ok(job_id)
    }

    pub async fn get_status(&self, job_id: &str) -> Result<Job, JobError> {
        self.ctx
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| JobError::not_found("Job", job_id))
    }

    pub async fn list(&self) -> Vec<Job> {
        self.ctx.jobs.list().await
    }

    /// Best-effort cancellation. Queued jobs fail immediately and never run;
    /// running jobs stop at their next remote call. Terminal jobs are left
    /// as they are.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, JobError> {
        let job = self.get_status(job_id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }

        if let Some(token) = self.tokens().get(job_id) {
            token.cancel();
        }

        if let Some(failed) = self
            .ctx
            .jobs
            .fail_queued(job_id, CANCELLED_BEFORE_EXECUTION)
            .await
        {
            info!(job_id = %job_id, "Cancelled queued job");
            self.tokens().remove(job_id);
            self.record_status(job_id, JobStatus::Failed, failed.reason.clone())
                .await;
            return Ok(failed);
        }

        info!(job_id = %job_id, "Cancellation requested for running job");
        self.get_status(job_id).await
    }

    /// Wait for a job to reach a terminal state.
    pub async fn wait(&self, job_id: &str) -> Result<Job, JobError> {
        self.ctx
            .jobs
            .wait_terminal(job_id)
            .await
            .ok_or_else(|| JobError::not_found("Job", job_id))
    }

    /// Cancel every job that has not finished.
    pub async fn shutdown(&self) {
        let pending: Vec<JobId> = self.tokens().keys().cloned().collect();
        for job_id in pending {
            if let Err(e) = self.cancel(&job_id).await {
                debug!(job_id = %job_id, error = %e, "Job vanished during shutdown");
            }
        }
        self.permits.close();
    }

    fn tokens(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.cancels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_job(self, job_id: JobId, worker: Box<dyn Worker>, cancel: CancellationToken) {
        let job_type = worker.job_type();

        let _log_guard = match worker.exclusive_log() {
            Some(key) => {
                debug!(log_uid = %key.log_uid, "Waiting for log lock");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    guard = self.locks.lock(key) => Some(guard),
                }
            }
            None => None,
        };

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return,
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    self.abandon(&job_id, "Dispatcher is shutting down").await;
                    return;
                }
            },
        };

        // cancel() may have failed the job while it waited
        if !self.ctx.jobs.start(&job_id).await {
            return;
        }
        let started = Instant::now();
        info!("Job started");
        self.record_status(&job_id, JobStatus::Running, None).await;

        if let Some(job) = self.ctx.jobs.get(&job_id).await {
            self.notify(JobEvent::Started {
                job_id: job_id.clone(),
                job_type,
                description: job.description,
            });
        }

        let worker_ctx = WorkerContext::new(
            job_id.clone(),
            self.ctx.jobs.clone(),
            self.ctx.credentials.clone(),
            self.ctx.config.retry_policy(),
            self.ctx.config.time_zone,
            cancel,
        );

        // Run on its own task so a panicking worker still yields an outcome
        let worker: Arc<dyn Worker> = Arc::from(worker);
        let handle = tokio::spawn(
            async move { worker.execute(&worker_ctx).await }.in_current_span(),
        );
        let outcome = handle.await.unwrap_or_else(|e| WorkerOutcome {
            status: JobStatus::Failed,
            reason: Some(format!("Worker aborted: {}", e)),
            report: None,
        });

        self.complete(&job_id, job_type, outcome, started).await;
    }

    async fn complete(
        &self,
        job_id: &str,
        job_type: JobType,
        outcome: WorkerOutcome,
        started: Instant,
    ) {
        self.tokens().remove(job_id);

        let Some(job) = self
            .ctx
            .jobs
            .finish(job_id, outcome.status, outcome.reason, outcome.report)
            .await
        else {
            warn!("Job was already terminal, dropping outcome");
            return;
        };

        let reason = job.reason.clone().unwrap_or_default();
        match job.status {
            JobStatus::Finished => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "Job finished: {}", reason);
                self.notify(JobEvent::Completed {
                    job_id: job.id.clone(),
                    job_type,
                    summary: reason.clone(),
                    duration_secs: started.elapsed().as_secs(),
                });
            }
            _ => {
                warn!(status = %job.status, "Job failed: {}", reason);
                self.notify(JobEvent::Failed {
                    job_id: job.id.clone(),
                    job_type,
                    error: reason.clone(),
                });
            }
        }

        self.record_status(job_id, job.status, job.reason).await;
    }

    async fn abandon(&self, job_id: &str, reason: &str) {
        self.tokens().remove(job_id);
        if let Some(job) = self.ctx.jobs.fail_queued(job_id, reason).await {
            error!(job_id = %job_id, "{}", reason);
            self.record_status(job_id, JobStatus::Failed, job.reason).await;
        }
    }

    /// History writes are best effort and never fail the job.
    async fn record_status(&self, job_id: &str, status: JobStatus, reason: Option<String>) {
        if let Err(e) =
            db::jobs::update_status(&self.ctx.db, job_id.to_string(), status, reason).await
        {
            warn!(job_id = %job_id, error = %e, "Failed to record job status");
        }
    }

    fn notify(&self, event: JobEvent) {
        let Some(notifier) = self.ctx.notifier.clone() else {
            return;
        };
        tokio::spawn(async move {
            let job_id = event.job_id().to_string();
            if let Err(e) = notifier.notify(event).await {
                warn!(job_id = %job_id, error = %e, "Failed to send notification");
            }
        });
    }
}
