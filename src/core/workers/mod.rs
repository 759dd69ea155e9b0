//! Job workers and the registry that maps job types to them.
//!
//! A submitted payload is decoded into a [`JobRequest`], validated against
//! the server registry, and turned into a boxed [`Worker`]. Adding a job
//! type means adding a variant here and a match arm in `into_worker`.

mod analyze_gaps;
mod compare_logs;
mod rename_mnemonic;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::analysis::TimeZoneSetting;
use super::credentials::CredentialsService;
use super::job_store::JobStore;
use super::locks::LogLockKey;
use super::models::{JobId, JobStatus, JobType, LogReference};
use super::report::Report;
use super::retry::RetryPolicy;
use super::servers::ServerRegistry;
use crate::error::{JobError, SubmitError};
use crate::witsml::RemoteSession;

pub use analyze_gaps::{AnalyzeGapsJob, TimeGapSize};
pub use compare_logs::CompareLogsJob;
pub use rename_mnemonic::RenameMnemonicJob;

/// A job submission, tagged by job type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum JobRequest {
    RenameMnemonic(RenameMnemonicJob),
    AnalyzeGaps(AnalyzeGapsJob),
    CompareLogs(CompareLogsJob),
}

impl JobRequest {
    /// Decode a payload for the job type named by `tag`.
    pub fn from_tagged(tag: &str, payload: serde_json::Value) -> Result<Self, SubmitError> {
        let job_type =
            JobType::from_tag(tag).ok_or_else(|| SubmitError::UnsupportedJobType(tag.to_string()))?;

        let invalid = |e: serde_json::Error| {
            SubmitError::Validation(format!("invalid {} payload: {}", job_type, e))
        };
        Ok(match job_type {
            JobType::RenameMnemonic => {
                Self::RenameMnemonic(serde_json::from_value(payload).map_err(invalid)?)
            }
            JobType::AnalyzeGaps => Self::AnalyzeGaps(serde_json::from_value(payload).map_err(invalid)?),
            JobType::CompareLogs => Self::CompareLogs(serde_json::from_value(payload).map_err(invalid)?),
        })
    }

    pub fn job_type(&self) -> JobType {
        match self {
            Self::RenameMnemonic(_) => JobType::RenameMnemonic,
            Self::AnalyzeGaps(_) => JobType::AnalyzeGaps,
            Self::CompareLogs(_) => JobType::CompareLogs,
        }
    }

    pub fn into_worker(self) -> Box<dyn Worker> {
        match self {
            Self::RenameMnemonic(job) => Box::new(job),
            Self::AnalyzeGaps(job) => Box::new(job),
            Self::CompareLogs(job) => Box::new(job),
        }
    }
}

/// Successful result of a worker run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutput {
    pub message: String,
    pub report: Option<Report>,
}

/// Terminal state a worker hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutcome {
    pub status: JobStatus,
    pub reason: Option<String>,
    pub report: Option<Report>,
}

#[async_trait]
pub trait Worker: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Validate the input and resolve log references against the registry.
    /// Runs once, synchronously, at submission.
    fn prepare(&mut self, servers: &ServerRegistry) -> Result<(), SubmitError>;

    /// One-line description stored on the job.
    fn describe(&self) -> String;

    /// Log this worker mutates. Mutating workers hold its lock while they
    /// run.
    fn exclusive_log(&self) -> Option<LogLockKey> {
        None
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, JobError>;

    /// Run the worker and fold any failure into a `Failed` outcome.
    async fn execute(&self, ctx: &WorkerContext) -> WorkerOutcome {
        match self.run(ctx).await {
            Ok(output) => WorkerOutcome {
                status: JobStatus::Finished,
                reason: Some(output.message),
                report: output.report,
            },
            Err(err) => WorkerOutcome {
                status: JobStatus::Failed,
                reason: Some(err.to_string()),
                report: None,
            },
        }
    }
}

/// Everything a worker may touch while it runs.
pub struct WorkerContext {
    pub job_id: JobId,
    pub jobs: JobStore,
    pub credentials: Arc<CredentialsService>,
    pub retry: RetryPolicy,
    pub time_zone: TimeZoneSetting,
    pub cancel: CancellationToken,
    sessions: Mutex<HashMap<String, Arc<RemoteSession>>>,
}

impl WorkerContext {
    pub fn new(
        job_id: JobId,
        jobs: JobStore,
        credentials: Arc<CredentialsService>,
        retry: RetryPolicy,
        time_zone: TimeZoneSetting,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id,
            jobs,
            credentials,
            retry,
            time_zone,
            cancel,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The job's session for `server_url`, opened on first use.
    pub async fn session(&self, server_url: &str) -> Result<Arc<RemoteSession>, JobError> {
        if let Some(session) = self.sessions.lock().await.get(server_url) {
            return Ok(session.clone());
        }

        let session = Arc::new(
            RemoteSession::open(
                server_url,
                self.credentials.clone(),
                self.retry.clone(),
                self.cancel.clone(),
            )
            .await?,
        );

        let mut sessions = self.sessions.lock().await;
        Ok(sessions
            .entry(server_url.to_string())
            .or_insert(session)
            .clone())
    }

    pub async fn set_progress(&self, progress: u8) {
        self.jobs.set_progress(&self.job_id, progress).await;
    }
}

/// Check a log reference and pin it to a registered server. A reference
/// without a server resolves to the default server.
pub(crate) fn resolve_log(
    field: &str,
    log: &mut LogReference,
    servers: &ServerRegistry,
) -> Result<(), SubmitError> {
    log.validate()
        .map_err(|e| SubmitError::Validation(format!("{}: {}", field, e)))?;

    let server = match log.server_url.as_deref() {
        Some(url) => servers
            .get(url)
            .ok_or_else(|| SubmitError::Validation(format!("{}: unknown server {}", field, url)))?,
        None => servers
            .default_server()
            .ok_or_else(|| SubmitError::Validation("no WITSML servers are configured".into()))?,
    };

    log.server_url = Some(server.url.clone());
    Ok(())
}

pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<(), SubmitError> {
    if value.trim().is_empty() {
        return Err(SubmitError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Server;
    use serde_json::json;

    fn registry() -> ServerRegistry {
        ServerRegistry::new(vec![
            Server {
                id: "a".into(),
                name: "A".into(),
                url: "https://a.example/".into(),
                description: String::new(),
            },
            Server {
                id: "b".into(),
                name: "B".into(),
                url: "https://b.example".into(),
                description: String::new(),
            },
        ])
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let err = JobRequest::from_tagged("DeleteEverything", json!({})).unwrap_err();
        assert_eq!(err, SubmitError::UnsupportedJobType("DeleteEverything".into()));
    }

    #[test]
    fn test_undecodable_payload_is_validation_error() {
        let err = JobRequest::from_tagged("RenameMnemonic", json!({ "mnemonic": 3 })).unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[test]
    fn test_tagged_request_decodes() {
        let request = JobRequest::from_tagged(
            "CompareLogs",
            json!({
                "sourceLog": { "wellUid": "W", "wellboreUid": "WB", "logUid": "L1" },
                "targetLog": { "wellUid": "W", "wellboreUid": "WB", "logUid": "L2",
                               "serverUrl": "https://b.example" }
            }),
        )
        .unwrap();
        assert_eq!(request.job_type(), JobType::CompareLogs);
        assert_eq!(request.into_worker().job_type(), JobType::CompareLogs);
    }

    #[test]
    fn test_resolve_log_defaults_to_first_server() {
        let mut log = LogReference::new("W", "WB", "L");
        resolve_log("log", &mut log, &registry()).unwrap();
        assert_eq!(log.server(), "https://a.example");

        let mut log = LogReference::new("W", "WB", "L").on_server("https://b.example/");
        resolve_log("log", &mut log, &registry()).unwrap();
        assert_eq!(log.server(), "https://b.example");
    }

    #[test]
    fn test_resolve_log_rejects_unknown_server_and_blank_uids() {
        let mut log = LogReference::new("W", "WB", "L").on_server("https://c.example");
        assert!(resolve_log("log", &mut log, &registry()).is_err());

        let mut log = LogReference::new("W", " ", "L");
        assert!(resolve_log("log", &mut log, &registry()).is_err());

        let mut log = LogReference::new("W", "WB", "L");
        assert!(resolve_log("log", &mut log, &ServerRegistry::default()).is_err());
    }
}
