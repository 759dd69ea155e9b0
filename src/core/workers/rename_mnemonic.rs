use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Worker, WorkerContext, WorkerOutput, require_non_blank, resolve_log};
use crate::core::locks::LogLockKey;
use crate::core::models::{JobType, LogReference};
use crate::core::servers::ServerRegistry;
use crate::error::{JobError, SubmitError};
use crate::witsml::RemoteSession;

/// Rename one curve of a log. If the curve is the log's index curve, the
/// index-curve reference moves with it, or the rename is undone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameMnemonicJob {
    pub log_reference: LogReference,
    pub mnemonic: String,
    pub new_mnemonic: String,
}

impl RenameMnemonicJob {
    async fn roll_back(&self, session: &RemoteSession, cause: JobError) -> JobError {
        let log = &self.log_reference;
        warn!(
            log_uid = %log.log_uid,
            error = %cause,
            "Index curve update failed, restoring mnemonic {}",
            self.mnemonic
        );

        let rollback = match session
            .restore_log_curve(log, &self.new_mnemonic, &self.mnemonic)
            .await
        {
            Ok(()) => format!("The curve was renamed back to {}", self.mnemonic),
            Err(err) => format!(
                "Renaming the curve back to {} also failed ({}); the log now has curve {} while its index curve is still {}",
                self.mnemonic, err, self.new_mnemonic, self.mnemonic
            ),
        };

        JobError::Rollback {
            cause: Box::new(cause),
            rollback,
        }
    }
}

#[async_trait]
impl Worker for RenameMnemonicJob {
    fn job_type(&self) -> JobType {
        JobType::RenameMnemonic
    }

    fn prepare(&mut self, servers: &ServerRegistry) -> Result<(), SubmitError> {
        resolve_log("logReference", &mut self.log_reference, servers)?;
        require_non_blank("mnemonic", &self.mnemonic)?;
        require_non_blank("newMnemonic", &self.new_mnemonic)?;

        if self.mnemonic == self.new_mnemonic {
            return Err(SubmitError::Validation(
                "newMnemonic must differ from mnemonic".to_string(),
            ));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "Rename mnemonic {} to {} on log {}",
            self.mnemonic, self.new_mnemonic, self.log_reference
        )
    }

    fn exclusive_log(&self) -> Option<LogLockKey> {
        Some(LogLockKey::for_log(&self.log_reference))
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, JobError> {
        let log_ref = &self.log_reference;
        let session = ctx.session(log_ref.server()).await?;

        let log = session
            .get_log(log_ref)
            .await?
            .ok_or_else(|| JobError::not_found("Log", log_ref.to_string()))?;
        ctx.set_progress(25).await;

        if !log.has_mnemonic(&self.mnemonic) {
            return Err(JobError::not_found(
                "Mnemonic",
                format!("{} on log {}", self.mnemonic, log.uid),
            ));
        }
        if log.has_mnemonic(&self.new_mnemonic) {
            return Err(JobError::Conflict(format!(
                "Mnemonic {} already exists on log {}",
                self.new_mnemonic, log.uid
            )));
        }

        session
            .rename_log_curve(log_ref, &self.mnemonic, &self.new_mnemonic)
            .await?;
        ctx.set_progress(60).await;

        if log.index_curve == self.mnemonic {
            if let Err(err) = session.update_index_curve(log_ref, &self.new_mnemonic).await {
                return Err(self.roll_back(&session, err).await);
            }
        }

        info!(
            log_uid = %log.uid,
            server = %session.server_url(),
            "Renamed mnemonic {} to {}",
            self.mnemonic,
            self.new_mnemonic
        );

        Ok(WorkerOutput {
            message: format!(
                "Mnemonic {} renamed to {} on log {}",
                self.mnemonic, self.new_mnemonic, log.uid
            ),
            report: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Server;

    fn job(mnemonic: &str, new_mnemonic: &str) -> RenameMnemonicJob {
        RenameMnemonicJob {
            log_reference: LogReference::new("W", "WB", "L"),
            mnemonic: mnemonic.into(),
            new_mnemonic: new_mnemonic.into(),
        }
    }

    fn registry() -> ServerRegistry {
        ServerRegistry::new(vec![Server {
            id: "a".into(),
            name: "A".into(),
            url: "https://a.example".into(),
            description: String::new(),
        }])
    }

    #[test]
    fn test_prepare_rejects_identical_or_blank_names() {
        assert!(job("GR", "GR").prepare(&registry()).is_err());
        assert!(job("", "GR").prepare(&registry()).is_err());
        assert!(job("GR", "  ").prepare(&registry()).is_err());
    }

    #[test]
    fn test_prepare_pins_server_for_lock_key() {
        let mut job = job("GR", "GAMMA");
        job.prepare(&registry()).unwrap();

        let key = job.exclusive_log().unwrap();
        assert_eq!(key.server_url, "https://a.example");
        assert_eq!(key.log_uid, "L");
    }
}
