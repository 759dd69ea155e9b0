use thiserror::Error;

use crate::witsml::ClientError;

/// Rejections raised synchronously by `Orchestrator::submit`. No job record
/// exists for a rejected submission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported job type: {0}")]
    UnsupportedJobType(String),
}

/// Failures raised while a job executes, or when querying the job table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not authorized against {server}: {message}")]
    Authorization { server: String, message: String },

    #[error("Unable to reach {server}: {message}")]
    Connection { server: String, message: String },

    #[error(
        "Unable to compare the log as no log curve infos could be fetched from the source log {log} on {server}"
    )]
    SourceNotFound { server: String, log: String },

    #[error(
        "Unable to compare the log as either the log {log} does not exist on {server} or the target log is empty"
    )]
    TargetNotFound { server: String, log: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Remote operation failed on {server}: {message}")]
    Remote { server: String, message: String },

    /// A multi-step update failed part way. `rollback` says whether the
    /// earlier steps were undone.
    #[error("{cause}. {rollback}")]
    Rollback { cause: Box<JobError>, rollback: String },
}

impl JobError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Only transient network failures are eligible for automatic retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Map a transport failure against `server` into the job taxonomy.
    pub fn from_client(server: &str, err: ClientError) -> Self {
        let server = server.to_string();
        match err {
            ClientError::Unauthorized(message) => Self::Authorization { server, message },
            ClientError::Unreachable(message) => Self::Connection { server, message },
            ClientError::NotFound(what) => Self::NotFound {
                entity: "Object",
                id: what,
            },
            ClientError::Rejected(message) => Self::Remote { server, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_retryable() {
        let conn = JobError::from_client("https://a", ClientError::Unreachable("timeout".into()));
        let auth = JobError::from_client("https://a", ClientError::Unauthorized("401".into()));

        assert!(conn.is_retryable());
        assert!(!auth.is_retryable());
        assert!(!JobError::Conflict("x".into()).is_retryable());
    }

    #[test]
    fn test_not_found_sides_name_server_and_log() {
        let err = JobError::TargetNotFound {
            server: "https://target".into(),
            log: "w/wb/l".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("https://target"));
        assert!(msg.contains("w/wb/l"));
    }
}
