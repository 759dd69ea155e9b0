//! Access to remote WITSML servers.
//!
//! The wire protocol is not implemented here. Workers talk to a server
//! through the [`WitsmlClient`] trait, and a [`ClientProvider`] hands out
//! clients bound to one server and one set of credentials.
//!
//! - `session`: per-job scoped client with retry and re-authorization
//! - `simulated`: in-memory servers used by simulation mode and tests
//! - `rest`: client for a JSON/REST WITSML gateway

pub mod rest;
pub mod session;
pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::credentials::{Credentials, CredentialsToken};
use crate::core::models::{LogCurveInfo, LogData, LogObject, LogReference};

pub use rest::RestProvider;
pub use session::RemoteSession;
pub use simulated::SimulatedWitsml;

/// Transport-level failures reported by a client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// 401-class response. Cached credentials must be dropped.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Network failure or server-side outage. Retryable.
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The server understood the request and refused it.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Read/update operations on one WITSML server.
#[async_trait]
pub trait WitsmlClient: Send + Sync {
    fn server_url(&self) -> &str;

    /// The log header with its curve definitions, or `None` if the log does
    /// not exist.
    async fn get_log(&self, log: &LogReference) -> Result<Option<LogObject>, ClientError>;

    /// Curve metadata of a log. A missing log yields an empty list.
    async fn get_log_curve_info(&self, log: &LogReference)
    -> Result<Vec<LogCurveInfo>, ClientError>;

    /// Bulk data for the given mnemonics, rows in the server's index order.
    async fn get_log_data(
        &self,
        log: &LogReference,
        mnemonics: &[String],
    ) -> Result<LogData, ClientError>;

    /// Rename one curve definition.
    async fn rename_log_curve(
        &self,
        log: &LogReference,
        mnemonic: &str,
        new_mnemonic: &str,
    ) -> Result<(), ClientError>;

    /// Point the log's index-curve reference at `index_curve`.
    async fn update_index_curve(
        &self,
        log: &LogReference,
        index_curve: &str,
    ) -> Result<(), ClientError>;
}

/// Produces clients bound to a server and credentials.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Verify credentials against the server.
    async fn handshake(&self, credentials: &Credentials) -> Result<(), ClientError>;

    /// A client for the token's server, authenticated with the token.
    async fn client(&self, token: &CredentialsToken) -> Result<Arc<dyn WitsmlClient>, ClientError>;
}
