//! Client scoped to one job's use of one server.
//!
//! Every remote call goes through [`RemoteSession::call`], which is the
//! job's suspension point: it observes cancellation, retries transient
//! failures with backoff and re-authorizes once after a 401.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ClientError, WitsmlClient};
use crate::core::credentials::CredentialsService;
use crate::core::models::{LogCurveInfo, LogData, LogObject, LogReference};
use crate::core::retry::RetryPolicy;
use crate::error::JobError;

type CallFuture<T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send>>;

/// Whether a call gives up when the job is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cancellation {
    Observe,
    Ignore,
}

pub struct RemoteSession {
    server_url: String,
    client: RwLock<Arc<dyn WitsmlClient>>,
    credentials: Arc<CredentialsService>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RemoteSession {
    /// Authorize against `server_url` and bind a client to it.
    pub async fn open(
        server_url: &str,
        credentials: Arc<CredentialsService>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Result<Self, JobError> {
        let client = connect_with_retry(&credentials, server_url, &retry, &cancel).await?;

        Ok(Self {
            server_url: client.server_url().to_string(),
            client: RwLock::new(client),
            credentials,
            retry,
            cancel,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub async fn get_log(&self, log: &LogReference) -> Result<Option<LogObject>, JobError> {
        let log = log.clone();
        self.call("get_log", Cancellation::Observe, move |client| {
            let log = log.clone();
            Box::pin(async move { client.get_log(&log).await })
        })
        .await
    }

    pub async fn get_log_curve_info(
        &self,
        log: &LogReference,
    ) -> Result<Vec<LogCurveInfo>, JobError> {
        let log = log.clone();
        self.call("get_log_curve_info", Cancellation::Observe, move |client| {
            let log = log.clone();
            Box::pin(async move { client.get_log_curve_info(&log).await })
        })
        .await
    }

    pub async fn get_log_data(
        &self,
        log: &LogReference,
        mnemonics: &[String],
    ) -> Result<LogData, JobError> {
        let log = log.clone();
        let mnemonics = mnemonics.to_vec();
        self.call("get_log_data", Cancellation::Observe, move |client| {
            let log = log.clone();
            let mnemonics = mnemonics.clone();
            Box::pin(async move { client.get_log_data(&log, &mnemonics).await })
        })
        .await
    }

    pub async fn rename_log_curve(
        &self,
        log: &LogReference,
        mnemonic: &str,
        new_mnemonic: &str,
    ) -> Result<(), JobError> {
        self.rename(log, mnemonic, new_mnemonic, Cancellation::Observe)
            .await
    }

    /// Rename used to undo a partial update. Runs even if the job was
    /// cancelled, so the log is never left half-renamed.
    pub async fn restore_log_curve(
        &self,
        log: &LogReference,
        renamed: &str,
        original: &str,
    ) -> Result<(), JobError> {
        self.rename(log, renamed, original, Cancellation::Ignore)
            .await
    }

    pub async fn update_index_curve(
        &self,
        log: &LogReference,
        index_curve: &str,
    ) -> Result<(), JobError> {
        let log = log.clone();
        let index_curve = index_curve.to_string();
        self.call("update_index_curve", Cancellation::Observe, move |client| {
            let log = log.clone();
            let index_curve = index_curve.clone();
            Box::pin(async move { client.update_index_curve(&log, &index_curve).await })
        })
        .await
    }

    async fn rename(
        &self,
        log: &LogReference,
        from: &str,
        to: &str,
        cancellation: Cancellation,
    ) -> Result<(), JobError> {
        let log = log.clone();
        let (from, to) = (from.to_string(), to.to_string());
        self.call("rename_log_curve", cancellation, move |client| {
            let log = log.clone();
            let (from, to) = (from.clone(), to.clone());
            Box::pin(async move { client.rename_log_curve(&log, &from, &to).await })
        })
        .await
    }

    async fn call<T, F>(
        &self,
        operation: &'static str,
        cancellation: Cancellation,
        op: F,
    ) -> Result<T, JobError>
    where
        F: Fn(Arc<dyn WitsmlClient>) -> CallFuture<T>,
    {
        let cancel = match cancellation {
            Cancellation::Observe => self.cancel.clone(),
            Cancellation::Ignore => CancellationToken::new(),
        };
        let mut retries = 0;
        let mut reauthorized = false;

        loop {
            if cancel.is_cancelled() {
                return Err(JobError::Cancelled);
            }

            let client = self.client.read().await.clone();
            debug!(server = %self.server_url, operation, "Remote call");

            let err = match op(client).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if let ClientError::Unauthorized(message) = &err {
                self.credentials.invalidate(&self.server_url).await;
                if reauthorized {
                    return Err(JobError::Authorization {
                        server: self.server_url.clone(),
                        message: message.clone(),
                    });
                }
                warn!(server = %self.server_url, operation, "Session rejected, re-authorizing");
                reauthorized = true;
                let fresh =
                    connect_with_retry(&self.credentials, &self.server_url, &self.retry, &cancel)
                        .await?;
                *self.client.write().await = fresh;
                continue;
            }

            let err = JobError::from_client(&self.server_url, err);
            if !err.is_retryable() || !self.retry.can_retry(retries) {
                return Err(err);
            }
            retries += 1;
            backoff(&self.retry, retries, &cancel, &self.server_url, &err).await?;
        }
    }
}

/// `connect`, retrying connection failures under `retry`.
async fn connect_with_retry(
    credentials: &CredentialsService,
    server_url: &str,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Arc<dyn WitsmlClient>, JobError> {
    let mut retries = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        match connect(credentials, server_url).await {
            Ok(client) => return Ok(client),
            Err(err) if err.is_retryable() && retry.can_retry(retries) => {
                retries += 1;
                backoff(retry, retries, cancel, server_url, &err).await?;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn connect(
    credentials: &CredentialsService,
    server_url: &str,
) -> Result<Arc<dyn WitsmlClient>, JobError> {
    let token = credentials.authorize(server_url).await?;
    match credentials.provider().client(&token).await {
        Ok(client) => Ok(client),
        Err(ClientError::Unauthorized(message)) => {
            credentials.invalidate(server_url).await;
            Err(JobError::Authorization {
                server: server_url.to_string(),
                message,
            })
        }
        Err(err) => Err(JobError::from_client(server_url, err)),
    }
}

async fn backoff(
    retry: &RetryPolicy,
    attempt: u32,
    cancel: &CancellationToken,
    server_url: &str,
    err: &JobError,
) -> Result<(), JobError> {
    let delay = retry.next_delay(attempt);
    warn!(
        server = %server_url,
        attempt,
        delay_ms = delay.as_millis() as u64,
        error = %err,
        "Transient failure, retrying"
    );

    tokio::select! {
        _ = cancel.cancelled() => Err(JobError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
