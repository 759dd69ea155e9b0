//! Client for the daemon's JSON-RPC interface. One connection per call.

use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::protocol::{Request, Response, RpcError};
use crate::core::credentials::CredentialsPresence;
use crate::core::models::{Job, JobId};
use crate::core::report::Report;

pub struct RpcClient {
    addr: SocketAddr,
}

#[derive(Debug, Error)]
pub enum RpcClientError {
    #[error("Failed to connect to daemon: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Communication error: {0}")]
    Io(#[source] std::io::Error),

    #[error("Failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to parse response: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Daemon closed the connection without answering")]
    Closed,

    #[error("{0}")]
    Rpc(RpcError),
}

impl RpcClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, RpcClientError> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(RpcClientError::Connect)?;

        let request = Request::call(method, params, Value::from(1));

        let mut request_json =
            serde_json::to_string(&request).map_err(RpcClientError::Serialize)?;
        request_json.push('\n');

        stream
            .write_all(request_json.as_bytes())
            .await
            .map_err(RpcClientError::Io)?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        let read = reader
            .read_line(&mut response_line)
            .await
            .map_err(RpcClientError::Io)?;
        if read == 0 {
            return Err(RpcClientError::Closed);
        }

        let response: Response =
            serde_json::from_str(&response_line).map_err(RpcClientError::Parse)?;

        let result = response.into_result().map_err(RpcClientError::Rpc)?;
        serde_json::from_value(result).map_err(RpcClientError::Parse)
    }

    pub async fn status(&self) -> Result<Value, RpcClientError> {
        self.call("daemon.status", None).await
    }

    pub async fn submit(&self, job_type: &str, payload: Value) -> Result<JobId, RpcClientError> {
        let result: Value = self
            .call("jobs.submit", Some(json!({ "type": job_type, "payload": payload })))
            .await?;
        Ok(result["jobId"].as_str().unwrap_or_default().to_string())
    }

    pub async fn job(&self, id: &str) -> Result<Job, RpcClientError> {
        self.call("jobs.get", Some(json!({ "id": id }))).await
    }

    pub async fn cancel(&self, id: &str) -> Result<Job, RpcClientError> {
        self.call("jobs.cancel", Some(json!({ "id": id }))).await
    }

    pub async fn report(&self, id: &str) -> Result<Report, RpcClientError> {
        self.call("jobs.report", Some(json!({ "id": id }))).await
    }

    /// The report as CSV text.
    pub async fn report_csv(&self, id: &str) -> Result<String, RpcClientError> {
        let result: Value = self
            .call("jobs.report", Some(json!({ "id": id, "format": "csv" })))
            .await?;
        Ok(result["content"].as_str().unwrap_or_default().to_string())
    }

    pub async fn authorize(&self, url: &str) -> Result<CredentialsPresence, RpcClientError> {
        self.call("servers.authorize", Some(json!({ "url": url }))).await
    }
}
