//! Client for a JSON/REST gateway in front of a WITSML server.
//!
//! Routes, relative to the server URL:
//!
//! - `GET  authorize`
//! - `GET  wells/{well}/wellbores/{wellbore}/logs/{log}`
//! - `GET  wells/{well}/wellbores/{wellbore}/logs/{log}/logcurveinfo`
//! - `POST wells/{well}/wellbores/{wellbore}/logs/{log}/data`
//! - `PATCH wells/{well}/wellbores/{wellbore}/logs/{log}/logcurveinfo/{mnemonic}`
//! - `PATCH wells/{well}/wellbores/{wellbore}/logs/{log}`
//!
//! Every request carries HTTP basic auth.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde_json::json;

use super::{ClientError, ClientProvider, WitsmlClient};
use crate::core::credentials::{Credentials, CredentialsToken, Secret};
use crate::core::models::{LogCurveInfo, LogData, LogObject, LogReference};

pub struct RestProvider {
    http: reqwest::Client,
}

impl RestProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ClientProvider for RestProvider {
    async fn handshake(&self, credentials: &Credentials) -> Result<(), ClientError> {
        let client = RestClient::new(
            self.http.clone(),
            &credentials.server_url,
            &credentials.username,
            &credentials.secret,
        )?;
        let url = client.endpoint(&["authorize"])?;
        client.send(client.request(Method::GET, url)).await?;
        Ok(())
    }

    async fn client(&self, token: &CredentialsToken) -> Result<Arc<dyn WitsmlClient>, ClientError> {
        let client = RestClient::new(
            self.http.clone(),
            &token.server_url,
            &token.username,
            &token.secret,
        )?;
        Ok(Arc::new(client))
    }
}

pub struct RestClient {
    http: reqwest::Client,
    server_url: String,
    base: Url,
    username: String,
    secret: Secret,
}

impl RestClient {
    fn new(
        http: reqwest::Client,
        server_url: &str,
        username: &str,
        secret: &Secret,
    ) -> Result<Self, ClientError> {
        let base = Url::parse(server_url)
            .map_err(|e| ClientError::Rejected(format!("invalid server url {}: {}", server_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Rejected(format!(
                "server url {} cannot be used as a base",
                server_url
            )));
        }

        Ok(Self {
            http,
            server_url: server_url.to_string(),
            base,
            username: username.to_string(),
            secret: secret.clone(),
        })
    }

    /// Append percent-encoded path segments to the server URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Rejected(format!("{} cannot be a base url", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn log_endpoint(&self, log: &LogReference, tail: &[&str]) -> Result<Url, ClientError> {
        let mut segments = vec![
            "wells",
            log.well_uid.as_str(),
            "wellbores",
            log.wellbore_uid.as_str(),
            "logs",
            log.log_uid.as_str(),
        ];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(self.secret.expose()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        check_status(response.status(), response.url().path())?;
        Ok(response)
    }

    /// Like `send`, but a 404 yields `None`.
    async fn send_optional(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<reqwest::Response>, ClientError> {
        match self.send(request).await {
            Ok(response) => Ok(Some(response)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Map an HTTP status to the client error taxonomy.
fn check_status(status: StatusCode, path: &str) -> Result<(), ClientError> {
    if status.is_success() {
        return Ok(());
    }

    let detail = format!("{} returned {}", path, status);
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(detail),
        StatusCode::NOT_FOUND => ClientError::NotFound(path.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            ClientError::Unreachable(detail)
        }
        s if s.is_server_error() => ClientError::Unreachable(detail),
        _ => ClientError::Rejected(detail),
    })
}

fn decode_error(err: reqwest::Error) -> ClientError {
    ClientError::Rejected(format!("malformed response: {}", err))
}

#[async_trait]
impl WitsmlClient for RestClient {
    fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn get_log(&self, log: &LogReference) -> Result<Option<LogObject>, ClientError> {
        let url = self.log_endpoint(log, &[])?;
        match self.send_optional(self.request(Method::GET, url)).await? {
            Some(response) => response.json().await.map(Some).map_err(decode_error),
            None => Ok(None),
        }
    }

    async fn get_log_curve_info(
        &self,
        log: &LogReference,
    ) -> Result<Vec<LogCurveInfo>, ClientError> {
        let url = self.log_endpoint(log, &["logcurveinfo"])?;
        match self.send_optional(self.request(Method::GET, url)).await? {
            Some(response) => response.json().await.map_err(decode_error),
            None => Ok(Vec::new()),
        }
    }

    async fn get_log_data(
        &self,
        log: &LogReference,
        mnemonics: &[String],
    ) -> Result<LogData, ClientError> {
        let url = self.log_endpoint(log, &["data"])?;
        let request = self
            .request(Method::POST, url)
            .json(&json!({ "mnemonics": mnemonics }));
        self.send(request).await?.json().await.map_err(decode_error)
    }

    async fn rename_log_curve(
        &self,
        log: &LogReference,
        mnemonic: &str,
        new_mnemonic: &str,
    ) -> Result<(), ClientError> {
        let url = self.log_endpoint(log, &["logcurveinfo", mnemonic])?;
        let request = self
            .request(Method::PATCH, url)
            .json(&json!({ "mnemonic": new_mnemonic }));
        self.send(request).await?;
        Ok(())
    }

    async fn update_index_curve(
        &self,
        log: &LogReference,
        index_curve: &str,
    ) -> Result<(), ClientError> {
        let url = self.log_endpoint(log, &[])?;
        let request = self
            .request(Method::PATCH, url)
            .json(&json!({ "indexCurve": index_curve }));
        self.send(request).await?;
        Ok(())
    }
}
