//! RPC method handlers.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::core::Orchestrator;
use crate::core::models::JobStatus;
use crate::db;
use crate::error::{JobError, SubmitError};

use super::protocol::{
    AUTHORIZATION_FAILED, JOB_NOT_FOUND, REPORT_UNAVAILABLE, Request, Response,
    SERVER_UNREACHABLE, UNSUPPORTED_JOB_TYPE,
};

const DEFAULT_PAGE_SIZE: u32 = 50;

/// Dispatches JSON-RPC calls to the orchestrator and the credentials service.
pub struct MethodHandler {
    orchestrator: Orchestrator,
}

#[derive(Deserialize)]
struct JobIdParams {
    id: String,
}

#[derive(Deserialize)]
struct ServerParams {
    url: String,
}

impl MethodHandler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let id = request.id.clone().unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);

        match request.method.as_str() {
            "daemon.status" => self.daemon_status(id).await,
            "jobs.submit" => self.jobs_submit(id, params).await,
            "jobs.get" => self.jobs_get(id, params).await,
            "jobs.list" => self.jobs_list(id, params).await,
            "jobs.cancel" => self.jobs_cancel(id, params).await,
            "jobs.report" => self.jobs_report(id, params).await,
            "servers.list" => self.servers_list(id),
            "servers.authorize" => self.servers_authorize(id, params).await,
            "servers.login" => self.servers_login(id, params).await,
            _ => Response::method_not_found(id, &request.method),
        }
    }

    async fn daemon_status(&self, id: Value) -> Response {
        let ctx = self.orchestrator.context();

        #[derive(Serialize)]
        struct DaemonStatus {
            version: &'static str,
            uptime_secs: u64,
            running_jobs: usize,
            queued_jobs: usize,
            max_concurrent_jobs: usize,
            servers: usize,
            rpc_bind: String,
            simulation: bool,
        }

        Response::success(
            id,
            DaemonStatus {
                version: env!("CARGO_PKG_VERSION"),
                uptime_secs: ctx.started_at.elapsed().as_secs(),
                running_jobs: ctx.jobs.count_by_status(JobStatus::Running).await,
                queued_jobs: ctx.jobs.count_by_status(JobStatus::Queued).await,
                max_concurrent_jobs: ctx.config.max_concurrent_jobs,
                servers: ctx.servers.all().len(),
                rpc_bind: ctx.config.rpc_bind.to_string(),
                simulation: ctx.config.simulation,
            },
        )
    }

    async fn jobs_submit(&self, id: Value, params: Value) -> Response {
        #[derive(Deserialize)]
        struct Params {
            #[serde(rename = "type")]
            job_type: String,
            #[serde(default)]
            payload: Value,
        }

        let params: Params = match parse(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e),
        };

        match self
            .orchestrator
            .submit_tagged(&params.job_type, params.payload)
            .await
        {
            Ok(job_id) => Response::success(id, json!({ "jobId": job_id })),
            Err(SubmitError::UnsupportedJobType(t)) => Response::error(
                id,
                UNSUPPORTED_JOB_TYPE,
                format!("Unsupported job type: {}", t),
            ),
            Err(e @ SubmitError::Validation(_)) => Response::invalid_params(id, e.to_string()),
        }
    }

    async fn jobs_get(&self, id: Value, params: Value) -> Response {
        let params: JobIdParams = match parse(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e),
        };

        match self.orchestrator.get_status(&params.id).await {
            Ok(job) => Response::success(id, job),
            Err(e) => job_error(id, e),
        }
    }

    /// Job history from the database, newest first.
    async fn jobs_list(&self, id: Value, params: Value) -> Response {
        #[derive(Deserialize, Default)]
        struct Params {
            #[serde(default)]
            limit: Option<u32>,
            #[serde(default)]
            offset: Option<u32>,
            #[serde(default)]
            status: Option<JobStatus>,
        }

        let params: Params = if params.is_null() {
            Params::default()
        } else {
            match parse(params) {
                Ok(p) => p,
                Err(e) => return Response::invalid_params(id, e),
            }
        };

        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = params.offset.unwrap_or(0);
        let ctx = self.orchestrator.context();

        match db::jobs::list(&ctx.db, limit, offset, params.status).await {
            Ok(jobs) => Response::success(id, jobs),
            Err(e) => Response::internal_error(id, e.to_string()),
        }
    }

    async fn jobs_cancel(&self, id: Value, params: Value) -> Response {
        let params: JobIdParams = match parse(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e),
        };

        match self.orchestrator.cancel(&params.id).await {
            Ok(job) => Response::success(id, job),
            Err(e) => job_error(id, e),
        }
    }

    async fn jobs_report(&self, id: Value, params: Value) -> Response {
        #[derive(Deserialize, Default, PartialEq)]
        #[serde(rename_all = "lowercase")]
        enum Format {
            #[default]
            Json,
            Csv,
        }

        #[derive(Deserialize)]
        struct Params {
            id: String,
            #[serde(default)]
            format: Format,
        }

        let params: Params = match parse(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e),
        };

        let job = match self.orchestrator.get_status(&params.id).await {
            Ok(job) => job,
            Err(e) => return job_error(id, e),
        };

        let Some(report) = job.report else {
            return Response::error(
                id,
                REPORT_UNAVAILABLE,
                format!("Job {} has no report (status {})", job.id, job.status),
            );
        };

        match params.format {
            Format::Json => Response::success(id, report),
            Format::Csv => Response::success(
                id,
                json!({ "format": "csv", "title": report.title, "content": report.to_csv() }),
            ),
        }
    }

    fn servers_list(&self, id: Value) -> Response {
        Response::success(id, self.orchestrator.context().servers.all())
    }

    async fn servers_authorize(&self, id: Value, params: Value) -> Response {
        let params: ServerParams = match parse(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e),
        };

        let credentials = &self.orchestrator.context().credentials;
        match credentials.authorize(&params.url).await {
            Ok(_) => Response::success(id, credentials.presence(&params.url).await),
            Err(e) => job_error(id, e),
        }
    }

    async fn servers_login(&self, id: Value, params: Value) -> Response {
        #[derive(Deserialize)]
        struct Params {
            url: String,
            username: String,
            password: String,
        }

        let params: Params = match parse(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e),
        };

        let credentials = &self.orchestrator.context().credentials;
        match credentials
            .login(&params.url, &params.username, &params.password)
            .await
        {
            Ok(presence) => Response::success(id, presence),
            Err(e) => job_error(id, e),
        }
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, String> {
    serde_json::from_value(params).map_err(|e| e.to_string())
}

fn job_error(id: Value, err: JobError) -> Response {
    let message = err.to_string();
    match err {
        JobError::NotFound { entity: "Job", .. } => Response::error(id, JOB_NOT_FOUND, message),
        JobError::NotFound { .. } | JobError::Validation(_) => Response::invalid_params(id, message),
        JobError::Authorization { .. } => Response::error(id, AUTHORIZATION_FAILED, message),
        JobError::Connection { .. } => Response::error(id, SERVER_UNREACHABLE, message),
        _ => Response::internal_error(id, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ServerConfig};
    use crate::context::AppContext;
    use crate::rpc::protocol::INVALID_PARAMS;
    use crate::witsml::SimulatedWitsml;
    use std::sync::Arc;

    const URL: &str = "https://sim.example";

    async fn handler() -> MethodHandler {
        let sim = SimulatedWitsml::new();
        sim.add_server(URL).await;
        sim.add_user(URL, "u", "p").await;
        sim.seed_demo_logs(URL).await;

        let mut config = AppConfig::default();
        config.servers.push(ServerConfig {
            id: "sim".into(),
            name: "Sim".into(),
            url: URL.into(),
            description: String::new(),
            username: Some("u".into()),
            password: Some("p".into()),
        });

        let db = db::init_in_memory().await.unwrap();
        let ctx = AppContext::new(config, db, Arc::new(sim));
        MethodHandler::new(Orchestrator::new(ctx))
    }

    fn request(method: &str, params: Value) -> Request {
        Request {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params: Some(params),
            id: Some(json!(1)),
        }
    }

    fn error_code(response: &Response) -> Option<i32> {
        response.error.as_ref().map(|e| e.code)
    }

    #[tokio::test]
    async fn test_submit_error_codes() {
        let handler = handler().await;

        let unsupported = handler
            .handle(request("jobs.submit", json!({ "type": "Nope", "payload": {} })))
            .await;
        assert_eq!(error_code(&unsupported), Some(UNSUPPORTED_JOB_TYPE));

        let invalid = handler
            .handle(request(
                "jobs.submit",
                json!({ "type": "AnalyzeGaps", "payload": {
                    "logReference": { "wellUid": "W-1", "wellboreUid": "WB-1", "logUid": "LOG-DEPTH" },
                    "mnemonics": []
                }}),
            ))
            .await;
        assert_eq!(error_code(&invalid), Some(INVALID_PARAMS));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let handler = handler().await;
        let response = handler.handle(request("jobs.get", json!({ "id": "missing" }))).await;
        assert_eq!(error_code(&response), Some(JOB_NOT_FOUND));

        let response = handler
            .handle(request("jobs.report", json!({ "id": "missing" })))
            .await;
        assert_eq!(error_code(&response), Some(JOB_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_authorize_reports_presence() {
        let handler = handler().await;
        let response = handler
            .handle(request("servers.authorize", json!({ "url": URL })))
            .await;

        let result = response.result.unwrap();
        assert_eq!(result["authorized"], json!(true));
        assert_eq!(result["username"], json!("u"));

        let response = handler
            .handle(request(
                "servers.login",
                json!({ "url": URL, "username": "u", "password": "wrong" }),
            ))
            .await;
        assert_eq!(error_code(&response), Some(AUTHORIZATION_FAILED));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let handler = handler().await;
        let response = handler.handle(request("progress.active", Value::Null)).await;
        assert!(response.error.unwrap().message.contains("progress.active"));
    }
}
