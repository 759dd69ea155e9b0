use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use wexd::config::{AppConfig, ServerConfig};
use wexd::context::AppContext;
use wexd::core::{JobStatus, Orchestrator};
use wexd::db;
use wexd::rpc::protocol::{INVALID_PARAMS, INVALID_REQUEST, REPORT_UNAVAILABLE};
use wexd::rpc::{MAX_LINE_BYTES, RpcClient, RpcClientError, RpcServer};
use wexd::witsml::SimulatedWitsml;

const URL: &str = "https://sim.example";

async fn start_server() -> (Arc<RpcServer>, RpcClient) {
    let sim = SimulatedWitsml::new();
    sim.add_server(URL).await;
    sim.add_user(URL, "svc", "secret").await;
    sim.seed_demo_logs(URL).await;

    let config = AppConfig {
        rpc_bind: "127.0.0.1:0".parse().unwrap(),
        servers: vec![ServerConfig {
            id: "sim".into(),
            name: "Simulated".into(),
            url: URL.into(),
            description: String::new(),
            username: Some("svc".into()),
            password: Some("secret".into()),
        }],
        ..AppConfig::default()
    };

    let bind = config.rpc_bind;
    let db = db::init_in_memory().await.unwrap();
    let orchestrator = Orchestrator::new(AppContext::new(config, db, Arc::new(sim)));
    let server = Arc::new(RpcServer::bind(orchestrator, bind).await.unwrap());
    let client = RpcClient::new(server.local_addr().unwrap());

    let running = server.clone();
    tokio::spawn(async move { running.start().await });

    (server, client)
}

fn gaps_payload() -> Value {
    json!({
        "logReference": { "wellUid": "W-1", "wellboreUid": "WB-1", "logUid": "LOG-DEPTH" },
        "mnemonics": ["GR"],
        "gapSize": 60.0
    })
}

async fn wait_terminal(client: &RpcClient, job_id: &str) -> JobStatus {
    timeout(Duration::from_secs(5), async {
        loop {
            let job = client.job(job_id).await.unwrap();
            if job.status.is_terminal() {
                return job.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout waiting for job")
}

#[tokio::test]
async fn test_submit_poll_and_export_report() {
    let (server, client) = start_server().await;

    let job_id = client.submit("AnalyzeGaps", gaps_payload()).await.unwrap();
    assert_eq!(wait_terminal(&client, &job_id).await, JobStatus::Finished);

    let report = client.report(&job_id).await.unwrap();
    assert_eq!(report.rows.len(), 1);

    let csv = client.report_csv(&job_id).await.unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines[0], "Mnemonic,Gap start,Gap end,Gap size");
    assert!(lines[1].starts_with("GR,300,400,"));

    let history: Vec<Value> = client
        .call("jobs.list", Some(json!({ "limit": 10 })))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], json!(job_id));

    server.shutdown();
}

#[tokio::test]
async fn test_errors_map_to_rpc_codes() {
    let (server, client) = start_server().await;

    let err = client
        .submit("AnalyzeGaps", json!({ "logReference": {}, "mnemonics": [] }))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcClientError::Rpc(ref e) if e.code == INVALID_PARAMS));

    let job_id = client
        .submit(
            "RenameMnemonic",
            json!({
                "logReference": { "wellUid": "W-1", "wellboreUid": "WB-1", "logUid": "LOG-DEPTH" },
                "mnemonic": "GR",
                "newMnemonic": "GR2"
            }),
        )
        .await
        .unwrap();
    assert_eq!(wait_terminal(&client, &job_id).await, JobStatus::Finished);

    // renames produce no report
    let err = client.report(&job_id).await.unwrap_err();
    assert!(matches!(err, RpcClientError::Rpc(ref e) if e.code == REPORT_UNAVAILABLE));

    server.shutdown();
}

#[tokio::test]
async fn test_daemon_status_and_authorize() {
    let (server, client) = start_server().await;

    let status = client.status().await.unwrap();
    assert_eq!(status["servers"], json!(1));
    assert_eq!(status["running_jobs"], json!(0));

    let presence = client.authorize(URL).await.unwrap();
    assert!(presence.authorized);
    assert_eq!(presence.username.as_deref(), Some("svc"));

    server.shutdown();
}

#[tokio::test]
async fn test_oversized_line_closes_connection() {
    let (server, _client) = start_server().await;

    let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
    let payload = vec![b'x'; MAX_LINE_BYTES as usize];
    stream.write_all(&payload).await.unwrap();

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timeout waiting for response")
        .unwrap();

    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["error"]["code"], json!(INVALID_REQUEST));

    line.clear();
    let read = reader.read_line(&mut line).await.unwrap_or(0);
    assert_eq!(read, 0);

    server.shutdown();
}
