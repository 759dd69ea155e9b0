use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use wexd::config::AppConfig;
use wexd::context::AppContext;
use wexd::core::Orchestrator;
use wexd::core::analysis::TimeZoneSetting;
use wexd::core::models::JobStatus;
use wexd::rpc::{RpcClient, RpcServer};
use wexd::witsml::{ClientProvider, RestProvider, SimulatedWitsml};
use wexd::{db, logging};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "wexd")]
#[command(about = "WITSML job daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon address for client commands. Defaults to the configured rpc_bind.
    #[arg(long, global = true)]
    rpc: Option<SocketAddr>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Daemon(ServerArgs),
    /// Submit a job, e.g. `wexd submit AnalyzeGaps '{"logReference": ...}'`
    Submit {
        job_type: String,
        payload: String,
        /// Poll until the job finishes
        #[arg(long)]
        wait: bool,
    },
    /// Show a job, or the daemon when no id is given
    Status { id: Option<String> },
    Cancel { id: String },
    Report {
        id: String,
        #[arg(long)]
        csv: bool,
    },
    /// Authorize against a server with its configured credentials
    Authorize { url: String },
    /// Print the effective configuration
    Config,
}

#[derive(Args, Serialize)]
struct ServerArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    rpc_bind: Option<SocketAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    database_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    max_concurrent_jobs: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    retry_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, value_parser = parse_time_zone)]
    time_zone: Option<TimeZoneSetting>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    simulation: Option<bool>,
}

fn parse_time_zone(value: &str) -> Result<TimeZoneSetting, String> {
    serde_json::from_value(Value::String(value.to_lowercase()))
        .map_err(|_| format!("expected raw, utc or local, got {}", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Daemon(args) => AppConfig::new(Some(args))?,
        _ => AppConfig::new(None::<&ServerArgs>)?,
    };
    let client = RpcClient::new(cli.rpc.unwrap_or(config.rpc_bind));

    match cli.command {
        Commands::Daemon(_) => run_daemon(config).await.context("Failed to run daemon")?,
        Commands::Submit {
            job_type,
            payload,
            wait,
        } => {
            let payload: Value =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            let job_id = client.submit(&job_type, payload).await?;
            println!("{}", job_id);
            if wait {
                wait_for_job(&client, &job_id).await?;
            }
        }
        Commands::Status { id: Some(id) } => print_json(&client.job(&id).await?)?,
        Commands::Status { id: None } => print_json(&client.status().await?)?,
        Commands::Cancel { id } => print_json(&client.cancel(&id).await?)?,
        Commands::Report { id, csv: true } => print!("{}", client.report_csv(&id).await?),
        Commands::Report { id, csv: false } => print_json(&client.report(&id).await?)?,
        Commands::Authorize { url } => print_json(&client.authorize(&url).await?)?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    logging::init((&config).into())?;

    let db_conn = db::init(&config.database_path).await?;
    let provider = client_provider(&config).await?;
    let bind = config.rpc_bind;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        simulation = config.simulation,
        servers = config.servers.len(),
        "Starting wexd"
    );

    let orchestrator = Orchestrator::new(AppContext::new(config, db_conn, provider));
    let server = RpcServer::bind(orchestrator.clone(), bind).await?;

    tokio::select! {
        result = server.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            server.shutdown();
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

/// In simulation mode every configured server is an in-memory server with
/// the demo logs and the configured user.
async fn client_provider(config: &AppConfig) -> Result<Arc<dyn ClientProvider>> {
    if !config.simulation {
        return Ok(Arc::new(RestProvider::new(config.request_timeout())?));
    }

    let sim = SimulatedWitsml::new();
    for server in &config.servers {
        sim.add_server(&server.url).await;
        if let (Some(username), Some(password)) = (&server.username, &server.password) {
            sim.add_user(&server.url, username, password).await;
        }
        sim.seed_demo_logs(&server.url).await;
    }
    Ok(Arc::new(sim))
}

async fn wait_for_job(client: &RpcClient, job_id: &str) -> Result<()> {
    loop {
        let job = client.job(job_id).await?;
        if job.status.is_terminal() {
            let reason = job.reason.unwrap_or_default();
            if job.status == JobStatus::Finished {
                println!("{}: {}", job.status, reason);
                return Ok(());
            }
            bail!("Job {} {}: {}", job_id, job.status, reason);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
