use std::sync::Arc;
use std::time::Instant;

use tokio_rusqlite::Connection;

use crate::config::AppConfig;
use crate::core::credentials::CredentialsService;
use crate::core::job_store::JobStore;
use crate::core::notifications::{NotificationChannel, create_notifier};
use crate::core::servers::ServerRegistry;
use crate::witsml::ClientProvider;

/// Process-wide state shared by the orchestrator and the RPC handlers.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: Connection,
    pub jobs: JobStore,
    pub servers: Arc<ServerRegistry>,
    pub credentials: Arc<CredentialsService>,
    pub notifier: Option<Arc<dyn NotificationChannel>>,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(config: AppConfig, db: Connection, provider: Arc<dyn ClientProvider>) -> Self {
        let servers = Arc::new(ServerRegistry::new(config.server_list()));
        let credentials = Arc::new(CredentialsService::new(
            servers.clone(),
            provider,
            config.credentials(),
        ));
        let notifier = create_notifier(&config.notifications);
        let jobs = JobStore::with_retention(config.retained_jobs);

        Self {
            config: Arc::new(config),
            db,
            jobs,
            servers,
            credentials,
            notifier,
            started_at: Instant::now(),
        }
    }
}
