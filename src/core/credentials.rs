//! Per-server credentials and the authorization cache.
//!
//! Credentials come from configuration or from an explicit login. A
//! successful handshake turns them into a [`CredentialsToken`] cached per
//! server URL; any 401-class response invalidates the token for that
//! server and the next `authorize` performs a fresh handshake.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::servers::{ServerRegistry, normalize_url};
use crate::error::JobError;
use crate::witsml::{ClientError, ClientProvider};

/// A password or API secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub server_url: String,
    pub username: String,
    pub secret: Secret,
}

impl Credentials {
    pub fn new(server_url: &str, username: &str, secret: &str) -> Self {
        Self {
            server_url: normalize_url(server_url),
            username: username.to_string(),
            secret: Secret::new(secret),
        }
    }
}

/// Credentials that passed the authorization handshake.
#[derive(Debug, Clone)]
pub struct CredentialsToken {
    pub server_url: String,
    pub username: String,
    pub secret: Secret,
    pub issued_at: DateTime<Utc>,
}

/// Whether credentials are established for a server, for callers deciding
/// whether to prompt for a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsPresence {
    pub server_url: String,
    pub username: Option<String>,
    pub authorized: bool,
}

/// Process-wide credentials cache. Entries exist only for servers in the
/// registry, so the cache is bounded by the server list.
pub struct CredentialsService {
    servers: Arc<ServerRegistry>,
    provider: Arc<dyn ClientProvider>,
    known: RwLock<HashMap<String, Credentials>>,
    tokens: RwLock<HashMap<String, CredentialsToken>>,
}

impl CredentialsService {
    pub fn new(
        servers: Arc<ServerRegistry>,
        provider: Arc<dyn ClientProvider>,
        initial: Vec<Credentials>,
    ) -> Self {
        let known = initial
            .into_iter()
            .filter(|c| servers.contains(&c.server_url))
            .map(|c| (c.server_url.clone(), c))
            .collect();

        Self {
            servers,
            provider,
            known: RwLock::new(known),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached token for `server_url`, or authorize with the
    /// stored credentials.
    pub async fn authorize(&self, server_url: &str) -> Result<CredentialsToken, JobError> {
        let url = self.known_url(server_url)?;

        if let Some(token) = self.tokens.read().await.get(&url) {
            return Ok(token.clone());
        }

        let credentials = self.known.read().await.get(&url).cloned().ok_or_else(|| {
            JobError::Authorization {
                server: url.clone(),
                message: "no credentials available for server".to_string(),
            }
        })?;

        self.handshake(credentials).await
    }

    /// Exchange new credentials for a token. Stored only if the handshake
    /// succeeds.
    pub async fn login(
        &self,
        server_url: &str,
        username: &str,
        secret: &str,
    ) -> Result<CredentialsPresence, JobError> {
        let url = self.known_url(server_url)?;
        let credentials = Credentials::new(&url, username, secret);

        self.handshake(credentials.clone()).await?;
        self.known.write().await.insert(url.clone(), credentials);

        Ok(self.presence(&url).await)
    }

    pub async fn presence(&self, server_url: &str) -> CredentialsPresence {
        let url = normalize_url(server_url);
        let username = self
            .known
            .read()
            .await
            .get(&url)
            .map(|c| c.username.clone());
        let authorized = self.tokens.read().await.contains_key(&url);

        CredentialsPresence {
            server_url: url,
            username,
            authorized,
        }
    }

    /// Drop the cached token for a server after a 401-class response.
    pub async fn invalidate(&self, server_url: &str) {
        let url = normalize_url(server_url);
        if self.tokens.write().await.remove(&url).is_some() {
            debug!(server = %url, "Invalidated cached credentials");
        }
    }

    pub fn provider(&self) -> &Arc<dyn ClientProvider> {
        &self.provider
    }

    fn known_url(&self, server_url: &str) -> Result<String, JobError> {
        self.servers
            .get(server_url)
            .map(|s| s.url.clone())
            .ok_or_else(|| JobError::not_found("Server", server_url))
    }

    async fn handshake(&self, credentials: Credentials) -> Result<CredentialsToken, JobError> {
        let url = credentials.server_url.clone();

        match self.provider.handshake(&credentials).await {
            Ok(()) => {
                let token = CredentialsToken {
                    server_url: url.clone(),
                    username: credentials.username,
                    secret: credentials.secret,
                    issued_at: Utc::now(),
                };
                self.tokens.write().await.insert(url.clone(), token.clone());
                info!(server = %url, username = %token.username, "Authorized against server");
                Ok(token)
            }
            Err(ClientError::Unauthorized(message)) => {
                warn!(server = %url, "Authorization rejected");
                Err(JobError::Authorization {
                    server: url,
                    message,
                })
            }
            Err(err) => Err(JobError::from_client(&url, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Server;
    use crate::witsml::SimulatedWitsml;

    const URL: &str = "https://witsml.example";

    async fn setup() -> (SimulatedWitsml, CredentialsService) {
        let sim = SimulatedWitsml::new();
        sim.add_server(URL).await;
        sim.add_user(URL, "alice", "pw").await;

        let registry = Arc::new(ServerRegistry::new(vec![Server {
            id: "1".into(),
            name: "Example".into(),
            url: URL.into(),
            description: String::new(),
        }]));
        let service = CredentialsService::new(
            registry,
            Arc::new(sim.clone()),
            vec![Credentials::new(URL, "alice", "pw")],
        );
        (sim, service)
    }

    #[test]
    fn test_secret_is_redacted() {
        let creds = Credentials::new(URL, "alice", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_authorize_caches_token() {
        let (sim, service) = setup().await;

        assert!(!service.presence(URL).await.authorized);
        service.authorize(URL).await.unwrap();
        service.authorize(URL).await.unwrap();

        assert_eq!(sim.handshake_count(URL).await, 1);
        let presence = service.presence(URL).await;
        assert!(presence.authorized);
        assert_eq!(presence.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_handshake() {
        let (sim, service) = setup().await;
        service.authorize(URL).await.unwrap();
        service.invalidate(URL).await;
        assert!(!service.presence(URL).await.authorized);

        service.authorize(URL).await.unwrap();
        assert_eq!(sim.handshake_count(URL).await, 2);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_authorization_errors() {
        let (sim, service) = setup().await;
        sim.remove_user(URL, "alice").await;

        let err = service.authorize(URL).await.unwrap_err();
        assert!(matches!(err, JobError::Authorization { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let (sim, service) = setup().await;
        sim.fail_next_calls(URL, 1).await;

        let err = service.authorize(URL).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_login_stores_only_valid_credentials() {
        let (sim, service) = setup().await;
        sim.add_user(URL, "bob", "secret").await;

        let err = service.login(URL, "bob", "wrong").await.unwrap_err();
        assert!(matches!(err, JobError::Authorization { .. }));
        assert_eq!(service.presence(URL).await.username.as_deref(), Some("alice"));

        let presence = service.login(URL, "bob", "secret").await.unwrap();
        assert!(presence.authorized);
        assert_eq!(presence.username.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_unknown_server_is_not_found() {
        let (_sim, service) = setup().await;
        let err = service.authorize("https://other.example").await.unwrap_err();
        assert!(matches!(err, JobError::NotFound { entity: "Server", .. }));
    }
}
