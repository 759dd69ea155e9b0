use super::models::Server;

/// Read-only view of the servers the daemon may talk to. Server definitions
/// are owned by the configuration; the daemon never edits them.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: Vec<Server>,
}

/// URLs are compared without trailing slashes.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

impl ServerRegistry {
    pub fn new(servers: Vec<Server>) -> Self {
        let servers = servers
            .into_iter()
            .map(|mut server| {
                server.url = normalize_url(&server.url);
                server
            })
            .collect();
        Self { servers }
    }

    pub fn get(&self, url: &str) -> Option<&Server> {
        let url = normalize_url(url);
        self.servers.iter().find(|s| s.url == url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    /// The first configured server. Log references without an explicit
    /// server resolve to it.
    pub fn default_server(&self) -> Option<&Server> {
        self.servers.first()
    }

    pub fn all(&self) -> &[Server] {
        &self.servers
    }
}
