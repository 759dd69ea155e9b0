use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::core::analysis::TimeZoneSetting;
use crate::core::credentials::Credentials;
use crate::core::models::Server;
use crate::core::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/wexd/config.toml";
pub const CONFIG_PATH_ENV: &str = "WEXD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub rpc_bind: SocketAddr,
    pub database_path: PathBuf,
    pub max_concurrent_jobs: usize,
    /// Terminal jobs kept in memory. Older ones are only in the history
    /// database.
    pub retained_jobs: usize,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Timeout for a single HTTP request to a WITSML gateway.
    pub request_timeout_secs: u64,
    pub time_zone: TimeZoneSetting,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
    pub servers: Vec<ServerConfig>,
    pub notifications: NotificationConfig,
}

/// A WITSML server and, optionally, the credentials to use against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub channel: NotificationChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelType {
    #[default]
    None,
    Slack,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_bind: SocketAddr::from(([127, 0, 0, 1], 9420)),
            database_path: PathBuf::from("wexd.db"),
            max_concurrent_jobs: 4,
            retained_jobs: 1000,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            request_timeout_secs: 30,
            time_zone: TimeZoneSetting::Raw,
            simulation: false,
            verbose: false,
            json_logs: false,
            servers: Vec::new(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the default config location, with CLI overrides on top.
    pub fn new<T: Serialize>(args: Option<&T>) -> Result<Self> {
        Self::load(&config_path(), args)
    }

    /// Layering, lowest to highest: defaults, TOML file, `WEXD_*`
    /// environment, CLI arguments.
    pub fn load<T: Serialize>(path: &Path, args: Option<&T>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("WEXD_").ignore(&["config"]).split("__"));

        if let Some(args) = args {
            figment = figment.merge(Serialized::defaults(args));
        }

        let config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            bail!("max_concurrent_jobs must be at least 1");
        }
        if self.retained_jobs == 0 {
            bail!("retained_jobs must be at least 1");
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            bail!("retry_base_delay_ms must not exceed retry_max_delay_ms");
        }

        for (i, server) in self.servers.iter().enumerate() {
            if server.url.trim().is_empty() {
                bail!("servers[{}] ({}) has an empty url", i, server.name);
            }
            if server.username.is_some() != server.password.is_some() {
                bail!("servers[{}] ({}) must set both username and password", i, server.name);
            }
        }

        if self.notifications.channel == NotificationChannelType::Slack
            && self.notifications.slack_webhook.as_deref().unwrap_or("").is_empty()
        {
            bail!("notifications.slack_webhook is required for the slack channel");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn server_list(&self) -> Vec<Server> {
        self.servers
            .iter()
            .map(|s| Server {
                id: s.id.clone(),
                name: s.name.clone(),
                url: s.url.clone(),
                description: s.description.clone(),
            })
            .collect()
    }

    /// Credentials configured alongside the servers.
    pub fn credentials(&self) -> Vec<Credentials> {
        self.servers
            .iter()
            .filter_map(|s| {
                let username = s.username.as_deref()?;
                let password = s.password.as_deref()?;
                Some(Credentials::new(&s.url, username, password))
            })
            .collect()
    }

    /// Effective configuration as TOML, with passwords masked.
    pub fn to_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        for server in &mut redacted.servers {
            if server.password.is_some() {
                server.password = Some("********".to_string());
            }
        }
        toml::to_string_pretty(&redacted).context("Failed to render configuration")
    }
}

pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Serialize)]
    struct Overrides {
        max_concurrent_jobs: usize,
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let config =
            AppConfig::load(Path::new("/nonexistent/wexd.toml"), None::<&Overrides>).unwrap();
        assert_eq!(config.rpc_bind.port(), 9420);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.retained_jobs, 1000);
        assert_eq!(config.time_zone, TimeZoneSetting::Raw);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_file_and_overrides() {
        let file = write_config(
            r#"
            max_concurrent_jobs = 2
            time_zone = "utc"

            [[servers]]
            id = "prod"
            name = "Production"
            url = "https://witsml.example/"
            username = "svc"
            password = "pw"
            "#,
        );

        let config = AppConfig::load(file.path(), None::<&Overrides>).unwrap();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.time_zone, TimeZoneSetting::Utc);
        assert_eq!(config.credentials().len(), 1);
        assert_eq!(config.credentials()[0].server_url, "https://witsml.example");

        let config = AppConfig::load(
            file.path(),
            Some(&Overrides {
                max_concurrent_jobs: 8,
            }),
        )
        .unwrap();
        assert_eq!(config.max_concurrent_jobs, 8);
    }

    #[test]
    fn test_rejects_half_configured_credentials() {
        let file = write_config(
            r#"
            [[servers]]
            id = "a"
            name = "A"
            url = "https://a.example"
            username = "svc"
            "#,
        );
        assert!(AppConfig::load(file.path(), None::<&Overrides>).is_err());
    }

    #[test]
    fn test_rejects_zero_retention() {
        let file = write_config("retained_jobs = 0");
        assert!(AppConfig::load(file.path(), None::<&Overrides>).is_err());
    }

    #[test]
    fn test_toml_masks_passwords() {
        let mut config = AppConfig::default();
        config.servers.push(ServerConfig {
            id: "a".into(),
            name: "A".into(),
            url: "https://a.example".into(),
            description: String::new(),
            username: Some("svc".into()),
            password: Some("hunter2".into()),
        });

        let rendered = config.to_toml().unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("svc"));
    }
}
