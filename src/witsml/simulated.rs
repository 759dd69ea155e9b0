//! In-memory WITSML servers.
//!
//! `SimulatedWitsml` is both the `ClientProvider` handed to the daemon in
//! simulation mode and the controller tests use to seed logs and inject
//! faults (outages, expired sessions, failing updates, latency).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ClientError, ClientProvider, WitsmlClient};
use crate::core::credentials::{Credentials, CredentialsToken, Secret};
use crate::core::models::{
    Index, IndexType, LogCurveInfo, LogData, LogDataRow, LogObject, LogReference,
};
use crate::core::servers::normalize_url;

type LogKey = (String, String, String);

fn log_key(log: &LogReference) -> LogKey {
    (
        log.well_uid.clone(),
        log.wellbore_uid.clone(),
        log.log_uid.clone(),
    )
}

#[derive(Debug, Clone)]
struct StoredLog {
    object: LogObject,
    data: LogData,
}

#[derive(Default)]
struct SimServer {
    users: HashMap<String, String>,
    logs: HashMap<LogKey, StoredLog>,
    unreachable_calls: u32,
    unreachable_handshakes: u32,
    unauthorized_calls: u32,
    fail_index_updates: bool,
    renames_allowed: Option<u32>,
    latency: Option<Duration>,
    handshakes: u32,
    calls: u32,
}

/// Handle to a set of simulated servers. Clones share state.
#[derive(Clone, Default)]
pub struct SimulatedWitsml {
    servers: Arc<Mutex<HashMap<String, SimServer>>>,
}

impl SimulatedWitsml {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_server(&self, url: &str) {
        self.servers
            .lock()
            .await
            .entry(normalize_url(url))
            .or_default();
    }

    pub async fn add_user(&self, url: &str, username: &str, password: &str) {
        self.with_server(url, |s| {
            s.users.insert(username.to_string(), password.to_string());
        })
        .await;
    }

    pub async fn remove_user(&self, url: &str, username: &str) {
        self.with_server(url, |s| {
            s.users.remove(username);
        })
        .await;
    }

    /// Store a log with its data, replacing any log with the same uids.
    pub async fn put_log(&self, url: &str, object: LogObject, data: LogData) {
        let key = (
            object.well_uid.clone(),
            object.wellbore_uid.clone(),
            object.uid.clone(),
        );
        self.with_server(url, |s| {
            s.logs.insert(key, StoredLog { object, data });
        })
        .await;
    }

    /// Current header of a stored log, bypassing authentication.
    pub async fn log(&self, url: &str, log: &LogReference) -> Option<LogObject> {
        let servers = self.servers.lock().await;
        servers
            .get(&normalize_url(url))?
            .logs
            .get(&log_key(log))
            .map(|stored| stored.object.clone())
    }

    /// The next `n` calls (handshakes included) fail as unreachable.
    pub async fn fail_next_calls(&self, url: &str, n: u32) {
        self.with_server(url, |s| s.unreachable_calls = n).await;
    }

    /// The next `n` handshakes fail as unreachable. Data calls are unaffected.
    pub async fn fail_next_handshakes(&self, url: &str, n: u32) {
        self.with_server(url, |s| s.unreachable_handshakes = n).await;
    }

    /// The next `n` data calls answer 401 as if the session expired.
    pub async fn reject_next_calls(&self, url: &str, n: u32) {
        self.with_server(url, |s| s.unauthorized_calls = n).await;
    }

    pub async fn set_fail_index_updates(&self, url: &str, fail: bool) {
        self.with_server(url, |s| s.fail_index_updates = fail).await;
    }

    /// Only the next `n` curve renames succeed; later ones are refused.
    pub async fn allow_renames(&self, url: &str, n: u32) {
        self.with_server(url, |s| s.renames_allowed = Some(n)).await;
    }

    pub async fn set_latency(&self, url: &str, latency: Duration) {
        self.with_server(url, |s| s.latency = Some(latency)).await;
    }

    pub async fn handshake_count(&self, url: &str) -> u32 {
        let servers = self.servers.lock().await;
        servers.get(&normalize_url(url)).map_or(0, |s| s.handshakes)
    }

    /// Number of data calls that reached the server.
    pub async fn call_count(&self, url: &str) -> u32 {
        let servers = self.servers.lock().await;
        servers.get(&normalize_url(url)).map_or(0, |s| s.calls)
    }

    /// Seed a server with a depth log and a time log under well `W-1`.
    pub async fn seed_demo_logs(&self, url: &str) {
        let depth = LogObject {
            uid: "LOG-DEPTH".into(),
            well_uid: "W-1".into(),
            wellbore_uid: "WB-1".into(),
            name: "Demo depth log".into(),
            index_type: IndexType::MeasuredDepth,
            index_curve: "DEPT".into(),
            curves: vec![
                LogCurveInfo::depth("DEPT", 0.0, 1000.0),
                LogCurveInfo::depth("GR", 0.0, 500.0),
                LogCurveInfo::depth("RHOB", 100.0, 1000.0),
            ],
        };
        let depth_rows = (0..=20)
            .map(|i| {
                let md = f64::from(i) * 50.0;
                LogDataRow {
                    index: Index::Depth(md),
                    values: vec![
                        (md <= 500.0 && i != 7).then_some(f64::from(i)),
                        (md >= 100.0).then_some(2.3),
                    ],
                }
            })
            .collect();
        self.put_log(
            url,
            depth,
            LogData {
                mnemonics: vec!["GR".into(), "RHOB".into()],
                rows: depth_rows,
            },
        )
        .await;

        let time = LogObject {
            uid: "LOG-TIME".into(),
            well_uid: "W-1".into(),
            wellbore_uid: "WB-1".into(),
            name: "Demo time log".into(),
            index_type: IndexType::DateTime,
            index_curve: "TIME".into(),
            curves: vec![
                LogCurveInfo::time("TIME", "2024-01-01T00:00:00.000Z", "2024-01-01T00:10:00.000Z"),
                LogCurveInfo::time("HKLD", "2024-01-01T00:00:00.000Z", "2024-01-01T00:10:00.000Z"),
            ],
        };
        let time_rows = [0, 1, 2, 6, 7, 10]
            .into_iter()
            .map(|minute| LogDataRow {
                index: Index::DateTime(format!("2024-01-01T00:{:02}:00.000Z", minute)),
                values: vec![Some(f64::from(minute))],
            })
            .collect();
        self.put_log(
            url,
            time,
            LogData {
                mnemonics: vec!["HKLD".into()],
                rows: time_rows,
            },
        )
        .await;
    }

    async fn with_server(&self, url: &str, f: impl FnOnce(&mut SimServer)) {
        let mut servers = self.servers.lock().await;
        f(servers.entry(normalize_url(url)).or_default());
    }

    /// Admission checks shared by every remote call.
    async fn admit(
        &self,
        url: &str,
        username: &str,
        secret: &Secret,
        handshake: bool,
    ) -> Result<(), ClientError> {
        let latency = {
            let mut servers = self.servers.lock().await;
            let server = servers
                .get_mut(url)
                .ok_or_else(|| ClientError::Unreachable(format!("no route to {}", url)))?;

            if server.unreachable_calls > 0 {
                server.unreachable_calls -= 1;
                return Err(ClientError::Unreachable(format!("{} timed out", url)));
            }

            if handshake && server.unreachable_handshakes > 0 {
                server.unreachable_handshakes -= 1;
                return Err(ClientError::Unreachable(format!("{} refused the login", url)));
            }

            if handshake {
                server.handshakes += 1;
            } else if server.unauthorized_calls > 0 {
                server.unauthorized_calls -= 1;
                return Err(ClientError::Unauthorized("session expired".into()));
            }

            if server.users.get(username).map(String::as_str) != Some(secret.expose()) {
                return Err(ClientError::Unauthorized(format!(
                    "invalid credentials for {}",
                    username
                )));
            }

            if !handshake {
                server.calls += 1;
            }
            server.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ClientProvider for SimulatedWitsml {
    async fn handshake(&self, credentials: &Credentials) -> Result<(), ClientError> {
        let url = normalize_url(&credentials.server_url);
        self.admit(&url, &credentials.username, &credentials.secret, true)
            .await
    }

    async fn client(&self, token: &CredentialsToken) -> Result<Arc<dyn WitsmlClient>, ClientError> {
        let url = normalize_url(&token.server_url);
        if !self.servers.lock().await.contains_key(&url) {
            return Err(ClientError::Unreachable(format!("no route to {}", url)));
        }

        Ok(Arc::new(SimulatedClient {
            sim: self.clone(),
            server_url: url,
            username: token.username.clone(),
            secret: token.secret.clone(),
        }))
    }
}

/// Client bound to one simulated server.
pub struct SimulatedClient {
    sim: SimulatedWitsml,
    server_url: String,
    username: String,
    secret: Secret,
}

impl SimulatedClient {
    async fn admit(&self) -> Result<(), ClientError> {
        self.sim
            .admit(&self.server_url, &self.username, &self.secret, false)
            .await
    }

    async fn with_log<T>(
        &self,
        log: &LogReference,
        f: impl FnOnce(&mut SimServer, LogKey) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        self.admit().await?;
        let mut servers = self.sim.servers.lock().await;
        let server = servers
            .get_mut(&self.server_url)
            .ok_or_else(|| ClientError::Unreachable(self.server_url.clone()))?;
        f(server, log_key(log))
    }
}

#[async_trait]
impl WitsmlClient for SimulatedClient {
    fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn get_log(&self, log: &LogReference) -> Result<Option<LogObject>, ClientError> {
        self.with_log(log, |server, key| {
            Ok(server.logs.get(&key).map(|stored| stored.object.clone()))
        })
        .await
    }

    async fn get_log_curve_info(
        &self,
        log: &LogReference,
    ) -> Result<Vec<LogCurveInfo>, ClientError> {
        self.with_log(log, |server, key| {
            Ok(server
                .logs
                .get(&key)
                .map(|stored| stored.object.curves.clone())
                .unwrap_or_default())
        })
        .await
    }

    async fn get_log_data(
        &self,
        log: &LogReference,
        mnemonics: &[String],
    ) -> Result<LogData, ClientError> {
        let uid = log.log_uid.clone();
        self.with_log(log, move |server, key| {
            let stored = server.logs.get(&key).ok_or(ClientError::NotFound(uid))?;
            let columns: Vec<(String, usize)> = mnemonics
                .iter()
                .filter_map(|m| {
                    let col = stored.data.mnemonics.iter().position(|c| c == m)?;
                    Some((m.clone(), col))
                })
                .collect();

            let rows = stored
                .data
                .rows
                .iter()
                .map(|row| LogDataRow {
                    index: row.index.clone(),
                    values: columns
                        .iter()
                        .map(|(_, col)| row.values.get(*col).copied().flatten())
                        .collect(),
                })
                .collect();

            Ok(LogData {
                mnemonics: columns.into_iter().map(|(m, _)| m).collect(),
                rows,
            })
        })
        .await
    }

    async fn rename_log_curve(
        &self,
        log: &LogReference,
        mnemonic: &str,
        new_mnemonic: &str,
    ) -> Result<(), ClientError> {
        let uid = log.log_uid.clone();
        self.with_log(log, move |server, key| {
            match server.renames_allowed.as_mut() {
                Some(0) => return Err(ClientError::Rejected("curve update refused".into())),
                Some(left) => *left -= 1,
                None => {}
            }
            let stored = server.logs.get_mut(&key).ok_or(ClientError::NotFound(uid))?;
            let curve = stored
                .object
                .curves
                .iter_mut()
                .find(|c| c.mnemonic == mnemonic)
                .ok_or_else(|| ClientError::NotFound(mnemonic.to_string()))?;
            curve.mnemonic = new_mnemonic.to_string();

            for column in stored.data.mnemonics.iter_mut() {
                if column == mnemonic {
                    *column = new_mnemonic.to_string();
                }
            }
            Ok(())
        })
        .await
    }

    async fn update_index_curve(
        &self,
        log: &LogReference,
        index_curve: &str,
    ) -> Result<(), ClientError> {
        let uid = log.log_uid.clone();
        self.with_log(log, move |server, key| {
            if server.fail_index_updates {
                return Err(ClientError::Rejected("index curve update refused".into()));
            }
            let stored = server.logs.get_mut(&key).ok_or(ClientError::NotFound(uid))?;
            stored.object.index_curve = index_curve.to_string();
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const URL: &str = "https://sim.example";

    async fn client(sim: &SimulatedWitsml) -> Arc<dyn WitsmlClient> {
        sim.client(&CredentialsToken {
            server_url: URL.into(),
            username: "u".into(),
            secret: Secret::new("p"),
            issued_at: Utc::now(),
        })
        .await
        .unwrap()
    }

    async fn seeded() -> SimulatedWitsml {
        let sim = SimulatedWitsml::new();
        sim.add_server(URL).await;
        sim.add_user(URL, "u", "p").await;
        sim.seed_demo_logs(URL).await;
        sim
    }

    #[tokio::test]
    async fn test_rename_updates_curves_and_data() {
        let sim = seeded().await;
        let client = client(&sim).await;
        let log = LogReference::new("W-1", "WB-1", "LOG-DEPTH");

        client.rename_log_curve(&log, "GR", "GAMMA").await.unwrap();

        let object = sim.log(URL, &log).await.unwrap();
        assert!(object.has_mnemonic("GAMMA"));
        assert!(!object.has_mnemonic("GR"));
        let data = client.get_log_data(&log, &["GAMMA".to_string()]).await.unwrap();
        assert_eq!(data.mnemonics, vec!["GAMMA".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_log_has_empty_curve_info() {
        let sim = seeded().await;
        let client = client(&sim).await;
        let curves = client
            .get_log_curve_info(&LogReference::new("W-1", "WB-1", "NOPE"))
            .await
            .unwrap();
        assert!(curves.is_empty());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let sim = seeded().await;
        let client = client(&sim).await;
        let log = LogReference::new("W-1", "WB-1", "LOG-DEPTH");

        sim.fail_next_calls(URL, 1).await;
        assert!(matches!(client.get_log(&log).await, Err(ClientError::Unreachable(_))));
        assert!(client.get_log(&log).await.is_ok());

        sim.reject_next_calls(URL, 1).await;
        assert!(matches!(client.get_log(&log).await, Err(ClientError::Unauthorized(_))));
        assert_eq!(sim.call_count(URL).await, 1);
    }
}
