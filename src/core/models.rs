use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::report::Report;

pub const WITSML_INDEX_TYPE_MD: &str = "measured depth";
pub const WITSML_INDEX_TYPE_DATE_TIME: &str = "date time";

pub type JobId = String;

const NAIVE_DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A WITSML endpoint known to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /// Short identifier from the configuration.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Normalized endpoint URL. Also the key for credentials and locks.
    pub url: String,
    #[serde(default)]
    pub description: String,
}

/// Addresses one log on one server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogReference {
    pub well_uid: String,
    pub wellbore_uid: String,
    pub log_uid: String,
    /// Server holding the log. Filled with the default server when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

impl LogReference {
    pub fn new(well_uid: &str, wellbore_uid: &str, log_uid: &str) -> Self {
        Self {
            well_uid: well_uid.to_string(),
            wellbore_uid: wellbore_uid.to_string(),
            log_uid: log_uid.to_string(),
            server_url: None,
        }
    }

    pub fn on_server(mut self, server_url: &str) -> Self {
        self.server_url = Some(server_url.to_string());
        self
    }

    /// The server this log lives on. Empty until resolved at submission.
    pub fn server(&self) -> &str {
        self.server_url.as_deref().unwrap_or_default()
    }

    /// Rejects references with blank uids.
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("wellUid", &self.well_uid),
            ("wellboreUid", &self.wellbore_uid),
            ("logUid", &self.log_uid),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(format!("log reference is missing {}", name));
            }
        }
        Ok(())
    }
}

impl fmt::Display for LogReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.well_uid, self.wellbore_uid, self.log_uid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    #[serde(rename = "measured depth")]
    MeasuredDepth,
    #[serde(rename = "date time")]
    DateTime,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MeasuredDepth => WITSML_INDEX_TYPE_MD,
            Self::DateTime => WITSML_INDEX_TYPE_DATE_TIME,
        }
    }

    /// Short label used in comparison summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MeasuredDepth => "depth",
            Self::DateTime => "time",
        }
    }
}

/// A single index value: a measured depth or a date-time literal as
/// returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Index {
    Depth(f64),
    DateTime(String),
}

impl Index {
    pub fn is_date_time(&self) -> bool {
        matches!(self, Self::DateTime(_))
    }

    pub fn as_depth(&self) -> Option<f64> {
        match self {
            Self::Depth(value) => Some(*value),
            Self::DateTime(_) => None,
        }
    }

    /// Milliseconds since the epoch for date-time values. Values without an
    /// offset are taken as UTC.
    pub fn as_epoch_millis(&self) -> Option<i64> {
        let Self::DateTime(value) = self else {
            return None;
        };
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.timestamp_millis());
        }
        NAIVE_DATE_TIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .map(|naive| naive.and_utc().timestamp_millis())
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Depth(value) => write!(f, "{}", value),
            Self::DateTime(value) => f.write_str(value),
        }
    }
}

/// Per-curve metadata of a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCurveInfo {
    /// Curve name, unique within its log.
    pub mnemonic: String,
    /// First index with a sample. `None` for an empty curve.
    #[serde(default)]
    pub min_index: Option<Index>,
    /// Last index with a sample.
    #[serde(default)]
    pub max_index: Option<Index>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl LogCurveInfo {
    pub fn new(mnemonic: &str, min_index: Option<Index>, max_index: Option<Index>) -> Self {
        Self {
            mnemonic: mnemonic.to_string(),
            min_index,
            max_index,
            unit: None,
        }
    }

    pub fn depth(mnemonic: &str, min: f64, max: f64) -> Self {
        Self::new(mnemonic, Some(Index::Depth(min)), Some(Index::Depth(max)))
    }

    pub fn time(mnemonic: &str, min: &str, max: &str) -> Self {
        Self::new(
            mnemonic,
            Some(Index::DateTime(min.to_string())),
            Some(Index::DateTime(max.to_string())),
        )
    }

    pub fn index_is_date_time(&self) -> bool {
        self.min_index.as_ref().is_some_and(Index::is_date_time)
    }
}

/// Log header as read from a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogObject {
    pub uid: String,
    pub well_uid: String,
    pub wellbore_uid: String,
    pub name: String,
    pub index_type: IndexType,
    /// Mnemonic of the curve that holds the index values.
    pub index_curve: String,
    #[serde(default)]
    pub curves: Vec<LogCurveInfo>,
}

impl LogObject {
    pub fn has_mnemonic(&self, mnemonic: &str) -> bool {
        self.curves.iter().any(|c| c.mnemonic == mnemonic)
    }
}

/// Bulk log data. `values[i]` of every row belongs to `mnemonics[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogData {
    pub mnemonics: Vec<String>,
    pub rows: Vec<LogDataRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogDataRow {
    pub index: Index,
    pub values: Vec<Option<f64>>,
}

impl LogData {
    /// Index values of the rows that carry a sample for `mnemonic`.
    ///
    /// The index curve itself has a sample on every row.
    pub fn sample_indexes(&self, mnemonic: &str, index_curve: &str) -> Vec<&Index> {
        if mnemonic == index_curve {
            return self.rows.iter().map(|row| &row.index).collect();
        }

        let Some(column) = self.mnemonics.iter().position(|m| m == mnemonic) else {
            return Vec::new();
        };

        self.rows
            .iter()
            .filter(|row| row.values.get(column).is_some_and(Option::is_some))
            .map(|row| &row.index)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    RenameMnemonic,
    AnalyzeGaps,
    CompareLogs,
}

impl JobType {
    pub const ALL: [JobType; 3] = [Self::RenameMnemonic, Self::AnalyzeGaps, Self::CompareLogs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RenameMnemonic => "RenameMnemonic",
            Self::AnalyzeGaps => "AnalyzeGaps",
            Self::CompareLogs => "CompareLogs",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Accepted, waiting for its log lock or a worker slot.
    Queued,
    Running,
    Finished,
    /// Failed or cancelled. `reason` says which.
    Failed,
    /// Reserved. No current job type produces it.
    PartiallySucceeded,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::PartiallySucceeded
        )
    }

    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        matches!(
            (from, to),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Finished)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::PartiallySucceeded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Running => "Running",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
            Self::PartiallySucceeded => "PartiallySucceeded",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asynchronous unit of work and, once terminal, its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// UUIDv7, so ids sort by submission time.
    pub id: JobId,
    pub job_type: JobType,
    /// One-line summary of what the job does, built at submission.
    pub description: String,
    pub status: JobStatus,
    /// Percentage, 0 to 100. Never decreases.
    pub progress: u8,
    /// Outcome message once terminal: the summary on success, the error
    /// text on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Set together with `Finished` for analysis jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    pub created_at: DateTime<Utc>,
    /// When the job left the queue. `None` if it never ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, job_type: JobType, description: String) -> Self {
        Self {
            id,
            job_type,
            description,
            status: JobStatus::Queued,
            progress: 0,
            reason: None,
            report: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}
