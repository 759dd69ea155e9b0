use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Worker, WorkerContext, WorkerOutput, require_non_blank, resolve_log};
use crate::core::analysis::{find_gaps, parse_time_gap};
use crate::core::models::{IndexType, JobType, LogReference};
use crate::core::report::{Report, ReportSummary};
use crate::core::servers::ServerRegistry;
use crate::error::{JobError, SubmitError};
use crate::logging::LogThrottle;

/// Time threshold as milliseconds or as an `hh:mm:ss` literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeGapSize {
    Millis(i64),
    Clock(String),
}

impl TimeGapSize {
    pub fn millis(&self) -> Result<i64, String> {
        match self {
            Self::Millis(ms) => Ok(*ms),
            Self::Clock(literal) => parse_time_gap(literal),
        }
    }
}

/// Report sample gaps larger than a threshold for each requested mnemonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeGapsJob {
    pub log_reference: LogReference,
    pub mnemonics: Vec<String>,
    #[serde(default)]
    pub gap_size: Option<f64>,
    #[serde(default)]
    pub time_gap_size: Option<TimeGapSize>,
    #[serde(skip)]
    time_gap_millis: Option<i64>,
}

impl AnalyzeGapsJob {
    pub fn new(
        log_reference: LogReference,
        mnemonics: Vec<String>,
        gap_size: Option<f64>,
        time_gap_size: Option<TimeGapSize>,
    ) -> Self {
        Self {
            log_reference,
            mnemonics,
            gap_size,
            time_gap_size,
            time_gap_millis: None,
        }
    }

    fn threshold(&self, index_type: IndexType) -> Option<f64> {
        match index_type {
            IndexType::MeasuredDepth => self.gap_size.filter(|size| *size > 0.0),
            IndexType::DateTime => self.time_gap_millis.map(|ms| ms as f64),
        }
    }
}

#[async_trait]
impl Worker for AnalyzeGapsJob {
    fn job_type(&self) -> JobType {
        JobType::AnalyzeGaps
    }

    fn prepare(&mut self, servers: &ServerRegistry) -> Result<(), SubmitError> {
        resolve_log("logReference", &mut self.log_reference, servers)?;

        if self.mnemonics.is_empty() {
            return Err(SubmitError::Validation(
                "at least one mnemonic is required".to_string(),
            ));
        }
        for mnemonic in &self.mnemonics {
            require_non_blank("mnemonics", mnemonic)?;
        }

        if let Some(size) = self.gap_size {
            if !size.is_finite() || size < 0.0 {
                return Err(SubmitError::Validation(format!(
                    "gapSize must be a positive number, got {}",
                    size
                )));
            }
        }

        self.time_gap_millis = match &self.time_gap_size {
            Some(size) => {
                let ms = size.millis().map_err(SubmitError::Validation)?;
                if ms < 0 {
                    return Err(SubmitError::Validation(format!(
                        "timeGapSize must not be negative, got {}",
                        ms
                    )));
                }
                (ms > 0).then_some(ms)
            }
            None => None,
        };

        let depth_set = self.gap_size.is_some_and(|size| size > 0.0);
        if !depth_set && self.time_gap_millis.is_none() {
            return Err(SubmitError::Validation(
                "gapSize or timeGapSize must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "Analyze gaps in {} on log {}",
            self.mnemonics.join(", "),
            self.log_reference
        )
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, JobError> {
        let log_ref = &self.log_reference;
        let session = ctx.session(log_ref.server()).await?;

        let log = session
            .get_log(log_ref)
            .await?
            .ok_or_else(|| JobError::not_found("Log", log_ref.to_string()))?;
        ctx.set_progress(10).await;

        let threshold = self.threshold(log.index_type).ok_or_else(|| {
            JobError::Validation(format!(
                "log {} is {} indexed but no {} was given",
                log.uid,
                log.index_type.label(),
                match log.index_type {
                    IndexType::MeasuredDepth => "gapSize",
                    IndexType::DateTime => "timeGapSize",
                }
            ))
        })?;

        let data = session.get_log_data(log_ref, &self.mnemonics).await?;
        ctx.set_progress(40).await;

        let mut throttle = LogThrottle::new(Duration::from_millis(500));
        let total = self.mnemonics.len();
        let mut rows = Vec::new();

        for (i, mnemonic) in self.mnemonics.iter().enumerate() {
            let indexes = data.sample_indexes(mnemonic, &log.index_curve);
            let gaps = find_gaps(mnemonic, &indexes, threshold).map_err(JobError::Validation)?;

            if throttle.should_log() {
                debug!(
                    job_id = %ctx.job_id,
                    mnemonic = %mnemonic,
                    samples = indexes.len(),
                    gaps = gaps.len(),
                    "Analyzed mnemonic {}/{}",
                    i + 1,
                    total
                );
            }

            rows.extend(gaps);
            let done = 40 + (60 * (i + 1) / total) as u8;
            ctx.set_progress(done.min(99)).await;
        }

        let message = if rows.is_empty() {
            format!("No gaps found in {} mnemonics", total)
        } else {
            format!("Found {} gaps in {} mnemonics", rows.len(), total)
        };
        info!(log_uid = %log.uid, gaps = rows.len(), "Gap analysis complete");

        let summary = ReportSummary::Gaps {
            mnemonics_analyzed: total,
            gaps: rows.len(),
            message: message.clone(),
        };
        let report = Report::gaps(format!("Gap analysis of log {}", log.name), summary, rows);

        Ok(WorkerOutput {
            message,
            report: Some(report),
        })
    }
}
