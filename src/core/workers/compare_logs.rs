use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Worker, WorkerContext, WorkerOutput, resolve_log};
use crate::core::analysis::{Comparison, compare_curves};
use crate::core::models::{JobType, LogReference};
use crate::core::report::{Report, ReportSummary};
use crate::core::servers::ServerRegistry;
use crate::error::{JobError, SubmitError};

/// Compare the index range of every curve in two logs, possibly on
/// different servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareLogsJob {
    pub source_log: LogReference,
    pub target_log: LogReference,
}

fn summary_message(comparison: &Comparison, source_curves: usize, target_curves: usize) -> String {
    if !comparison.index_types_match {
        return format!(
            "Unable to compare the logs due to different log types. Source is a {} log and target is a {} log.",
            comparison.source_type.label(),
            comparison.target_type.label()
        );
    }

    match comparison.rows.len() {
        0 => format!(
            "All {} source mnemonics match {} target mnemonics",
            source_curves, target_curves
        ),
        n => format!("{} mnemonics have mismatched indexes", n),
    }
}

#[async_trait]
impl Worker for CompareLogsJob {
    fn job_type(&self) -> JobType {
        JobType::CompareLogs
    }

    fn prepare(&mut self, servers: &ServerRegistry) -> Result<(), SubmitError> {
        resolve_log("sourceLog", &mut self.source_log, servers)?;
        resolve_log("targetLog", &mut self.target_log, servers)
    }

    fn describe(&self) -> String {
        format!(
            "Compare log {} on {} with log {} on {}",
            self.source_log,
            self.source_log.server(),
            self.target_log,
            self.target_log.server()
        )
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, JobError> {
        let (source_session, target_session) = tokio::try_join!(
            ctx.session(self.source_log.server()),
            ctx.session(self.target_log.server())
        )?;
        ctx.set_progress(10).await;

        let (source, target) = tokio::try_join!(
            source_session.get_log_curve_info(&self.source_log),
            target_session.get_log_curve_info(&self.target_log)
        )?;
        ctx.set_progress(70).await;

        if source.is_empty() {
            return Err(JobError::SourceNotFound {
                server: self.source_log.server().to_string(),
                log: self.source_log.to_string(),
            });
        }
        if target.is_empty() {
            return Err(JobError::TargetNotFound {
                server: self.target_log.server().to_string(),
                log: self.target_log.to_string(),
            });
        }

        let comparison = compare_curves(&source, &target, ctx.time_zone);
        let message = summary_message(&comparison, source.len(), target.len());
        info!(
            job_id = %ctx.job_id,
            source = %self.source_log,
            target = %self.target_log,
            mismatches = comparison.rows.len(),
            "Log comparison complete"
        );

        let summary = ReportSummary::Comparison {
            index_types_match: comparison.index_types_match,
            source_index_type: comparison.source_type,
            target_index_type: comparison.target_type,
            source_curves: source.len(),
            target_curves: target.len(),
            mismatches: comparison.rows.len(),
            message: message.clone(),
        };
        let title = format!(
            "Log comparison of {} and {}",
            self.source_log.log_uid, self.target_log.log_uid
        );

        Ok(WorkerOutput {
            message,
            report: Some(Report::comparison(title, summary, comparison.rows)),
        })
    }
}
