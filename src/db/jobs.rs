//! Job history: one row per job plus an append-only status log.

use anyhow::{Result, anyhow};
use serde::Serialize;
use tokio_rusqlite::{Connection, params, rusqlite};
use uuid::Uuid;

use crate::core::models::{Job, JobStatus};

/// A job as recorded in the history, with its latest status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHistoryEntry {
    pub id: String,
    pub job_type: String,
    pub description: String,
    pub status: String,
    pub reason: Option<String>,
    pub created_at: String,
}

pub async fn create(conn: &Connection, job: &Job) -> Result<()> {
    let (id, job_type, description) = (
        job.id.clone(),
        job.job_type.as_str(),
        job.description.clone(),
    );

    conn.call(move |c| {
        let tx = c.transaction()?;

        tx.execute(
            "INSERT INTO jobs (id, job_type, description) VALUES (?1, ?2, ?3)",
            params![&id, job_type, &description],
        )?;

        let log_id = Uuid::now_v7().to_string();
        tx.execute(
            "INSERT INTO job_status_log (id, job_id, status, description)
             VALUES (?1, ?2, 'Queued', 'Job accepted')",
            params![log_id, &id],
        )?;

        tx.commit()?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;

    Ok(())
}

pub async fn update_status(
    conn: &Connection,
    job_id: String,
    status: JobStatus,
    description: Option<String>,
) -> Result<()> {
    conn.call(move |c| {
        let log_id = Uuid::now_v7().to_string();
        c.execute(
            "INSERT INTO job_status_log (id, job_id, status, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![log_id, job_id, status.as_str(), description],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;

    Ok(())
}

/// Newest first. `status` filters on the latest recorded status.
pub async fn list(
    conn: &Connection,
    limit: u32,
    offset: u32,
    status: Option<JobStatus>,
) -> Result<Vec<JobHistoryEntry>> {
    let status = status.map(|s| s.as_str().to_string());

    conn.call(move |c| {
        let mut stmt = c.prepare(
            "SELECT j.id, j.job_type, j.description, l.status, l.description, j.created_at
             FROM jobs j
             JOIN job_status_log l ON l.seq = (
                 SELECT MAX(seq) FROM job_status_log WHERE job_id = j.id
             )
             WHERE ?1 IS NULL OR l.status = ?1
             ORDER BY j.created_at DESC, j.id DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![status, limit, offset], |row| {
            Ok(JobHistoryEntry {
                id: row.get(0)?,
                job_type: row.get(1)?,
                description: row.get(2)?,
                status: row.get(3)?,
                reason: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, rusqlite::Error>>()
    })
    .await
    .map_err(|e| anyhow!("Failed to list job history: {}", e))
}

/// Status transitions of one job, oldest first.
pub async fn status_log(conn: &Connection, job_id: String) -> Result<Vec<(String, Option<String>)>> {
    conn.call(move |c| {
        let mut stmt = c.prepare(
            "SELECT status, description FROM job_status_log WHERE job_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![job_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, rusqlite::Error>>()
    })
    .await
    .map_err(|e| anyhow!("Failed to read status log: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::JobType;

    #[tokio::test]
    async fn test_history_tracks_latest_status() {
        let conn = crate::db::init_in_memory().await.unwrap();

        let a = Job::new("a".into(), JobType::AnalyzeGaps, "gaps".into());
        let b = Job::new("b".into(), JobType::CompareLogs, "compare".into());
        create(&conn, &a).await.unwrap();
        create(&conn, &b).await.unwrap();

        update_status(&conn, "a".into(), JobStatus::Running, None).await.unwrap();
        update_status(&conn, "a".into(), JobStatus::Failed, Some("Cancelled".into()))
            .await
            .unwrap();

        let all = list(&conn, 10, 0, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let failed = list(&conn, 10, 0, Some(JobStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "a");
        assert_eq!(failed[0].reason.as_deref(), Some("Cancelled"));

        let queued = list(&conn, 10, 0, Some(JobStatus::Queued)).await.unwrap();
        assert_eq!(queued[0].id, "b");

        let log = status_log(&conn, "a".into()).await.unwrap();
        let statuses: Vec<&str> = log.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(statuses, vec!["Queued", "Running", "Failed"]);
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let conn = crate::db::init_in_memory().await.unwrap();
        for id in ["a", "b", "c"] {
            create(&conn, &Job::new(id.into(), JobType::AnalyzeGaps, "gaps".into()))
                .await
                .unwrap();
        }

        assert_eq!(list(&conn, 2, 0, None).await.unwrap().len(), 2);
        assert_eq!(list(&conn, 2, 2, None).await.unwrap().len(), 1);
    }
}
