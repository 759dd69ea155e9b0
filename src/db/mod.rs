use std::path::Path;

use anyhow::{Context, Result};
use tokio_rusqlite::Connection;

pub mod jobs;

pub async fn init(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    apply_schema(&conn).await?;
    Ok(conn)
}

/// Throwaway database for tests and dry runs.
pub async fn init_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().await?;
    apply_schema(&conn).await?;
    Ok(conn)
}

async fn apply_schema(conn: &Connection) -> Result<()> {
    conn.call(|conn| {
        conn.execute_batch(include_str!("schema.sql"))?;
        // SQLite leaves foreign keys off unless asked
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        Ok::<(), tokio_rusqlite::rusqlite::Error>(())
    })
    .await
    .context("Failed to apply database schema")?;
    Ok(())
}
