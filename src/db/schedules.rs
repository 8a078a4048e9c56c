//! Schedule state rows for the schedule controller

use crate::error::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::SqlitePool;

/// Persisted schedule state
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: String,
    pub name: String,
    pub workflow: String,
    pub input: String,
    pub interval_seconds: i64,
    pub paused: bool,
    pub running: bool,
    pub last_run_at: Option<NaiveDateTime>,
    pub next_run_at: Option<NaiveDateTime>,
    pub missed_runs: i64,
}

const COLUMNS: &str = "id, name, workflow, input, interval_seconds, paused, running, \
    last_run_at, next_run_at, missed_runs";

fn naive(t: DateTime<Utc>) -> NaiveDateTime {
    t.naive_utc()
}

pub async fn insert(
    pool: &SqlitePool,
    id: &str,
    name: &str,
    workflow: &str,
    input: &str,
    interval_seconds: i64,
    next_run_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO schedules (id, name, workflow, input, interval_seconds, next_run_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(workflow)
    .bind(input)
    .bind(interval_seconds)
    .bind(naive(next_run_at))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<ScheduleRow>> {
    let row = sqlx::query_as(&format!("SELECT {} FROM schedules WHERE name = ?", COLUMNS))
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<ScheduleRow>> {
    let rows = sqlx::query_as(&format!("SELECT {} FROM schedules ORDER BY name", COLUMNS))
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Schedules that are due to run: unpaused, not currently running, and past
/// their next-run time.
pub async fn due(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<ScheduleRow>> {
    let rows = sqlx::query_as(&format!(
        "SELECT {} FROM schedules
         WHERE paused = 0 AND running = 0 AND next_run_at IS NOT NULL AND next_run_at <= ?
         ORDER BY next_run_at ASC",
        COLUMNS
    ))
    .bind(naive(now))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_paused(pool: &SqlitePool, name: &str, paused: bool) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE schedules SET paused = ?, updated_at = CURRENT_TIMESTAMP WHERE name = ?",
    )
    .bind(paused)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Claim a schedule for execution. Returns false when another worker claimed
/// it first (overlap policy: skip while the previous run is still going).
pub async fn try_claim(pool: &SqlitePool, name: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE schedules SET running = 1, updated_at = CURRENT_TIMESTAMP
         WHERE name = ? AND running = 0",
    )
    .bind(name)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_run_complete(
    pool: &SqlitePool,
    name: &str,
    last_run_at: DateTime<Utc>,
    next_run_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE schedules SET running = 0, last_run_at = ?, next_run_at = ?,
            updated_at = CURRENT_TIMESTAMP
         WHERE name = ?",
    )
    .bind(naive(last_run_at))
    .bind(naive(next_run_at))
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Reset the next-run time, bounding catch-up after an unpause: slots missed
/// while paused collapse into at most one immediate execution.
pub async fn set_next_run(
    pool: &SqlitePool,
    name: &str,
    next_run_at: DateTime<Utc>,
    missed_runs: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE schedules SET next_run_at = ?, missed_runs = missed_runs + ?,
            updated_at = CURRENT_TIMESTAMP
         WHERE name = ?",
    )
    .bind(naive(next_run_at))
    .bind(missed_runs)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &SqlitePool, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM schedules WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
