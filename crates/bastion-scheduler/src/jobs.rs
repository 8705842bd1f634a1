use bastion_core::time::{format_ts, now_ts};
use bastion_core::JobId;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::{Result, SchedulerError};
use crate::types::{Job, JobType};

/// Insert a job row. Fields are expected to be validated already; the table's
/// CHECK constraints reject a blank description or an inverted window anyway.
pub fn insert_job(
    conn: &Connection,
    description: &str,
    job_type: JobType,
    start_at: DateTime<Utc>,
    finish_at: DateTime<Utc>,
) -> Result<Job> {
    let job = Job {
        id: JobId::new(),
        description: description.to_string(),
        job_type,
        start_at,
        finish_at,
        created_at: now_ts(),
    };
    conn.execute(
        "INSERT INTO jobs (id, description, job_type, start_at, finish_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            job.id.as_str(),
            job.description,
            job.job_type.to_string(),
            format_ts(job.start_at),
            format_ts(job.finish_at),
            job.created_at,
        ],
    )?;
    Ok(job)
}

/// Load a job by primary key. `None` when absent.
pub fn get_job(conn: &Connection, id: &JobId) -> Result<Option<Job>> {
    match conn.query_row(
        "SELECT id, description, job_type, start_at, finish_at, created_at
         FROM jobs WHERE id = ?1",
        params![id.as_str()],
        row_to_job,
    ) {
        Ok(job) => Ok(Some(job)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(SchedulerError::Store(e)),
    }
}

pub fn count_jobs(conn: &Connection) -> Result<u64> {
    let n: u64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
    Ok(n)
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: JobId::from(row.get::<_, String>(0)?),
        description: row.get(1)?,
        job_type: row
            .get::<_, String>(2)?
            .parse()
            .map_err(|e: String| conversion_failure(2, e))?,
        start_at: instant(row, 3)?,
        finish_at: instant(row, 4)?,
        created_at: row.get(5)?,
    })
}

fn instant(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e.to_string()))
}

fn conversion_failure(idx: usize, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, reason.into())
}
