use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the restriction table first (links reference it), then `jobs` and
/// `job_restrictions`. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    bastion_restrictions::db::init_db(conn)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id           TEXT NOT NULL PRIMARY KEY,
            description  TEXT NOT NULL CHECK (length(trim(description)) > 0),
            job_type     TEXT NOT NULL,
            start_at     TEXT NOT NULL,   -- fixed-width RFC 3339, UTC
            finish_at    TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            CHECK (start_at < finish_at)
        );

        -- Activator lookup: which windows contain now?
        CREATE INDEX IF NOT EXISTS idx_jobs_window ON jobs (start_at, finish_at);

        CREATE TABLE IF NOT EXISTS job_restrictions (
            id              TEXT NOT NULL PRIMARY KEY,
            job_id          TEXT NOT NULL REFERENCES jobs(id),
            restriction_id  TEXT NOT NULL REFERENCES restrictions(id),
            created_at      TEXT NOT NULL,
            UNIQUE (job_id, restriction_id)
        );

        CREATE INDEX IF NOT EXISTS idx_job_restrictions_restriction
            ON job_restrictions (restriction_id);
        ",
    )?;
    Ok(())
}

/// Open a connection tuned for bastion: WAL, foreign keys on, and a busy
/// timeout so concurrent writers wait instead of failing immediately.
pub fn open(path: &str, busy_timeout_ms: u64) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}
