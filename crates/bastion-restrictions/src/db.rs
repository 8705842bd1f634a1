use rusqlite::{Connection, Result};

/// Initialise the restrictions table. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS restrictions (
            id          TEXT PRIMARY KEY NOT NULL,
            category    TEXT NOT NULL,
            scope       TEXT NOT NULL,
            value       TEXT NOT NULL,
            state       TEXT NOT NULL DEFAULT 'disabled',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        -- One global rule per category. Per-address rules are not unique:
        -- two windows may whitelist the same IP independently.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_restrictions_global
            ON restrictions (category, scope, value) WHERE scope = 'all';

        CREATE INDEX IF NOT EXISTS idx_restrictions_state
            ON restrictions (state);",
    )
}
