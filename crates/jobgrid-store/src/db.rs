use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Each table keeps the full record as a JSON `record`/`definition` column
/// next to the columns queries filter on, so schema migrations are only
/// needed when a *filter* changes. All statements are idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id          TEXT NOT NULL PRIMARY KEY,
            code        TEXT NOT NULL,
            job_group   TEXT NOT NULL,
            job_type    TEXT NOT NULL,
            cluster     TEXT NOT NULL,
            status      TEXT NOT NULL,
            modified    TEXT,               -- ISO-8601 or NULL
            definition  TEXT NOT NULL       -- JSON-encoded JobDefinition
        ) STRICT;

        -- Status exchange filters on (cluster, job_group, job_type, status)
        CREATE INDEX IF NOT EXISTS idx_jobs_exchange
            ON jobs (cluster, job_group, job_type, status);
        CREATE INDEX IF NOT EXISTS idx_jobs_code ON jobs (code);

        CREATE TABLE IF NOT EXISTS iterations (
            id          TEXT NOT NULL PRIMARY KEY,
            job_id      TEXT NOT NULL,
            status      TEXT NOT NULL,
            timestamp   TEXT NOT NULL,      -- ISO-8601
            record      TEXT NOT NULL       -- JSON-encoded JobIteration
        ) STRICT;

        -- Paged history reads newest-first per job; cleanup scans by time
        CREATE INDEX IF NOT EXISTS idx_iterations_job_ts
            ON iterations (job_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_iterations_ts ON iterations (timestamp);

        CREATE TABLE IF NOT EXISTS agents (
            id          TEXT NOT NULL PRIMARY KEY,
            cluster     TEXT NOT NULL,
            record      TEXT NOT NULL       -- JSON-encoded AgentDefinition
        ) STRICT;
        ",
    )?;
    Ok(())
}
