//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;

/// Columns the rest of the crate assumes are present on `test_runs`.
const EXPECTED_COLUMNS: &[&str] = &[
    "id",
    "created_at",
    "category",
    "name",
    "status",
    "duration",
    "error_message",
    "report_path",
    "is_cloud",
];

const CREATE_TABLES: &str = "CREATE TABLE IF NOT EXISTS test_runs (
        id INTEGER PRIMARY KEY,
        created_at TEXT NOT NULL,
        category TEXT NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        duration REAL NOT NULL DEFAULT 0,
        error_message TEXT,
        report_path TEXT,
        is_cloud INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_test_runs_created ON test_runs(created_at);
    CREATE INDEX IF NOT EXISTS idx_test_runs_category ON test_runs(category);";

/// Run all pending migrations.
///
/// If an existing `test_runs` table is missing any expected column (an old
/// or foreign schema), the table is dropped and rebuilt. This is an explicit,
/// destructive recovery path; existing rows are lost.
pub fn migrate(conn: &Connection) -> Result<()> {
    if table_exists(conn, "test_runs")? && !has_expected_columns(conn)? {
        warn!("test_runs schema mismatch detected, rebuilding table (existing rows dropped)");
        conn.execute("DROP TABLE test_runs", [])?;
    }

    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn has_expected_columns(conn: &Connection) -> Result<bool> {
    for column in EXPECTED_COLUMNS {
        let present: i64 = conn.query_row(
            "SELECT count(*) FROM pragma_table_info('test_runs') WHERE name = ?1",
            [column],
            |row| row.get(0),
        )?;
        if present == 0 {
            return Ok(false);
        }
    }
    Ok(true)
}
