//! SQLite result store -- schema, inserts, queries, retention.
//!
//! Storage errors propagate to the caller: a dead store is a fatal
//! precondition for the whole appliance, so nothing here substitutes a
//! fallback. Connections are pool-scoped per operation and never held
//! across a backend call.

pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use serde::Serialize;
use tracing::{info, warn};

use crate::dispatch::result::RunStatus;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create database directory: {}", dir.display()))?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// An in-memory pool for tests.
pub fn open_memory_pool() -> Result<Pool> {
    let manager = SqliteConnectionManager::memory();
    let pool = R2D2Pool::builder().max_size(1).build(manager)?;
    let conn = pool.get()?;
    schema::migrate(&conn)?;
    Ok(pool)
}

/// A persisted test-run record.
#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub category: String,
    pub name: String,
    pub status: RunStatus,
    pub duration: f64,
    pub error_message: Option<String>,
    pub report_path: Option<String>,
    pub is_cloud: bool,
}

/// Fields the caller supplies for a new row. The store assigns id and
/// timestamp itself.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub category: String,
    pub name: String,
    pub status: RunStatus,
    pub duration: f64,
    pub error_message: Option<String>,
    pub is_cloud: bool,
}

/// Conjunctive query filters. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub category: Option<String>,
    pub status: Option<RunStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

/// Aggregate counters over the whole table.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
    pub pass_rate: f64,
}

fn timestamp_string(t: DateTime<Utc>) -> String {
    // Fixed-width millisecond RFC 3339 so lexicographic order matches time order.
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Insert a new test-run row. The store sets the timestamp and enforces the
/// status/error_message pairing: a fail without a message gets a generic
/// one, a pass never carries one.
pub fn insert_run(pool: &Pool, new: NewRun) -> Result<TestRun> {
    let conn = pool.get()?;

    let created_at = Utc::now();
    let duration = new.duration.max(0.0);
    let error_message = match new.status {
        RunStatus::Fail => Some(
            new.error_message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "unspecified failure".to_string()),
        ),
        RunStatus::Pass => {
            if new.error_message.is_some() {
                warn!(name = %new.name, "dropping error message on passing run");
            }
            None
        }
    };

    conn.execute(
        "INSERT INTO test_runs (created_at, category, name, status, duration, error_message, is_cloud)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            timestamp_string(created_at),
            new.category,
            new.name,
            new.status.as_str(),
            duration,
            error_message,
            new.is_cloud,
        ],
    )
    .context("failed to insert test run")?;

    let id = conn.last_insert_rowid();
    info!(%id, category = %new.category, name = %new.name, status = %new.status, "recorded test run");

    Ok(TestRun {
        id,
        created_at,
        category: new.category,
        name: new.name,
        status: new.status,
        duration,
        error_message,
        report_path: None,
        is_cloud: new.is_cloud,
    })
}

/// Fill a still-null report_path after the report writers have run. Rows are
/// otherwise immutable; a path that is already set stays as it is.
pub fn set_report_path(pool: &Pool, id: i64, path: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE test_runs SET report_path = ?1 WHERE id = ?2 AND report_path IS NULL",
        rusqlite::params![path, id],
    )
    .context("failed to record report path")?;
    Ok(())
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TestRun> {
    let created_raw: String = row.get(1)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    let status_raw: String = row.get(4)?;
    let status = status_raw.parse::<RunStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
    })?;

    Ok(TestRun {
        id: row.get(0)?,
        created_at,
        category: row.get(2)?,
        name: row.get(3)?,
        status,
        duration: row.get(5)?,
        error_message: row.get(6)?,
        report_path: row.get(7)?,
        is_cloud: row.get::<_, i64>(8)? != 0,
    })
}

const SELECT_COLUMNS: &str =
    "SELECT id, created_at, category, name, status, duration, error_message, report_path, is_cloud
     FROM test_runs";

/// Query rows matching the filter, newest first. Ties on timestamp keep
/// insertion order (id ascending).
pub fn query_runs(pool: &Pool, filter: &RunFilter) -> Result<Vec<TestRun>> {
    let conn = pool.get()?;

    let mut sql = String::from(SELECT_COLUMNS);
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(category) = &filter.category {
        params.push(Box::new(category.clone()));
        clauses.push(format!("category = ?{}", params.len()));
    }
    if let Some(status) = &filter.status {
        params.push(Box::new(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", params.len()));
    }
    if let Some(since) = &filter.since {
        params.push(Box::new(timestamp_string(*since)));
        clauses.push(format!("created_at >= ?{}", params.len()));
    }
    if let Some(until) = &filter.until {
        params.push(Box::new(timestamp_string(*until)));
        clauses.push(format!("created_at <= ?{}", params.len()));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, id ASC");
    if let Some(limit) = filter.limit {
        params.push(Box::new(limit));
        sql.push_str(&format!(" LIMIT ?{}", params.len()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
        map_row,
    )?;

    let mut runs = Vec::new();
    for r in rows {
        runs.push(r?);
    }
    Ok(runs)
}

/// The single most recent row, if any.
pub fn latest_run(pool: &Pool) -> Result<Option<TestRun>> {
    let filter = RunFilter {
        limit: Some(1),
        ..RunFilter::default()
    };
    Ok(query_runs(pool, &filter)?.into_iter().next())
}

/// Aggregate statistics over all rows. pass_rate is 0 for an empty table.
pub fn statistics(pool: &Pool) -> Result<Statistics> {
    let conn = pool.get()?;

    let total: i64 = conn.query_row("SELECT COUNT(*) FROM test_runs", [], |row| row.get(0))?;
    let passed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM test_runs WHERE status = 'pass'",
        [],
        |row| row.get(0),
    )?;
    let failed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM test_runs WHERE status = 'fail'",
        [],
        |row| row.get(0),
    )?;

    let pass_rate = if total > 0 {
        passed as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    Ok(Statistics {
        total,
        passed,
        failed,
        pass_rate,
    })
}

/// Delete every row. Irreversible; the CLI gates this behind `reset --yes`.
pub fn clear_all(pool: &Pool) -> Result<usize> {
    let conn = pool.get()?;
    let deleted = conn.execute("DELETE FROM test_runs", [])?;
    info!(%deleted, "cleared all test runs");
    Ok(deleted)
}

/// Delete rows older than `days`, best-effort removing each row's report
/// artifact first. Artifact deletion failures are logged and skipped, never
/// abort the batch.
pub fn cleanup_old(pool: &Pool, days: i64) -> Result<usize> {
    let conn = pool.get()?;
    let cutoff = timestamp_string(Utc::now() - chrono::Duration::days(days));

    let mut stmt =
        conn.prepare("SELECT id, report_path FROM test_runs WHERE created_at < ?1")?;
    let rows = stmt.query_map([&cutoff], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    for r in rows {
        let (id, report_path) = r?;
        if let Some(path) = report_path {
            let path = Path::new(&path);
            if path.exists() {
                match std::fs::remove_file(path) {
                    Ok(()) => info!(%id, path = %path.display(), "deleted report artifact"),
                    Err(e) => {
                        warn!(%id, path = %path.display(), error = %e, "failed to delete report artifact")
                    }
                }
            }
        }
    }

    let deleted = conn.execute("DELETE FROM test_runs WHERE created_at < ?1", [&cutoff])?;
    info!(%deleted, %days, "cleaned up old test runs");
    Ok(deleted)
}
