//! Run ledger: a small SQLite database recording per-package extraction outcomes.
//!
//! Batch extraction writes one row per processed package so later invocations
//! (and humans) can see which packages failed and why without re-running tools.

use std::fmt;
use std::path::Path;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Error type for run ledger operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// Terminal classification of one package's extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Skipped,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Skipped => "skipped",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(RunStatus::Ok),
            "skipped" => Some(RunStatus::Skipped),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `extraction_runs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRunRecord {
    /// Raw `name:version` id.
    pub package: String,
    pub sanitized: String,
    pub status: RunStatus,
    /// Whether the package had to be rebuilt from source.
    pub rebuilt: bool,
    pub bridges: Option<u32>,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

/// SQLite-backed run ledger.
pub struct RunDb {
    conn: Connection,
}

impl RunDb {
    /// Open (or create) the ledger at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory ledger, mostly for tests.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn insert_extraction_run(&self, record: &ExtractionRunRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO extraction_runs
                (package, sanitized, status, rebuilt, bridges, error, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.package,
                record.sanitized,
                record.status.as_str(),
                record.rebuilt,
                record.bridges,
                record.error,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List recorded runs in insertion order, optionally filtered by status.
    pub fn list_extraction_runs(
        &self,
        status: Option<RunStatus>,
    ) -> DbResult<Vec<ExtractionRunRecord>> {
        fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtractionRunRecord> {
            let status: String = row.get(2)?;
            Ok(ExtractionRunRecord {
                package: row.get(0)?,
                sanitized: row.get(1)?,
                status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
                rebuilt: row.get(3)?,
                bridges: row.get(4)?,
                error: row.get(5)?,
                started_at: row.get(6)?,
                finished_at: row.get(7)?,
            })
        }

        let mut stmt = if status.is_some() {
            self.conn.prepare(
                r#"
                SELECT package, sanitized, status, rebuilt, bridges, error, started_at, finished_at
                FROM extraction_runs
                WHERE status = ?1
                ORDER BY id
                "#,
            )?
        } else {
            self.conn.prepare(
                r#"
                SELECT package, sanitized, status, rebuilt, bridges, error, started_at, finished_at
                FROM extraction_runs
                ORDER BY id
                "#,
            )?
        };

        let rows = if let Some(s) = status {
            stmt.query_map(params![s.as_str()], map_run)?
        } else {
            stmt.query_map([], map_run)?
        };

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Apply schema migrations to bring the database to the latest version.
///
/// `PRAGMA user_version` holds the schema version:
/// - 0: no schema
/// - 1: extraction_runs table
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version < 1 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS extraction_runs (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                package      TEXT NOT NULL,
                sanitized    TEXT NOT NULL,
                status       TEXT NOT NULL,
                rebuilt      INTEGER NOT NULL,
                bridges      INTEGER,
                error        TEXT,
                started_at   TEXT NOT NULL,
                finished_at  TEXT NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
