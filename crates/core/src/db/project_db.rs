use std::path::Path;

use rusqlite::{params, types::Type, Connection, OptionalExtension};
use thiserror::Error;

use crate::db::{RecoveryRunRecord, RunRecordStatus, StoredRejection};
use crate::model::{ArrayResize, StringSliceRecord};
use crate::recovery::{RecoveryMode, RunResult};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Error type for project database operations.
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

/// SQLite-backed project database.
///
/// Thin wrapper around `rusqlite::Connection` that owns schema migrations and
/// the run-history queries. Addresses are stored as their two's-complement
/// `i64` bit pattern.
#[derive(Debug)]
pub struct ProjectDb {
    conn: Connection,
}

impl ProjectDb {
    /// Open (or create) a project database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    /// For most code, prefer higher-level helpers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Schema version currently recorded in the database.
    pub fn schema_version(&self) -> DbResult<i32> {
        current_schema_version(&self.conn)
    }

    /// Insert a recovery run record and return its row id.
    pub fn insert_recovery_run(&self, record: &RecoveryRunRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO recovery_runs (binary, mode, binary_hash, status, accepted, rejected, error, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.binary,
                record.mode.as_str(),
                record.binary_hash,
                record.status.as_str(),
                record.accepted as i64,
                record.rejected as i64,
                record.error,
                record.started_at,
                record.finished_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Persist the slices, resized arrays and rejections of a run in one transaction.
    pub fn insert_run_result(&self, run_id: i64, result: &RunResult) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO recovered_slices (run_id, pointer_address, data_address, length, text)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for slice in &result.slices {
                stmt.execute(params![
                    run_id,
                    slice.pointer_address as i64,
                    slice.data_address as i64,
                    slice.length as i64,
                    slice.text,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO resized_arrays (run_id, address, code_address, previous_length, length)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for resize in &result.resized {
                stmt.execute(params![
                    run_id,
                    resize.address as i64,
                    resize.code_address as i64,
                    resize.previous_length.map(|len| len as i64),
                    resize.length as i64,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO rejections (run_id, address, reason, detail)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;
            for rejection in &result.rejections {
                stmt.execute(params![
                    run_id,
                    rejection.address as i64,
                    rejection.reason.label(),
                    rejection.reason.to_string(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// List recovery runs, optionally filtered by binary name (ordered by id).
    pub fn list_recovery_runs(&self, binary: Option<&str>) -> DbResult<Vec<RecoveryRunRecord>> {
        let mut stmt = if binary.is_some() {
            self.conn.prepare(
                r#"
                SELECT id, binary, mode, binary_hash, status, accepted, rejected, error, started_at, finished_at
                FROM recovery_runs
                WHERE binary = ?1
                ORDER BY id
                "#,
            )?
        } else {
            self.conn.prepare(
                r#"
                SELECT id, binary, mode, binary_hash, status, accepted, rejected, error, started_at, finished_at
                FROM recovery_runs
                ORDER BY id
                "#,
            )?
        };

        let rows = if let Some(bin) = binary {
            stmt.query_map(params![bin], map_run)?
        } else {
            stmt.query_map([], map_run)?
        };

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Fetch a single run by id.
    pub fn get_recovery_run(&self, run_id: i64) -> DbResult<Option<RecoveryRunRecord>> {
        let run = self
            .conn
            .query_row(
                r#"
                SELECT id, binary, mode, binary_hash, status, accepted, rejected, error, started_at, finished_at
                FROM recovery_runs
                WHERE id = ?1
                "#,
                params![run_id],
                map_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Most recent run id for a binary in the given mode, if any.
    pub fn latest_run_id(&self, binary: &str, mode: RecoveryMode) -> DbResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                r#"
                SELECT id FROM recovery_runs
                WHERE binary = ?1 AND mode = ?2
                ORDER BY id DESC
                LIMIT 1
                "#,
                params![binary, mode.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Slices recorded for a run, ordered by pointer address.
    pub fn load_slices(&self, run_id: i64) -> DbResult<Vec<StringSliceRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT pointer_address, data_address, length, text
            FROM recovered_slices
            WHERE run_id = ?1
            ORDER BY pointer_address
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let text: String = row.get(3)?;
            Ok(StringSliceRecord {
                pointer_address: row.get::<_, i64>(0)? as u64,
                data_address: row.get::<_, i64>(1)? as u64,
                length: row.get::<_, i64>(2)? as u64,
                bytes: text.as_bytes().to_vec(),
                text,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Arrays resized by a code-path run, ordered by address.
    pub fn load_resized_arrays(&self, run_id: i64) -> DbResult<Vec<ArrayResize>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT address, code_address, previous_length, length
            FROM resized_arrays
            WHERE run_id = ?1
            ORDER BY address
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(ArrayResize {
                address: row.get::<_, i64>(0)? as u64,
                code_address: row.get::<_, i64>(1)? as u64,
                previous_length: row.get::<_, Option<i64>>(2)?.map(|len| len as u64),
                length: row.get::<_, i64>(3)? as u64,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Rejections recorded for a run, ordered by address.
    pub fn load_rejections(&self, run_id: i64) -> DbResult<Vec<StoredRejection>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT address, reason, detail
            FROM rejections
            WHERE run_id = ?1
            ORDER BY address
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(StoredRejection {
                address: row.get::<_, i64>(0)? as u64,
                reason: row.get(1)?,
                detail: row.get(2)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecoveryRunRecord> {
    let mode: String = row.get(2)?;
    let status: String = row.get(4)?;
    Ok(RecoveryRunRecord {
        id: Some(row.get(0)?),
        binary: row.get(1)?,
        mode: mode.parse::<RecoveryMode>().map_err(|msg| conversion_error(2, msg))?,
        binary_hash: row.get(3)?,
        status: status.parse::<RunRecordStatus>().map_err(|msg| conversion_error(4, msg))?,
        accepted: row.get::<_, i64>(5)? as u64,
        rejected: row.get::<_, i64>(6)? as u64,
        error: row.get(7)?,
        started_at: row.get(8)?,
        finished_at: row.get(9)?,
    })
}

fn conversion_error(column: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, msg.into())
}

/// Apply schema migrations to bring the database up to `CURRENT_SCHEMA_VERSION`.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: fresh DB, no tables.
/// - 1: `recovery_runs`.
/// - 2: per-run detail tables `recovered_slices`, `resized_arrays`, `rejections`.
/// - 3: `recovery_runs.error` for aborted runs.
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        // Initial schema.
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS recovery_runs (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                binary       TEXT NOT NULL,
                mode         TEXT NOT NULL,
                binary_hash  TEXT,
                status       TEXT NOT NULL,
                accepted     INTEGER NOT NULL DEFAULT 0,
                rejected     INTEGER NOT NULL DEFAULT 0,
                started_at   TEXT NOT NULL,
                finished_at  TEXT NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS recovered_slices (
                run_id          INTEGER NOT NULL REFERENCES recovery_runs(id) ON DELETE CASCADE,
                pointer_address INTEGER NOT NULL,
                data_address    INTEGER NOT NULL,
                length          INTEGER NOT NULL,
                text            TEXT NOT NULL,
                PRIMARY KEY (run_id, pointer_address)
            );

            CREATE TABLE IF NOT EXISTS resized_arrays (
                run_id          INTEGER NOT NULL REFERENCES recovery_runs(id) ON DELETE CASCADE,
                address         INTEGER NOT NULL,
                code_address    INTEGER NOT NULL,
                previous_length INTEGER,
                length          INTEGER NOT NULL,
                PRIMARY KEY (run_id, address)
            );

            CREATE TABLE IF NOT EXISTS rejections (
                run_id  INTEGER NOT NULL REFERENCES recovery_runs(id) ON DELETE CASCADE,
                address INTEGER NOT NULL,
                reason  TEXT NOT NULL,
                detail  TEXT NOT NULL,
                PRIMARY KEY (run_id, address)
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
        current_version = 2;
    }

    if current_version < 3 {
        if !column_exists(conn, "recovery_runs", "error")? {
            conn.execute_batch("ALTER TABLE recovery_runs ADD COLUMN error TEXT;")?;
        }
        conn.execute_batch("PRAGMA user_version = 3;")?;
    }

    Ok(())
}

fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
    let pragma = format!("PRAGMA table_info({table});");
    let mut stmt = conn.prepare(&pragma)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in rows {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
