//! SQLite-backed store implementation.
//!
//! One connection, WAL journal mode, 5 s busy timeout. Writers serialize
//! through the connection mutex; the original deployment pinned the pool to
//! a single connection for the same reason. All timestamps are stored as
//! INTEGER milliseconds since the Unix epoch.

use crate::error::{Result, StoreError};
use crate::record::{datum_path, sidecar_path, FileRecord, FileStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    size INTEGER NOT NULL,
    mod_time INTEGER NOT NULL,
    status TEXT NOT NULL,
    uploaded_at INTEGER,
    partner_path TEXT
);
CREATE INDEX IF NOT EXISTS idx_files_status_mod_time ON files(status, mod_time);
"#;

const RECORD_COLUMNS: &str = "id, path, size, mod_time, status, uploaded_at, partner_path";

/// Convert milliseconds since epoch to DateTime
fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let mod_time_millis: i64 = row.get(3)?;
    let uploaded_at_millis: Option<i64> = row.get(5)?;
    let size: i64 = row.get(2)?;
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        size: size.max(0) as u64,
        mod_time: millis_to_datetime(mod_time_millis),
        status: row.get(4)?,
        uploaded_at: uploaded_at_millis.map(millis_to_datetime),
        partner_path: row.get(6)?,
    })
}

/// Durable catalog of files under management.
pub struct Store {
    conn: Mutex<Connection>,
    expect_sidecar: bool,
}

impl Store {
    /// Open or create the database at `path` and run migrations.
    ///
    /// `expect_sidecar` controls whether a datum arriving without its
    /// sidecar waits in AWAITING_PARTNER (`true`) or registers PENDING
    /// immediately (`false`).
    pub fn open(path: &Path, expect_sidecar: bool) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // journal_mode returns the resulting mode as a row
        conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            expect_sidecar,
        })
    }

    pub fn expect_sidecar(&self) -> bool {
        self.expect_sidecar
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Register a detected file and attempt to pair it with its partner.
    ///
    /// All-or-nothing: on conflict by path the existing row's size,
    /// mod_time, status and partner link are overwritten (the file is
    /// being rewritten; re-ingest is desired).
    pub fn register_file(
        &self,
        path: &str,
        size: u64,
        mod_time: DateTime<Utc>,
        is_meta: bool,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let lookup = if is_meta {
            datum_path(path).map(str::to_string)
        } else {
            Some(sidecar_path(path))
        };

        let partner: Option<(i64, String)> = match &lookup {
            Some(partner_path) => tx
                .query_row(
                    "SELECT id, path FROM files WHERE path = ?1",
                    params![partner_path],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?,
            None => None,
        };

        match partner {
            Some((partner_id, partner_path)) => {
                // Pair found: both records go PENDING and link to each other
                // in the same transaction.
                tx.execute(
                    r#"
                    INSERT INTO files (path, size, mod_time, status, uploaded_at, partner_path)
                    VALUES (?1, ?2, ?3, ?4, NULL, ?5)
                    ON CONFLICT(path) DO UPDATE SET
                        size = excluded.size,
                        mod_time = excluded.mod_time,
                        status = excluded.status,
                        uploaded_at = NULL,
                        partner_path = excluded.partner_path
                    "#,
                    params![
                        path,
                        size as i64,
                        mod_time.timestamp_millis(),
                        FileStatus::Pending,
                        partner_path,
                    ],
                )?;
                tx.execute(
                    "UPDATE files SET status = ?1, uploaded_at = NULL, partner_path = ?2 WHERE id = ?3",
                    params![FileStatus::Pending, path, partner_id],
                )?;
            }
            None => {
                // No partner yet. A lone sidecar cannot know its datum's
                // extension, so its partner link stays NULL; a lone datum
                // waits for the double-extension sidecar unless sidecars
                // are not expected at all.
                let (status, partner_path) = if is_meta {
                    (FileStatus::AwaitingPartner, None)
                } else if !self.expect_sidecar {
                    (FileStatus::Pending, None)
                } else {
                    (FileStatus::AwaitingPartner, lookup)
                };
                tx.execute(
                    r#"
                    INSERT INTO files (path, size, mod_time, status, uploaded_at, partner_path)
                    VALUES (?1, ?2, ?3, ?4, NULL, ?5)
                    ON CONFLICT(path) DO UPDATE SET
                        size = excluded.size,
                        mod_time = excluded.mod_time,
                        status = excluded.status,
                        uploaded_at = NULL,
                        partner_path = excluded.partner_path
                    "#,
                    params![path, size as i64, mod_time.timestamp_millis(), status, partner_path],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Move AWAITING_PARTNER records older than `timeout` to ORPHAN.
    ///
    /// Returns the number of records reaped.
    pub fn mark_orphans(&self, timeout: Duration) -> Result<usize> {
        let deadline = Utc::now()
            - chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let conn = self.lock()?;
        let reaped = conn.execute(
            "UPDATE files SET status = ?1 WHERE status = ?2 AND mod_time < ?3",
            params![
                FileStatus::Orphan,
                FileStatus::AwaitingPartner,
                deadline.timestamp_millis()
            ],
        )?;
        Ok(reaped)
    }

    /// Mark a file as uploaded and stamp `uploaded_at`. Idempotent.
    pub fn mark_uploaded(&self, path: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE files SET status = ?1, uploaded_at = ?2 WHERE path = ?3",
            params![FileStatus::Uploaded, Utc::now().timestamp_millis(), path],
        )?;
        Ok(())
    }

    /// Delete a record, unlinking any partner that still points at it.
    ///
    /// The unlink and the delete commit together so no record is left
    /// waiting on a partner that no longer exists.
    pub fn remove_file(&self, path: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE files SET partner_path = NULL WHERE partner_path = ?1",
            params![path],
        )?;
        tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        tx.commit()?;
        Ok(())
    }

    /// Files waiting to be uploaded (PENDING and ORPHAN), least recently
    /// modified first.
    pub fn get_pending_files(&self, limit: usize) -> Result<Vec<FileRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM files WHERE status IN (?1, ?2) ORDER BY mod_time ASC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![FileStatus::Pending, FileStatus::Orphan, limit as i64],
            record_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Files that are safe to evict (UPLOADED), least recently modified first.
    pub fn get_prune_candidates(&self, limit: usize) -> Result<Vec<FileRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM files WHERE status = ?1 ORDER BY mod_time ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![FileStatus::Uploaded, limit as i64], record_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Sum of sizes across all records, regardless of status. This is the
    /// byte count the pruner's watermarks are measured against.
    pub fn get_total_size(&self) -> Result<u64> {
        let conn = self.lock()?;
        let total: i64 =
            conn.query_row("SELECT COALESCE(SUM(size), 0) FROM files", [], |row| {
                row.get(0)
            })?;
        Ok(total.max(0) as u64)
    }

    /// Look up a single record by path.
    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM files WHERE path = ?1"),
                params![path],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Total number of records, any status.
    pub fn count_files(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}
