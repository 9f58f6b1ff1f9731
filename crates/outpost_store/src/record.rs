//! File records and the pairing naming convention.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Processing state of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Detected, waiting for its sidecar/datum partner to arrive.
    AwaitingPartner,
    /// Ready for upload (paired, unpaired by configuration, or orphaned-then-ready).
    Pending,
    /// Upload confirmed by the remote; safe to evict locally.
    Uploaded,
    /// Partner never arrived within the reaper timeout; uploadable on its own.
    Orphan,
}

impl FileStatus {
    pub const ALL: [FileStatus; 4] = [
        FileStatus::AwaitingPartner,
        FileStatus::Pending,
        FileStatus::Uploaded,
        FileStatus::Orphan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::AwaitingPartner => "AWAITING_PARTNER",
            FileStatus::Pending => "PENDING",
            FileStatus::Uploaded => "UPLOADED",
            FileStatus::Orphan => "ORPHAN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.as_str() == s)
    }
}

impl ToSql for FileStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for FileStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        FileStatus::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown file status '{raw}'").into()))
    }
}

/// A row in the `files` table.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    /// Absolute path; unique across all records.
    pub path: String,
    pub size: u64,
    /// Modification time at detection; the eviction ordering key.
    pub mod_time: DateTime<Utc>,
    pub status: FileStatus,
    /// Set exactly when the record transitions to UPLOADED.
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Forward link to the paired datum/sidecar, if known.
    pub partner_path: Option<String>,
}

impl FileRecord {
    /// Whether this record is a JSON sidecar rather than a datum.
    pub fn is_sidecar(&self) -> bool {
        is_sidecar_path(&self.path)
    }
}

/// Whether a path names a JSON sidecar.
pub fn is_sidecar_path(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Sidecar path for a datum, per the double-extension convention
/// (`img.png` -> `img.png.json`).
pub fn sidecar_path(datum_path: &str) -> String {
    format!("{datum_path}.json")
}

/// Datum path for a sidecar (`img.png.json` -> `img.png`), if the
/// sidecar follows the double-extension convention.
pub fn datum_path(sidecar_path: &str) -> Option<&str> {
    sidecar_path.strip_suffix(".json").filter(|p| !p.is_empty())
}
