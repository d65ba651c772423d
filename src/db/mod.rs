//! Record store for fetchwatch
//!
//! Handles SQLite persistence for download records and runtime state.
//! Every mutating call commits durably before returning; there is no
//! write-behind buffering.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — database lifecycle, self-healing open, schema migrations
//! - [`records`] — record CRUD, dedup lookups, derived statistics
//! - [`state`] — runtime state (last check time)

use crate::types::{FileRecord, RecordId, Status};
use chrono::{TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod migrations;
mod records;
mod state;

#[cfg(test)]
mod tests;

/// Record store handle
///
/// Cheap to clone via the inner connection pool; wrap in `Arc` to share
/// between the monitor and the download executor.
#[derive(Debug)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

/// New record to be inserted into the store
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// The URL this record is created for
    pub source_url: String,
    /// Resolved on-disk filename
    pub filename: String,
}

/// Partial update applied to an existing record
///
/// `None` fields are left untouched. `completed_at` is managed internally:
/// it is stamped exactly once, when `status` transitions into
/// [`Status::Completed`].
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    /// New status
    pub status: Option<Status>,
    /// New retry count
    pub retry_count: Option<u32>,
    /// Final on-disk filename (after extension inference and collision
    /// resolution)
    pub filename: Option<String>,
    /// Path the bytes were written to
    pub local_path: Option<String>,
    /// Body size in bytes
    pub size_bytes: Option<u64>,
    /// SHA-256 hex digest of the body
    pub digest: Option<String>,
    /// Declared media type of the response
    pub content_kind: Option<String>,
    /// Last failure message
    pub error_message: Option<String>,
    /// Clear the failure message (wins over `error_message`)
    pub clear_error: bool,
    /// Free-form annotations, stored as JSON
    pub metadata: Option<serde_json::Value>,
}

/// Record row from the database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    /// Unique database ID
    pub id: i64,
    /// The URL this record was created for
    pub source_url: String,
    /// Resolved on-disk filename
    pub filename: String,
    /// Path of the written file
    pub local_path: Option<String>,
    /// Body size in bytes
    pub size_bytes: Option<i64>,
    /// SHA-256 hex digest of the body
    pub digest: Option<String>,
    /// Declared media type of the response
    pub content_kind: Option<String>,
    /// Status code (see [`Status`])
    pub status: i32,
    /// Retry attempts consumed
    pub retry_count: i64,
    /// Last failure message
    pub error_message: Option<String>,
    /// Unix timestamp when the record was created
    pub created_at: i64,
    /// Unix timestamp when the record last changed
    pub updated_at: i64,
    /// Unix timestamp when the record completed
    pub completed_at: Option<i64>,
    /// Free-form annotations as a JSON string
    pub metadata: Option<String>,
}

impl From<RecordRow> for FileRecord {
    fn from(row: RecordRow) -> Self {
        let to_datetime = |ts: i64| Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now);

        FileRecord {
            id: RecordId::new(row.id),
            source_url: row.source_url,
            filename: row.filename,
            local_path: row.local_path.map(PathBuf::from),
            size_bytes: row.size_bytes.map(|s| s as u64),
            digest: row.digest,
            content_kind: row.content_kind,
            status: Status::from_i32(row.status),
            retry_count: row.retry_count as u32,
            error_message: row.error_message,
            created_at: to_datetime(row.created_at),
            updated_at: to_datetime(row.updated_at),
            completed_at: row.completed_at.map(to_datetime),
            metadata: row
                .metadata
                .and_then(|m| serde_json::from_str(&m).ok()),
        }
    }
}
