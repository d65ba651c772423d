//! Record CRUD, dedup lookups, and derived statistics.

use crate::error::StoreError;
use crate::types::{FileRecord, RecordId, Statistics, Status};
use crate::{Error, Result};

use super::{Database, NewRecord, RecordRow, RecordUpdate};

const RECORD_COLUMNS: &str = "id, source_url, filename, local_path, size_bytes, digest, \
     content_kind, status, retry_count, error_message, created_at, updated_at, \
     completed_at, metadata";

impl Database {
    /// Insert a new record with status `Pending` and a zero retry count
    pub async fn insert_record(&self, record: &NewRecord) -> Result<RecordId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO records (source_url, filename, status, retry_count, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&record.source_url)
        .bind(&record.filename)
        .bind(Status::Pending.to_i32())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to insert record: {}",
                e
            )))
        })?;

        Ok(RecordId::new(result.last_insert_rowid()))
    }

    /// Get a record by ID
    pub async fn get_record(&self, id: RecordId) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to get record: {}",
                e
            )))
        })?;

        Ok(row.map(FileRecord::from))
    }

    /// List records, newest first, optionally filtered by status and capped
    pub async fn list_records(
        &self,
        status: Option<Status>,
        limit: Option<u32>,
    ) -> Result<Vec<FileRecord>> {
        // SQLite treats LIMIT -1 as "no limit"
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, RecordRow>(&format!(
                    "SELECT {RECORD_COLUMNS} FROM records WHERE status = ? \
                     ORDER BY created_at DESC, id DESC LIMIT ?"
                ))
                .bind(status.to_i32())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, RecordRow>(&format!(
                    "SELECT {RECORD_COLUMNS} FROM records \
                     ORDER BY created_at DESC, id DESC LIMIT ?"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to list records: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(FileRecord::from).collect())
    }

    /// Apply a partial update to a record
    ///
    /// Returns the updated record, or `Error::NotFound` if no record with
    /// this ID exists. `completed_at` is stamped exactly once, when the
    /// incoming status is `Completed` and no completion time is set yet.
    pub async fn update_record(&self, id: RecordId, update: &RecordUpdate) -> Result<FileRecord> {
        let now = chrono::Utc::now().timestamp();
        let status = update.status.map(|s| s.to_i32());
        let metadata = match &update.metadata {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE records SET
                status = COALESCE(?, status),
                retry_count = COALESCE(?, retry_count),
                filename = COALESCE(?, filename),
                local_path = COALESCE(?, local_path),
                size_bytes = COALESCE(?, size_bytes),
                digest = COALESCE(?, digest),
                content_kind = COALESCE(?, content_kind),
                error_message = CASE WHEN ? THEN NULL ELSE COALESCE(?, error_message) END,
                metadata = COALESCE(?, metadata),
                completed_at = CASE
                    WHEN ? = 3 AND completed_at IS NULL THEN ?
                    ELSE completed_at
                END,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(update.retry_count.map(|r| r as i64))
        .bind(&update.filename)
        .bind(&update.local_path)
        .bind(update.size_bytes.map(|s| s as i64))
        .bind(&update.digest)
        .bind(&update.content_kind)
        .bind(update.clear_error)
        .bind(&update.error_message)
        .bind(&metadata)
        .bind(status)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to update record: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }

        self.get_record(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("record {id}")))
    }

    /// Reset a failed record for a manual re-queue
    ///
    /// Sets status back to `Pending`, zeroes the retry count, and clears the
    /// failure message. This is the only transition that resets `retry_count`.
    pub async fn reset_record_for_retry(&self, id: RecordId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE records
            SET status = ?, retry_count = 0, error_message = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Status::Pending.to_i32())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to reset record: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }

        Ok(())
    }

    /// Whether a completed record exists for this source URL
    pub async fn is_source_completed(&self, source_url: &str) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM records WHERE source_url = ? AND status = ?)",
        )
        .bind(source_url)
        .bind(Status::Completed.to_i32())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to check source dedup: {}",
                e
            )))
        })?;

        Ok(exists != 0)
    }

    /// Whether a completed record exists with this content digest
    pub async fn is_digest_completed(&self, digest: &str) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM records WHERE digest = ? AND status = ?)",
        )
        .bind(digest)
        .bind(Status::Completed.to_i32())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to check digest dedup: {}",
                e
            )))
        })?;

        Ok(exists != 0)
    }

    /// Compute statistics by aggregation over current records
    pub async fn statistics(&self) -> Result<Statistics> {
        let (completed, total_size, pending, downloading, failed, skipped): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(CASE WHEN status = 3 THEN 1 END),
                COALESCE(SUM(CASE WHEN status = 3 THEN size_bytes END), 0),
                COUNT(CASE WHEN status = 0 THEN 1 END),
                COUNT(CASE WHEN status IN (1, 2) THEN 1 END),
                COUNT(CASE WHEN status = 4 THEN 1 END),
                COUNT(CASE WHEN status = 5 THEN 1 END)
            FROM records
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to compute statistics: {}",
                e
            )))
        })?;

        Ok(Statistics {
            total_completed: completed as u64,
            total_size_bytes: total_size as u64,
            pending: pending as u64,
            downloading: downloading as u64,
            failed: failed as u64,
            skipped: skipped as u64,
            last_check_time: self.last_check_time().await?,
        })
    }
}
