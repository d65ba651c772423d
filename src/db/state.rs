//! Runtime state tracking: last poll check time.

use crate::error::StoreError;
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};

use super::Database;

const LAST_CHECK_KEY: &str = "last_check_time";

impl Database {
    /// When the last successful poll cycle ran, if ever
    pub async fn last_check_time(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = ?")
                .bind(LAST_CHECK_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Store(StoreError::QueryFailed(format!(
                        "failed to read last check time: {}",
                        e
                    )))
                })?;

        Ok(value
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single()))
    }

    /// Persist the time of a successful poll cycle
    pub async fn set_last_check_time(&self, checked_at: DateTime<Utc>) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(LAST_CHECK_KEY)
        .bind(checked_at.timestamp().to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to set last check time: {}",
                e
            )))
        })?;

        Ok(())
    }
}
