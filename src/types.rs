//! Core types for fetchwatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Unique identifier for a download record
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Create a new RecordId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<RecordId> for i64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for RecordId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RecordId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RecordId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Download record status
///
/// The per-record state machine is:
/// `Pending -> Downloading -> {Completed | Retrying | Failed}`,
/// `Retrying -> Downloading`, and `Failed -> Pending` only through an
/// explicit retry-all. `Completed` and `Skipped` are terminal; `Skipped` is
/// reached directly from `Downloading` on a content-digest collision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Record created, download not yet attempted
    Pending,
    /// First attempt in flight
    Downloading,
    /// A later attempt in flight after at least one failure
    Retrying,
    /// Successfully downloaded and written to disk
    Completed,
    /// All attempts exhausted
    Failed,
    /// Settled without writing bytes (content-digest collision)
    Skipped,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Pending,
            1 => Status::Downloading,
            2 => Status::Retrying,
            3 => Status::Completed,
            4 => Status::Failed,
            5 => Status::Skipped,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Pending => 0,
            Status::Downloading => 1,
            Status::Retrying => 2,
            Status::Completed => 3,
            Status::Failed => 4,
            Status::Skipped => 5,
        }
    }

    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Skipped)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Downloading => "downloading",
            Status::Retrying => "retrying",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// A download record as seen by library consumers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique record ID, never reused
    pub id: RecordId,
    /// The URL this record was created for (immutable)
    pub source_url: String,
    /// Resolved on-disk filename
    pub filename: String,
    /// Full path of the written file; None until a write succeeds
    pub local_path: Option<PathBuf>,
    /// Size in bytes, populated on successful fetch
    pub size_bytes: Option<u64>,
    /// SHA-256 hex digest of the body, populated after a successful fetch
    pub digest: Option<String>,
    /// Declared media type of the response
    pub content_kind: Option<String>,
    /// Current status
    pub status: Status,
    /// Retry attempts consumed so far
    pub retry_count: u32,
    /// Last failure message, cleared on success or manual reset
    pub error_message: Option<String>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record last changed
    pub updated_at: DateTime<Utc>,
    /// Set exactly once, on the transition into `Completed`
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form annotations, opaque to the core
    pub metadata: Option<serde_json::Value>,
}

/// Why a fetch settled without a completed download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The resolved filename's extension is outside the supported set
    UnsupportedExtension,
    /// A completed record already exists for this source URL
    AlreadyDownloaded,
    /// The fetched bytes match an existing completed record's digest
    DuplicateContent,
    /// All retry attempts were exhausted
    DownloadFailed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::UnsupportedExtension => "unsupported_extension",
            SkipReason::AlreadyDownloaded => "already_downloaded",
            SkipReason::DuplicateContent => "duplicate_content",
            SkipReason::DownloadFailed => "download_failed",
        };
        write!(f, "{s}")
    }
}

/// Result of a single fetch operation
#[derive(Clone, Debug)]
pub struct Outcome {
    /// True only when bytes were written and the record reached `Completed`
    pub success: bool,
    /// Why the fetch did not complete, when it didn't
    pub reason: Option<SkipReason>,
    /// The record created for this attempt; None when rejected up front
    pub record_id: Option<RecordId>,
}

impl Outcome {
    /// A successful download
    pub fn completed(id: RecordId) -> Self {
        Self {
            success: true,
            reason: None,
            record_id: Some(id),
        }
    }

    /// Rejected before any record was created
    pub fn rejected(reason: SkipReason) -> Self {
        Self {
            success: false,
            reason: Some(reason),
            record_id: None,
        }
    }

    /// Settled with a record but without a completed download
    pub fn settled(reason: SkipReason, id: RecordId) -> Self {
        Self {
            success: false,
            reason: Some(reason),
            record_id: Some(id),
        }
    }
}

/// Aggregate counts for a batch download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Downloads that completed
    pub successful: usize,
    /// Downloads that failed after exhausting retries
    pub failed: usize,
    /// Downloads settled by dedup or rejected up front
    pub skipped: usize,
}

/// Summary of a retry-all pass over failed records
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySummary {
    /// Number of failed records that were re-queued
    pub retried: usize,
    /// Re-runs that completed
    pub successful: usize,
    /// Re-runs that failed again
    pub failed: usize,
    /// Re-runs settled by dedup
    pub skipped: usize,
}

/// Result of one poll cycle
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CheckReport {
    /// Candidates the extractor produced
    pub total_found: usize,
    /// Candidates that were new (not in session cache, not completed)
    pub new_count: usize,
    /// When this cycle ran
    pub checked_at: DateTime<Utc>,
}

/// Snapshot of the poll loop for the external boundary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorStatus {
    /// Whether the recurring timer is armed
    pub is_running: bool,
    /// The listing URL being polled
    pub monitor_url: Option<String>,
    /// Interval between checks
    #[serde(with = "crate::config::duration_serde")]
    pub poll_interval: Duration,
    /// When the last successful check ran
    pub last_check_time: Option<DateTime<Utc>>,
    /// References dispatched during this process run
    pub session_discovered_count: usize,
}

/// Derived statistics over the record store
///
/// Never stored — always computed by aggregation over current records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Number of completed records
    pub total_completed: u64,
    /// Cumulative size of completed downloads in bytes
    pub total_size_bytes: u64,
    /// Records waiting for their first attempt
    pub pending: u64,
    /// Records with an attempt in flight (downloading or retrying)
    pub downloading: u64,
    /// Records that exhausted their retries
    pub failed: u64,
    /// Records settled by content dedup
    pub skipped: u64,
    /// When the last successful poll cycle ran
    pub last_check_time: Option<DateTime<Utc>>,
}

/// Result of re-hashing a completed record's local file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum VerifyResult {
    /// On-disk bytes still match the stored digest
    Verified,
    /// On-disk bytes no longer match the stored digest
    Mismatch {
        /// Digest recorded at download time
        expected: String,
        /// Digest of the file as it exists now
        actual: String,
    },
    /// The recorded local path no longer exists
    FileMissing,
    /// The record has no digest or local path to verify against
    NotVerifiable,
}

/// Events emitted on the broadcast channel
///
/// Consumers subscribe via [`FetchWatch::subscribe`](crate::FetchWatch::subscribe);
/// emission is fire-and-forget and never blocks the pipeline.
#[derive(Clone, Debug)]
pub enum Event {
    /// A poll cycle finished
    CheckCompleted {
        /// Candidates the extractor produced
        total_found: usize,
        /// Candidates handed to the download executor
        new_count: usize,
    },
    /// A download attempt sequence began
    DownloadStarted {
        /// The record being downloaded
        id: RecordId,
        /// The source URL
        url: String,
    },
    /// A download completed and was written to disk
    DownloadCompleted {
        /// The completed record
        id: RecordId,
        /// Where the bytes were written
        path: PathBuf,
        /// Size in bytes
        size_bytes: u64,
    },
    /// A download settled without writing bytes
    DownloadSkipped {
        /// The settled record
        id: RecordId,
        /// Why it settled
        reason: SkipReason,
    },
    /// A download exhausted its retries
    DownloadFailed {
        /// The failed record
        id: RecordId,
        /// The last error message
        error: String,
    },
}
