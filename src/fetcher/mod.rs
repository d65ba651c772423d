//! Download executor: fetch, hash, dedup, write, record.
//!
//! One [`Fetcher`] owns the HTTP client, the retry/backoff policy, and the
//! per-record state machine:
//!
//! `Pending -> Downloading -> {Completed | Retrying | Failed}`,
//! `Retrying -> Downloading`, `Failed -> Pending` (only via
//! [`Fetcher::retry_failed`]). `Completed` and `Skipped` are terminal;
//! `Skipped` is reached directly from `Downloading` when the fetched bytes
//! match an already-completed record's digest.
//!
//! The digest check, the collision-free naming probe, and the completing
//! write are serialized through an async mutex, so concurrent downloads
//! never race on content dedup or on the same final path.

use crate::config::Config;
use crate::db::{Database, NewRecord, RecordUpdate};
use crate::error::{Error, FetchError, Result};
use crate::retry::{IsRetryable, delay_for_attempt};
use crate::types::{
    BatchOutcome, Event, Outcome, RecordId, RetrySummary, SkipReason, Status, VerifyResult,
};
use crate::utils::{extension_for_media_type, extension_of, filename_from_url, unique_path};
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

/// How many items of a batch download run concurrently
const BATCH_CONCURRENCY: usize = 4;

/// Options for a single fetch
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Override the filename derived from the URL
    pub filename: Option<String>,
    /// Override the configured attempt limit
    pub max_retries: Option<u32>,
}

/// Download executor
///
/// Shared between the poll loop and the external boundary; wrap in `Arc`.
pub struct Fetcher {
    /// HTTP client for file downloads
    client: reqwest::Client,

    /// Record store backing dedup and status tracking
    db: Arc<Database>,

    /// Destination directory for downloaded files
    download_dir: PathBuf,

    /// Supported extension set, lowercase, without dots
    supported_extensions: Vec<String>,

    /// Retry/backoff policy
    retry: crate::config::RetryConfig,

    /// Serializes the digest check, naming probe, and completing write so
    /// concurrent downloads cannot race on dedup or on the same final path
    write_lock: Mutex<()>,

    /// Fire-and-forget event channel
    events: broadcast::Sender<Event>,
}

impl Fetcher {
    /// Create a new download executor
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(db: Arc<Database>, config: &Config, events: broadcast::Sender<Event>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.monitor.request_timeout)
            .user_agent(config.monitor.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            db,
            download_dir: config.download.download_dir.clone(),
            supported_extensions: config.download.supported_extensions.clone(),
            retry: config.retry.clone(),
            write_lock: Mutex::new(()),
            events,
        })
    }

    /// Download a single reference
    ///
    /// Rejects up front (no record created) when the resolved filename's
    /// extension is unsupported or a completed record already exists for
    /// this URL. Otherwise creates a `Pending` record and runs the attempt
    /// sequence. Dedup hits and retry exhaustion are outcomes, not errors;
    /// only store failures escalate as `Err`.
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> Result<Outcome> {
        let filename = options
            .filename
            .unwrap_or_else(|| filename_from_url(url));

        if let Some(ext) = extension_of(&filename)
            && !self.supported_extensions.iter().any(|s| *s == ext)
        {
            debug!(url, extension = %ext, "Rejecting reference with unsupported extension");
            return Ok(Outcome::rejected(SkipReason::UnsupportedExtension));
        }

        if self.db.is_source_completed(url).await? {
            debug!(url, "Reference already downloaded, skipping");
            return Ok(Outcome::rejected(SkipReason::AlreadyDownloaded));
        }

        let id = self
            .db
            .insert_record(&NewRecord {
                source_url: url.to_string(),
                filename: filename.clone(),
            })
            .await?;

        let _ = self.events.send(Event::DownloadStarted {
            id,
            url: url.to_string(),
        });

        let max_attempts = options.max_retries.unwrap_or(self.retry.max_attempts).max(1);
        self.run_attempts(id, url, &filename, max_attempts).await
    }

    /// Download several references with bounded parallelism, folding their
    /// outcomes
    ///
    /// Dedup checks and destination writes stay serialized through the
    /// store and the directory lock, so concurrent items never contend on
    /// the same record or final path.
    pub async fn download_multiple(&self, urls: &[String]) -> BatchOutcome {
        let results: Vec<_> = stream::iter(urls)
            .map(|url| async move { (url, self.fetch(url, FetchOptions::default()).await) })
            .buffer_unordered(BATCH_CONCURRENCY)
            .collect()
            .await;

        let mut batch = BatchOutcome::default();
        for (url, result) in results {
            match result {
                Ok(outcome) if outcome.success => batch.successful += 1,
                Ok(outcome) => match outcome.reason {
                    Some(SkipReason::DownloadFailed) => batch.failed += 1,
                    _ => batch.skipped += 1,
                },
                Err(e) => {
                    error!(url, error = %e, "Download errored outside the retry path");
                    batch.failed += 1;
                }
            }
        }

        batch
    }

    /// Re-queue every failed record and re-run its attempt sequence
    ///
    /// Each failed record is reset to `Pending` with a zero retry count and
    /// a cleared error before its re-run. Zero failed records returns
    /// `{retried: 0}` without touching the store.
    pub async fn retry_failed(&self) -> Result<RetrySummary> {
        let failed = self.db.list_records(Some(Status::Failed), None).await?;
        if failed.is_empty() {
            return Ok(RetrySummary::default());
        }

        let mut summary = RetrySummary {
            retried: failed.len(),
            ..Default::default()
        };

        info!(count = failed.len(), "Re-queueing failed downloads");

        for record in failed {
            self.db.reset_record_for_retry(record.id).await?;

            let _ = self.events.send(Event::DownloadStarted {
                id: record.id,
                url: record.source_url.clone(),
            });

            match self
                .run_attempts(
                    record.id,
                    &record.source_url,
                    &record.filename,
                    self.retry.max_attempts.max(1),
                )
                .await
            {
                Ok(outcome) if outcome.success => summary.successful += 1,
                Ok(outcome) => match outcome.reason {
                    Some(SkipReason::DownloadFailed) => summary.failed += 1,
                    _ => summary.skipped += 1,
                },
                Err(e) => {
                    error!(id = %record.id, error = %e, "Retry errored outside the retry path");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Re-hash a completed record's local file against its stored digest
    pub async fn verify(&self, id: RecordId) -> Result<VerifyResult> {
        let record = self
            .db
            .get_record(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("record {id}")))?;

        let (Some(expected), Some(path)) = (record.digest, record.local_path) else {
            return Ok(VerifyResult::NotVerifiable);
        };
        if record.status != Status::Completed {
            return Ok(VerifyResult::NotVerifiable);
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(id = %id, path = %path.display(), "Verify: local file missing");
                return Ok(VerifyResult::FileMissing);
            }
            Err(e) => return Err(e.into()),
        };

        let actual = sha256_hex(&bytes);
        if actual == expected {
            Ok(VerifyResult::Verified)
        } else {
            warn!(
                id = %id,
                path = %path.display(),
                "Verify: digest mismatch, file changed on disk"
            );
            Ok(VerifyResult::Mismatch { expected, actual })
        }
    }

    /// Run the delivery attempt sequence for an existing record
    async fn run_attempts(
        &self,
        id: RecordId,
        url: &str,
        filename: &str,
        max_attempts: u32,
    ) -> Result<Outcome> {
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let status = if attempt == 1 {
                Status::Downloading
            } else {
                Status::Retrying
            };
            self.db
                .update_record(
                    id,
                    &RecordUpdate {
                        status: Some(status),
                        retry_count: Some(attempt - 1),
                        ..Default::default()
                    },
                )
                .await?;

            match self.attempt_delivery(id, url, filename).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    last_error = e.to_string();
                    let delay = delay_for_attempt(&self.retry, attempt);
                    warn!(
                        url,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "Download attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_retryable() {
                        error!(url, attempts = attempt, error = %last_error, "Download failed after all retry attempts");
                    } else {
                        error!(url, error = %last_error, "Download failed with non-retryable error");
                    }
                    self.db
                        .update_record(
                            id,
                            &RecordUpdate {
                                status: Some(Status::Failed),
                                error_message: Some(last_error.clone()),
                                ..Default::default()
                            },
                        )
                        .await?;
                    let _ = self.events.send(Event::DownloadFailed {
                        id,
                        error: last_error,
                    });
                    return Ok(Outcome::settled(SkipReason::DownloadFailed, id));
                }
            }
        }

        // max_attempts >= 1, so the loop always returns before this point
        Err(Error::Other(format!(
            "attempt loop exited without outcome for {url}: {last_error}"
        )))
    }

    /// One delivery attempt: fetch, hash, dedup, name, write, complete
    ///
    /// An `Err` means this attempt failed and the caller decides whether to
    /// retry; an `Ok` outcome is final (`Completed` or `Skipped`).
    async fn attempt_delivery(&self, id: RecordId, url: &str, filename: &str) -> Result<Outcome> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Fetch(FetchError::Network(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }));
        }

        let content_kind = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(FetchError::Network(e)))?;

        let digest = sha256_hex(&bytes);

        // The digest check, the naming probe, and the completing write form
        // one critical section: a concurrent download of identical content
        // must observe this record's completion before its own digest check
        let _guard = self.write_lock.lock().await;

        if self.db.is_digest_completed(&digest).await? {
            info!(
                url,
                digest = %&digest[..16],
                "Content digest matches an existing download, skipping write"
            );
            self.db
                .update_record(
                    id,
                    &RecordUpdate {
                        status: Some(Status::Skipped),
                        digest: Some(digest),
                        content_kind,
                        clear_error: true,
                        ..Default::default()
                    },
                )
                .await?;
            let _ = self.events.send(Event::DownloadSkipped {
                id,
                reason: SkipReason::DuplicateContent,
            });
            return Ok(Outcome::settled(SkipReason::DuplicateContent, id));
        }

        // A name without extension inherits one from the declared media type
        let final_name = match extension_of(filename) {
            Some(_) => filename.to_string(),
            None => content_kind
                .as_deref()
                .and_then(extension_for_media_type)
                .map(|ext| format!("{filename}.{ext}"))
                .unwrap_or_else(|| filename.to_string()),
        };

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = unique_path(&self.download_dir.join(&final_name))?;
        tokio::fs::write(&path, &bytes).await?;

        let size_bytes = bytes.len() as u64;
        let written_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&final_name)
            .to_string();

        self.db
            .update_record(
                id,
                &RecordUpdate {
                    status: Some(Status::Completed),
                    filename: Some(written_name),
                    local_path: Some(path.display().to_string()),
                    size_bytes: Some(size_bytes),
                    digest: Some(digest),
                    content_kind,
                    clear_error: true,
                    ..Default::default()
                },
            )
            .await?;

        info!(url, path = %path.display(), size_bytes, "Download complete");
        let _ = self.events.send(Event::DownloadCompleted {
            id,
            path,
            size_bytes,
        });

        Ok(Outcome::completed(id))
    }
}

/// SHA-256 digest of a byte slice as lowercase hex
fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
