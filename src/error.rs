//! Error types for fetchwatch
//!
//! This module provides the error handling surface for the library:
//! - Domain-specific error types (Store, Fetch, Config)
//! - `#[from]` conversions for the underlying sqlx/reqwest/io error types
//! - A `Result<T>` alias used throughout the crate
//!
//! Note that dedup hits (`already_downloaded`, `duplicate_content`) and
//! unsupported extensions are *outcomes*, not errors — see
//! [`SkipReason`](crate::types::SkipReason). Only fetch failures that exhaust
//! all retries and store failures escalate through this module.

use thiserror::Error;

/// Result type alias for fetchwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fetchwatch
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "poll_interval")
        key: Option<String>,
    },

    /// Record store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// SQLx database error
    #[error("store error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Network fetch failed (connect, timeout, or non-success status)
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error while writing a downloaded file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Record-store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or connect to the database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Fetch errors — the retryable failure class of the download executor
///
/// Network errors, timeouts, and non-success HTTP statuses are treated as a
/// single retryable class: every variant counts toward retry exhaustion.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure: connect error, timeout, interrupted body read
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-success status code
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The HTTP status code returned by the server
        status: u16,
        /// The URL that produced the status
        url: String,
    },
}
