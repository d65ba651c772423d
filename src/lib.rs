//! # fetchwatch
//!
//! Embeddable poll-and-download library for remote file listings.
//!
//! fetchwatch periodically polls a remote location for newly available
//! files, extracts candidate references from whatever the location returns
//! (HTML, JSON, or plain text), filters them against supported types and
//! previously seen records, and downloads the new ones with retry/backoff
//! and two independent deduplication strategies: by source URL and by
//! SHA-256 content digest.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Durable by default** - Every record mutation commits before returning
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Self-healing** - A corrupt store is moved aside, never a crash
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetchwatch::{Config, FetchWatch};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.monitor.monitor_url = Some("https://example.com/files/".to_string());
//!
//!     let watch = FetchWatch::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = watch.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Poll until SIGTERM/SIGINT
//!     watch.monitor().start();
//!     fetchwatch::run_with_shutdown(watch).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Record store persistence layer
pub mod db;
/// Error types
pub mod error;
/// Multi-format link extraction
pub mod extractor;
/// Download executor
pub mod fetcher;
/// Poll loop and lifecycle
pub mod monitor;
/// Retry policy with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{Error, FetchError, Result, StoreError};
pub use extractor::{ContentKind, LinkExtractor};
pub use fetcher::{FetchOptions, Fetcher};
pub use monitor::{MIN_POLL_INTERVAL, Monitor};
pub use types::{
    BatchOutcome, CheckReport, Event, FileRecord, MonitorStatus, Outcome, RecordId, RetrySummary,
    SkipReason, Statistics, Status, VerifyResult,
};

use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event broadcast channel; slow subscribers lag, they
/// never block the pipeline
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The wired-together pipeline: record store, download executor, poll loop
///
/// Components are explicit long-lived instances created at startup and
/// shared by reference, so tests can construct them in isolation while
/// embedders get a single handle.
pub struct FetchWatch {
    db: Arc<Database>,
    fetcher: Arc<Fetcher>,
    monitor: Arc<Monitor>,
    events: broadcast::Sender<Event>,
}

impl FetchWatch {
    /// Open the store and wire up the executor and poll loop
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened even after
    /// self-healing, or if an HTTP client cannot be created.
    pub async fn new(config: Config) -> Result<Self> {
        let db = Arc::new(Database::open(config.db_path()).await?);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let fetcher = Arc::new(Fetcher::new(db.clone(), &config, events.clone())?);
        let monitor = Monitor::new(db.clone(), fetcher.clone(), &config, events.clone())?;

        Ok(Self {
            db,
            fetcher,
            monitor,
            events,
        })
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// The record store
    pub fn store(&self) -> &Arc<Database> {
        &self.db
    }

    /// The download executor
    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// The poll loop
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Stop the poll loop and flush the store
    pub async fn shutdown(&self) -> Result<()> {
        self.monitor.stop().await;
        self.db.close().await;
        Ok(())
    }
}

/// Helper function to run the pipeline with graceful signal handling.
///
/// Waits for a termination signal and then calls [`FetchWatch::shutdown`].
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(watch: FetchWatch) -> Result<()> {
    wait_for_signal().await;
    watch.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
