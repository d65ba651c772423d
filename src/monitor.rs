//! Poll loop: periodic listing checks and lifecycle control.
//!
//! The [`Monitor`] owns one logical timeline per monitored target: a
//! recurring timer fires `check_once` cycles, and a tick that arrives while
//! a check is still in flight is dropped, never queued. Manual operations
//! (`start`, `stop`, `check_once`, configuration updates) are safe to call
//! at any time relative to the timer; stop-then-start never leaves a
//! dangling timer from the previous lifecycle.

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, FetchError, Result};
use crate::extractor::{ContentKind, LinkExtractor};
use crate::fetcher::{FetchOptions, Fetcher};
use crate::types::{CheckReport, Event, MonitorStatus};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Floor for the poll interval; values below this are rejected
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Poll loop over a monitored listing location
pub struct Monitor {
    /// Record store backing dedup and last-check tracking
    db: Arc<Database>,

    /// Download executor invoked for new references
    fetcher: Arc<Fetcher>,

    /// HTTP client for listing fetches
    client: reqwest::Client,

    /// Link extractor configured with the supported extension set
    extractor: LinkExtractor,

    /// The listing URL being polled
    monitor_url: RwLock<Option<String>>,

    /// Interval between poll cycles
    poll_interval: RwLock<Duration>,

    /// References dispatched during this process run
    session: StdMutex<HashSet<String>>,

    /// Held for the duration of one check; timer ticks that fail to acquire
    /// it are dropped (debounce, not queue)
    check_lock: Mutex<()>,

    /// Whether the recurring timer is armed
    running: AtomicBool,

    /// Cancellation token and task handle of the active timer lifecycle
    lifecycle: StdMutex<Option<(CancellationToken, JoinHandle<()>)>>,

    /// Fire-and-forget event channel
    events: broadcast::Sender<Event>,

    /// Weak handle to this monitor, used to hand the timer task an owned
    /// reference without requiring callers to hold an `Arc` receiver
    self_ref: Weak<Monitor>,
}

impl Monitor {
    /// Create a new monitor
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        db: Arc<Database>,
        fetcher: Arc<Fetcher>,
        config: &Config,
        events: broadcast::Sender<Event>,
    ) -> Result<Arc<Self>> {
        let client = reqwest::Client::builder()
            .timeout(config.monitor.request_timeout)
            .user_agent(config.monitor.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Arc::new_cyclic(|self_ref| Self {
            db,
            fetcher,
            client,
            extractor: LinkExtractor::new(config.download.supported_extensions.clone()),
            monitor_url: RwLock::new(config.monitor.monitor_url.clone()),
            poll_interval: RwLock::new(config.monitor.poll_interval),
            session: StdMutex::new(HashSet::new()),
            check_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            lifecycle: StdMutex::new(None),
            events,
            self_ref: self_ref.clone(),
        }))
    }

    /// Run one poll cycle now
    ///
    /// Fails only if the listing fetch itself fails; extraction and
    /// per-item download errors are absorbed and logged. Waits for an
    /// in-flight check to finish first, so manual calls never overlap the
    /// timer.
    pub async fn check_once(&self) -> Result<CheckReport> {
        let _guard = self.check_lock.lock().await;
        self.run_check().await
    }

    /// Arm the recurring timer
    ///
    /// No-op if already running. Runs one immediate check, then checks at
    /// the configured interval. The interval is captured at start time;
    /// changing it requires a stop/start cycle.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Monitor already running, start is a no-op");
            return;
        }

        // The weak handle always upgrades while a caller holds the monitor
        let Some(monitor) = self.self_ref.upgrade() else {
            self.running.store(false, Ordering::SeqCst);
            return;
        };

        let interval = *self.poll_interval.read().unwrap_or_else(|e| e.into_inner());
        let token = CancellationToken::new();
        let handle = tokio::spawn(Self::run_loop(monitor, token.clone(), interval));

        let previous = self
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace((token, handle));
        debug_assert!(previous.is_none(), "stop() clears the previous lifecycle");

        info!(interval_secs = interval.as_secs(), "Monitor started");
    }

    /// Cancel the recurring timer and wait for the poll task to exit
    ///
    /// No-op if not running. After this returns there is no timer left from
    /// the previous lifecycle.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Monitor not running, stop is a no-op");
            return;
        }

        let lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some((token, handle)) = lifecycle {
            token.cancel();
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                warn!(error = %e, "Monitor task ended abnormally");
            }
        }

        info!("Monitor stopped");
    }

    /// Point the monitor at a different listing URL
    ///
    /// Takes effect on the next check; no validation happens here (a bad
    /// URL surfaces as a fetch error on the next cycle).
    pub fn set_monitor_url(&self, url: impl Into<String>) {
        let url = url.into();
        info!(url = %url, "Monitor location updated");
        *self.monitor_url.write().unwrap_or_else(|e| e.into_inner()) = Some(url);
    }

    /// Change the poll interval
    ///
    /// Rejects intervals below [`MIN_POLL_INTERVAL`]. While running, the
    /// new interval applies after a stop/start cycle.
    pub fn set_poll_interval(&self, interval: Duration) -> Result<()> {
        if interval < MIN_POLL_INTERVAL {
            return Err(Error::Config {
                message: format!(
                    "poll interval {}ms is below the {}ms floor",
                    interval.as_millis(),
                    MIN_POLL_INTERVAL.as_millis()
                ),
                key: Some("poll_interval".into()),
            });
        }

        info!(interval_secs = interval.as_secs(), "Poll interval updated");
        *self.poll_interval.write().unwrap_or_else(|e| e.into_inner()) = interval;
        Ok(())
    }

    /// Snapshot the poll loop state for the external boundary
    pub async fn get_status(&self) -> MonitorStatus {
        let last_check_time = match self.db.last_check_time().await {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = %e, "Failed to read last check time");
                None
            }
        };

        MonitorStatus {
            is_running: self.running.load(Ordering::SeqCst),
            monitor_url: self
                .monitor_url
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            poll_interval: *self.poll_interval.read().unwrap_or_else(|e| e.into_inner()),
            last_check_time,
            session_discovered_count: self
                .session
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
        }
    }

    /// Forget every reference dispatched during this process run
    pub fn clear_session_cache(&self) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        debug!(cleared = session.len(), "Session discovery cache cleared");
        session.clear();
    }

    /// Recurring timer task: immediate first tick, then one per interval
    async fn run_loop(monitor: Arc<Self>, token: CancellationToken, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    // Drop the tick if the previous check is still running
                    match monitor.check_lock.try_lock() {
                        Ok(_guard) => {
                            if let Err(e) = monitor.run_check().await {
                                error!(error = %e, "Scheduled check failed");
                            }
                        }
                        Err(_) => {
                            debug!("Previous check still in flight, dropping tick");
                        }
                    }
                }
            }
        }
    }

    /// One poll cycle; caller holds the check lock
    async fn run_check(&self) -> Result<CheckReport> {
        let url = self
            .monitor_url
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Error::Config {
                message: "no monitor location configured".into(),
                key: Some("monitor_url".into()),
            })?;

        debug!(url = %url, "Checking monitored location");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Fetch(FetchError::Network(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(FetchError::HttpStatus {
                status: status.as_u16(),
                url,
            }));
        }

        let kind = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ContentKind::from_media_type)
            .unwrap_or(ContentKind::Html);

        // Resolve relative references against the effective URL after redirects
        let base_url = response.url().clone();

        let body = response
            .text()
            .await
            .map_err(|e| Error::Fetch(FetchError::Network(e)))?;

        let candidates = self.extractor.extract(&body, kind, &base_url);
        let total_found = candidates.len();
        let mut new_count = 0;

        for candidate in candidates {
            let already_dispatched = self
                .session
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(&candidate);
            if already_dispatched {
                debug!(url = %candidate, "Already dispatched this session, skipping");
                continue;
            }

            match self.db.is_source_completed(&candidate).await {
                Ok(true) => {
                    debug!(url = %candidate, "Already downloaded, skipping");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    // One item's store hiccup must not abort the cycle
                    error!(url = %candidate, error = %e, "Dedup lookup failed, skipping item");
                    continue;
                }
            }

            self.session
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(candidate.clone());
            new_count += 1;

            if let Err(e) = self.fetcher.fetch(&candidate, FetchOptions::default()).await {
                error!(url = %candidate, error = %e, "Download errored during poll cycle");
            }
        }

        let checked_at = Utc::now();
        if let Err(e) = self.db.set_last_check_time(checked_at).await {
            error!(error = %e, "Failed to persist last check time");
        }

        info!(url = %url, total_found, new_count, "Check complete");
        let _ = self.events.send(Event::CheckCompleted {
            total_found,
            new_count,
        });

        Ok(CheckReport {
            total_found,
            new_count,
            checked_at,
        })
    }
}
