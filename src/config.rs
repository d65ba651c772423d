//! Configuration types for fetchwatch

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Poll-loop configuration (listing URL, cadence, HTTP behavior)
///
/// Groups settings for the monitored location and how it is fetched.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// URL of the listing to poll (None = monitor idle until configured)
    #[serde(default)]
    pub monitor_url: Option<String>,

    /// Interval between poll cycles (default: 60 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Per-request timeout for listing fetches and downloads (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent on every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitor_url: None,
            poll_interval: default_poll_interval(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Download behavior configuration (destination, supported types)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Destination directory for downloaded files (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// File extensions accepted for download, lowercase, without dots
    ///
    /// References whose path carries an extension outside this set are
    /// rejected before any record is created. Extension-less references are
    /// always accepted.
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,
}

impl DownloadConfig {
    /// Check whether an extension (without dot, any case) is supported
    pub fn is_extension_supported(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.supported_extensions.iter().any(|e| *e == ext)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            supported_extensions: default_supported_extensions(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of delivery attempts per record (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file (default: "./fetchwatch.db")
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Main configuration for fetchwatch
///
/// Fields are organized into logical sub-configs:
/// - [`monitor`](MonitorConfig) — listing URL, poll cadence, HTTP behavior
/// - [`download`](DownloadConfig) — destination directory, supported types
/// - [`retry`](RetryConfig) — attempt count, backoff shape
/// - [`persistence`](PersistenceConfig) — database location
///
/// Sub-config fields are flattened for serialization, so the JSON/TOML
/// format stays flat (no nesting).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Poll loop settings
    #[serde(flatten)]
    pub monitor: MonitorConfig,

    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Retry and backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Data storage settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

// Convenience accessors — allow call sites to use `config.download_dir()` etc.
// without reaching through the sub-config structs.
impl Config {
    /// Destination directory for downloaded files
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Path to the SQLite database file
    pub fn db_path(&self) -> &PathBuf {
        &self.persistence.db_path
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("fetchwatch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_supported_extensions() -> Vec<String> {
    [
        "pdf", "zip", "tar", "gz", "txt", "csv", "json", "xml", "png", "jpg", "jpeg", "gif",
        "doc", "docx", "xls", "xlsx", "mp3", "mp4",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./fetchwatch.db")
}

fn default_true() -> bool {
    true
}

/// Serialize/deserialize `Duration` as whole seconds
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a duration as its whole-second count
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a whole-second count into a duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
