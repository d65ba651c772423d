//! Retry policy with exponential backoff
//!
//! The download executor re-attempts transient failures with geometrically
//! growing delays and optional jitter. Because each attempt also updates the
//! record's status and retry count, the attempt loop itself lives in the
//! executor; this module owns the policy: which errors are worth retrying
//! and how long to wait before the next attempt.

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection resets, server errors)
/// should return `true`. Permanent failures (store errors, permission
/// denied) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Every fetch failure — connect, timeout, non-2xx — counts as
            // transient and consumes a retry attempt
            Error::Fetch(_) => true,
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // Store errors should not be retried (likely permanent)
            Error::Store(_) | Error::Sqlx(_) => false,
            // Config errors are permanent
            Error::Config { .. } => false,
            // Not found is permanent
            Error::NotFound(_) => false,
            // Serialization errors are permanent
            Error::Serialization(_) => false,
            // Unknown errors - be conservative and don't retry
            Error::Other(_) => false,
        }
    }
}

/// Backoff delay to sleep after `failed_attempt` (1-based) fails
///
/// The delay grows geometrically: `initial_delay * multiplier^(attempt-1)`,
/// capped at `max_delay`. With jitter enabled the result is uniformly
/// stretched into `[delay, 2*delay]`; since consecutive base delays grow by
/// at least the multiplier, jittered delays remain monotonically
/// non-decreasing for multipliers >= 2.
pub fn delay_for_attempt(config: &RetryConfig, failed_attempt: u32) -> Duration {
    let exponent = failed_attempt.saturating_sub(1);
    let base = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent as i32);
    let capped = Duration::from_secs_f64(base).min(config.max_delay);

    if config.jitter {
        add_jitter(capped)
    } else {
        capped
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
