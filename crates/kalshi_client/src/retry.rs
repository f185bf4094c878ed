//! Bounded exponential backoff and HTTP status classification.

use std::time::Duration;

use common::config::RetryConfig;
use common::Error;

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    /// Delay before retrying after `err`. A 429's `Retry-After` can stretch
    /// the wait, but never past `max_backoff`.
    pub fn delay_for(&self, attempt: u32, err: &Error) -> Duration {
        let backoff = self.backoff_after(attempt);
        match err {
            Error::RateLimited { retry_after_ms } => backoff
                .max(Duration::from_millis(*retry_after_ms))
                .min(self.max_backoff),
            _ => backoff,
        }
    }

    /// Whether another attempt may follow attempt number `attempt`.
    pub fn can_retry(&self, attempt: u32, err: &Error) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms.max(cfg.initial_backoff_ms)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Map a non-success status to the error taxonomy.
///
/// 401/403 → auth, 429 → rate limited, 5xx → server (retryable),
/// other 4xx → client request (surfaced immediately).
pub fn error_for_status(status: u16, message: String, retry_after_secs: Option<u64>) -> Error {
    match status {
        401 | 403 => Error::Auth(format!("Kalshi rejected credentials (status={status}): {message}")),
        429 => Error::RateLimited {
            retry_after_ms: retry_after_secs.map(|s| s.saturating_mul(1000)).unwrap_or(1000),
        },
        500..=599 => Error::KalshiApi { status, message },
        _ => Error::ClientRequest { status, message },
    }
}
