//! Rate limiter for Kalshi API reads.
//!
//! Basic tier limit: 20 reads/sec. The engine never writes, so only the
//! read bucket is kept.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Token bucket shared by every clone of the REST client.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    read_limiter: Arc<GovLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    /// Create with Kalshi basic-tier limits.
    pub fn new() -> Self {
        Self::with_reads_per_sec(20)
    }

    /// Create with a custom per-second read limit (0 is treated as 1).
    pub fn with_reads_per_sec(reads_per_sec: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(reads_per_sec).unwrap_or(NonZeroU32::MIN));
        Self {
            read_limiter: Arc::new(GovLimiter::direct(quota)),
        }
    }

    /// Wait until a read slot is available.
    pub async fn wait_read(&self) {
        self.read_limiter.until_ready().await;
    }

    /// Try to acquire a read slot without waiting. Returns true if acquired.
    pub fn try_read(&self) -> bool {
        self.read_limiter.check().is_ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
