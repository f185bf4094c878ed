//! Kalshi API client: RSA-PSS request signing, rate limiting, bounded
//! retry, and the REST endpoints the signal engine reads.

pub mod auth;
pub mod quote;
pub mod rate_limit;
pub mod rest;
pub mod retry;

pub use auth::KalshiAuth;
pub use rate_limit::RateLimiter;
pub use rest::{resolve_rest_base_url, KalshiRestClient};
pub use retry::RetryPolicy;
