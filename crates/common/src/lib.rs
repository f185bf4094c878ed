//! Shared types, config, and error definitions for the election signal engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    Credentials, MarketsConfig, ModelConfig, PollConfig, RetryConfig, SignalsConfig,
    StrategyConfig, TimingConfig,
};
pub use error::Error;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
