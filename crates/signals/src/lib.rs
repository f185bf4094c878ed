//! Signal engine crate.
//!
//! Classifies markets against the valuation model and holds the
//! per-tick state the refresh loop publishes.

pub mod cache;
pub mod classify;
pub mod engine;
pub mod portfolio;
pub mod snapshot;

pub use cache::QuoteCache;
pub use classify::{classify, signal, Classification, SignalTarget};
pub use engine::{Evaluation, MarketBoard, SignalEngine};
pub use portfolio::{mark_positions, PortfolioView, PositionMark, SettlementView};
pub use snapshot::{Snapshot, SnapshotStore};
