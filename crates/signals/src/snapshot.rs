//! Current-snapshot store.
//!
//! A tick builds a complete [`Snapshot`] and swaps it in with one write,
//! so readers see either the previous tick or the new one, never a mix.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::PollReading;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::engine::{Evaluation, MarketBoard};
use crate::portfolio::PortfolioView;

/// Everything one refresh tick produced.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub taken_at: DateTime<Utc>,
    pub poll: Option<PollReading>,
    pub board: MarketBoard,
    /// `None` when no poll reading has ever been obtained or evaluation failed.
    pub evaluation: Option<Evaluation>,
    /// `None` in public-data-only mode.
    pub portfolio: Option<PortfolioView>,
    /// Sub-fetches that failed this tick and were carried over from the
    /// previous snapshot.
    pub stale: Vec<String>,
}

impl Snapshot {
    pub fn is_degraded(&self) -> bool {
        !self.stale.is_empty() || self.evaluation.is_none()
    }
}

/// Shared handle to the latest snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    current: Arc<RwLock<Option<Arc<Snapshot>>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot.
    pub async fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().await = Some(snapshot.clone());
        snapshot
    }

    /// Latest published snapshot.
    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().await.clone()
    }
}
