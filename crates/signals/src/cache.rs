//! Last-good quote cache.
//!
//! Uses `DashMap` so the refresh loop and readers never contend on one
//! lock. Quotes older than the configured age are dropped, not reused.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::MarketQuote;
use dashmap::DashMap;
use tracing::debug;

/// Thread-safe quote cache keyed by ticker.
#[derive(Debug, Clone)]
pub struct QuoteCache {
    quotes: Arc<DashMap<String, MarketQuote>>,
    max_age: Duration,
}

impl QuoteCache {
    pub fn new(max_age_secs: u64) -> Self {
        let secs = i64::try_from(max_age_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        Self {
            quotes: Arc::new(DashMap::new()),
            max_age: Duration::seconds(secs),
        }
    }

    /// Store a fresh quote, replacing an older one for the same ticker.
    pub fn record(&self, quote: &MarketQuote) {
        self.quotes
            .entry(quote.ticker().to_string())
            .and_modify(|held| {
                if quote.fetched_at() >= held.fetched_at() {
                    *held = quote.clone();
                }
            })
            .or_insert_with(|| quote.clone());
    }

    /// Last-good quote for `ticker` if it is not older than the max age.
    /// Stale entries are evicted.
    pub fn fresh(&self, ticker: &str, now: DateTime<Utc>) -> Option<MarketQuote> {
        let quote = self.quotes.get(ticker).map(|q| q.clone())?;
        if now - quote.fetched_at() > self.max_age {
            debug!("{}: cached quote stale, dropping", ticker);
            self.quotes.remove(ticker);
            return None;
        }
        Some(quote)
    }

    /// Drop every entry older than the max age, including tickers that are
    /// never looked up again. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.quotes.len();
        self.quotes
            .retain(|_, quote| now - quote.fetched_at() <= self.max_age);
        let removed = before.saturating_sub(self.quotes.len());
        if removed > 0 {
            debug!("Pruned {} stale cached quotes", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}
