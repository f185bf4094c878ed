//! Refresh loop: one sequential tick fetches the poll reading and every
//! tracked quote, evaluates signals, and swaps in a complete snapshot.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    Balance, ComboCode, Error, MarketQuote, MarketsConfig, PollReading, Position, RestingOrder,
    Settlement, SignalsConfig,
};
use kalshi_client::KalshiRestClient;
use signals::{
    mark_positions, MarketBoard, PortfolioView, QuoteCache, SettlementView, SignalEngine, Snapshot,
    SnapshotStore,
};
use tracing::{debug, error, info, warn};

use crate::poll::PollSource;

/// Exchange reads a tick needs.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn series_quote(&self, series: &str, suffix: &str) -> Result<Option<MarketQuote>, Error>;
    async fn combo_quotes(&self, series: &str) -> Result<HashMap<ComboCode, MarketQuote>, Error>;
    async fn quote(&self, ticker: &str) -> Result<MarketQuote, Error>;

    fn has_credentials(&self) -> bool;
    async fn balance(&self) -> Result<Balance, Error>;
    async fn positions(&self) -> Result<Vec<Position>, Error>;
    async fn resting_orders(&self) -> Result<Vec<RestingOrder>, Error>;
    async fn settlements(&self) -> Result<Vec<Settlement>, Error>;
}

#[async_trait]
impl MarketFeed for KalshiRestClient {
    async fn series_quote(&self, series: &str, suffix: &str) -> Result<Option<MarketQuote>, Error> {
        self.find_series_quote(series, suffix).await
    }

    async fn combo_quotes(&self, series: &str) -> Result<HashMap<ComboCode, MarketQuote>, Error> {
        self.list_combo_outcomes(series).await
    }

    async fn quote(&self, ticker: &str) -> Result<MarketQuote, Error> {
        self.get_quote(ticker).await
    }

    fn has_credentials(&self) -> bool {
        KalshiRestClient::has_credentials(self)
    }

    async fn balance(&self) -> Result<Balance, Error> {
        self.get_balance().await
    }

    async fn positions(&self) -> Result<Vec<Position>, Error> {
        self.list_positions().await
    }

    async fn resting_orders(&self) -> Result<Vec<RestingOrder>, Error> {
        self.list_resting_orders().await
    }

    async fn settlements(&self) -> Result<Vec<Settlement>, Error> {
        self.list_settlements().await
    }
}

pub struct Refresher {
    feed: Arc<dyn MarketFeed>,
    poll: Box<dyn PollSource>,
    engine: SignalEngine,
    markets: MarketsConfig,
    cache: QuoteCache,
    store: SnapshotStore,
    fetch_timeout: Duration,
    tick: u64,
}

impl Refresher {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        poll: Box<dyn PollSource>,
        cfg: &SignalsConfig,
        store: SnapshotStore,
    ) -> Result<Self, Error> {
        Ok(Self {
            feed,
            poll,
            engine: SignalEngine::from_config(cfg)?,
            markets: cfg.markets.clone(),
            cache: QuoteCache::new(cfg.timing.quote_stale_secs),
            store,
            fetch_timeout: Duration::from_secs(cfg.timing.fetch_timeout_secs),
            tick: 0,
        })
    }

    #[cfg(test)]
    fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Run one sub-fetch under the fetch timeout.
    async fn timed<T>(&self, what: &str, fut: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
        match tokio::time::timeout(self.fetch_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!("{what} after {:?}", self.fetch_timeout))),
        }
    }

    /// Previous quote, if the cache still considers it fresh.
    fn carry_over(&self, previous: Option<&MarketQuote>, now: DateTime<Utc>) -> Option<MarketQuote> {
        previous.and_then(|q| self.cache.fresh(q.ticker(), now))
    }

    /// Run one refresh tick and publish its snapshot.
    pub async fn tick(&mut self) -> Arc<Snapshot> {
        self.tick += 1;
        let now = Utc::now();
        self.cache.prune(now);
        let prev = self.store.current().await;
        let mut stale: Vec<String> = Vec::new();

        // (a) Poll reading.
        let held_poll = prev.as_ref().and_then(|s| s.poll);
        let poll = match self.timed("poll", self.poll.fetch()).await {
            Ok(reading) => Some(newest(held_poll, reading)),
            Err(e) => {
                warn!("Poll fetch from {} failed: {}", self.poll.describe(), e);
                stale.push("poll".into());
                held_poll
            }
        };

        // (b) Market quotes.
        let prev_board = prev.as_ref().map(|s| &s.board);
        let house = self
            .fetch_chamber(
                "house",
                &self.markets.house_series,
                &self.markets.house_side_suffix,
                prev_board.and_then(|b| b.house.as_ref()),
                now,
                &mut stale,
            )
            .await;
        let senate = self
            .fetch_chamber(
                "senate",
                &self.markets.senate_series,
                &self.markets.senate_side_suffix,
                prev_board.and_then(|b| b.senate.as_ref()),
                now,
                &mut stale,
            )
            .await;

        let combos = match self
            .timed("combos", self.feed.combo_quotes(&self.markets.combo_series))
            .await
        {
            Ok(quotes) => {
                quotes.values().for_each(|q| self.cache.record(q));
                quotes
            }
            Err(e) => {
                warn!("Combo fetch failed: {}", e);
                stale.push("combos".into());
                prev_board
                    .map(|b| {
                        b.combos
                            .iter()
                            .filter_map(|(code, q)| Some((*code, self.carry_over(Some(q), now)?)))
                            .collect()
                    })
                    .unwrap_or_default()
            }
        };

        let board = MarketBoard {
            house,
            senate,
            combos,
        };

        // (c) + (d) Valuation and classification.
        let evaluation = match poll {
            Some(reading) => match self.engine.evaluate(&reading, &board, now) {
                Ok(eval) => Some(eval),
                Err(e) => {
                    error!("Evaluation failed: {}", e);
                    stale.push("evaluation".into());
                    prev.as_ref().and_then(|s| s.evaluation.clone())
                }
            },
            None => {
                warn!("No poll reading yet; skipping evaluation");
                None
            }
        };

        let portfolio = if self.feed.has_credentials() {
            let previous = prev.as_ref().and_then(|s| s.portfolio.as_ref());
            Some(self.fetch_portfolio(&board, previous, now, &mut stale).await)
        } else {
            None
        };

        let snapshot = Snapshot {
            tick: self.tick,
            taken_at: now,
            poll,
            board,
            evaluation,
            portfolio,
            stale,
        };

        info!(
            "Tick {}: {} signals, {} quotes{}",
            snapshot.tick,
            snapshot.evaluation.as_ref().map_or(0, |e| e.signals.len()),
            snapshot.board.quotes().count(),
            if snapshot.stale.is_empty() {
                String::new()
            } else {
                format!(", stale: {}", snapshot.stale.join(","))
            }
        );

        self.store.publish(snapshot).await
    }

    async fn fetch_chamber(
        &self,
        label: &str,
        series: &str,
        suffix: &str,
        previous: Option<&MarketQuote>,
        now: DateTime<Utc>,
        stale: &mut Vec<String>,
    ) -> Option<MarketQuote> {
        match self.timed(label, self.feed.series_quote(series, suffix)).await {
            Ok(Some(quote)) => {
                self.cache.record(&quote);
                Some(quote)
            }
            Ok(None) => {
                debug!("{}: no priced {}{} contract", label, series, suffix);
                None
            }
            Err(e) => {
                warn!("{} quote fetch failed: {}", label, e);
                stale.push(label.to_string());
                self.carry_over(previous, now)
            }
        }
    }

    async fn fetch_portfolio(
        &self,
        board: &MarketBoard,
        previous: Option<&PortfolioView>,
        now: DateTime<Utc>,
        stale: &mut Vec<String>,
    ) -> PortfolioView {
        let mut view = PortfolioView::default();

        match self.timed("balance", self.feed.balance()).await {
            Ok(b) => view.balance = Some(b),
            Err(e) => {
                warn!("Balance fetch failed: {}", e);
                stale.push("balance".into());
                view.balance = previous.and_then(|p| p.balance);
            }
        }

        match self.timed("positions", self.feed.positions()).await {
            Ok(positions) => {
                let mut prices: HashMap<String, i64> = HashMap::new();
                for p in positions.iter().filter(|p| p.position != 0) {
                    if let Some(price) = self.mark_price(&p.ticker, board, now).await {
                        prices.insert(p.ticker.clone(), price);
                    }
                }
                view.positions = Some(mark_positions(&positions, |t| prices.get(t).copied()));
            }
            Err(e) => {
                warn!("Positions fetch failed: {}", e);
                stale.push("positions".into());
                view.positions = previous.and_then(|p| p.positions.clone());
            }
        }

        match self.timed("resting_orders", self.feed.resting_orders()).await {
            Ok(orders) => view.resting_orders = Some(orders),
            Err(e) => {
                warn!("Resting orders fetch failed: {}", e);
                stale.push("resting_orders".into());
                view.resting_orders = previous.and_then(|p| p.resting_orders.clone());
            }
        }

        match self.timed("settlements", self.feed.settlements()).await {
            Ok(settlements) => {
                view.settlements = Some(settlements.iter().map(SettlementView::from).collect())
            }
            Err(e) => {
                warn!("Settlements fetch failed: {}", e);
                stale.push("settlements".into());
                view.settlements = previous.and_then(|p| p.settlements.clone());
            }
        }

        view
    }

    /// Board price first, then the cache, then a per-ticker quote.
    async fn mark_price(&self, ticker: &str, board: &MarketBoard, now: DateTime<Utc>) -> Option<i64> {
        if let Some(price) = board.yes_price(ticker) {
            return Some(price);
        }
        if let Some(quote) = self.cache.fresh(ticker, now) {
            return Some(quote.yes_price());
        }
        match self.timed(ticker, self.feed.quote(ticker)).await {
            Ok(quote) => {
                self.cache.record(&quote);
                Some(quote.yes_price())
            }
            Err(e) => {
                debug!("{}: no mark price ({})", ticker, e);
                None
            }
        }
    }
}

/// Keep the held reading when the fetched one is older.
fn newest(held: Option<PollReading>, fetched: PollReading) -> PollReading {
    match held {
        Some(held) if held.as_of > fetched.as_of => {
            warn!(
                "Poll reading as of {} is older than held {}; keeping held",
                fetched.as_of, held.as_of
            );
            held
        }
        _ => fetched,
    }
}
