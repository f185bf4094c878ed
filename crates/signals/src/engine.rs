//! Signal evaluation engine.
//!
//! Evaluates every tracked market on each tick: the House and Senate
//! control contracts and each balance-of-power combo leg, comparing the
//! model's fair value against the traded price.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{
    Chamber, ChamberControlEstimate, ComboCode, ComboOutcome, Error, MarketQuote, MarketsConfig,
    Party, PollReading, PriceSource, Signal, SignalClass, SignalsConfig, StrategyConfig,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use valuation::{implied_marginals, ImpliedMarginals, ValuationModel};

use crate::classify::{signal, SignalTarget};

/// Quotes available for one tick. Absent entries mean "no price".
#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketBoard {
    /// Democratic House control contract.
    pub house: Option<MarketQuote>,
    /// Republican Senate control contract.
    pub senate: Option<MarketQuote>,
    pub combos: HashMap<ComboCode, MarketQuote>,
}

impl MarketBoard {
    /// Every quote on the board.
    pub fn quotes(&self) -> impl Iterator<Item = &MarketQuote> {
        self.house
            .iter()
            .chain(self.senate.iter())
            .chain(self.combos.values())
    }

    /// YES price of `ticker` if it is on the board.
    pub fn yes_price(&self, ticker: &str) -> Option<i64> {
        self.quotes()
            .find(|q| q.ticker() == ticker)
            .map(MarketQuote::yes_price)
    }
}

/// Output of one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub margin_points: f64,
    pub estimates: Vec<ChamberControlEstimate>,
    pub combos: Vec<ComboOutcome>,
    pub implied: Option<ImpliedMarginals>,
    pub signals: Vec<Signal>,
}

/// The signal engine. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    model: ValuationModel,
    strategy: StrategyConfig,
    markets: MarketsConfig,
}

impl SignalEngine {
    pub fn new(model: ValuationModel, strategy: StrategyConfig, markets: MarketsConfig) -> Self {
        Self {
            model,
            strategy,
            markets,
        }
    }

    pub fn from_config(cfg: &SignalsConfig) -> Result<Self, Error> {
        Ok(Self::new(
            ValuationModel::from_config(&cfg.model)?,
            cfg.strategy.clone(),
            cfg.markets.clone(),
        ))
    }

    pub fn model(&self) -> &ValuationModel {
        &self.model
    }

    /// Evaluate all tracked markets against one poll reading.
    ///
    /// Markets without a price produce no signal. Model and input errors
    /// propagate to the caller.
    pub fn evaluate(
        &self,
        reading: &PollReading,
        board: &MarketBoard,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, Error> {
        reading.validate()?;
        let margin = reading.margin_points;

        let estimates = self.model.estimates(margin)?;
        let p_house_dem = self.model.chamber_probability(Chamber::House, margin)?;
        let p_senate_dem = self.model.chamber_probability(Chamber::Senate, margin)?;
        let dist = self.model.combos(margin)?;
        let implied = implied_marginals(&board.combos);

        let mut signals = Vec::new();

        // 1. House: Democratic control contract.
        if let Some((target, price)) = self.chamber_target(
            Chamber::House,
            Party::Dem,
            &self.markets.house_series,
            board.house.as_ref(),
            implied.as_ref(),
        ) {
            signals.push(signal(target, p_house_dem, price, self.strategy.edge_threshold_pct, now)?);
        }

        // 2. Senate: Republican control contract.
        if let Some((target, price)) = self.chamber_target(
            Chamber::Senate,
            Party::Rep,
            &self.markets.senate_series,
            board.senate.as_ref(),
            implied.as_ref(),
        ) {
            signals.push(signal(
                target,
                1.0 - p_senate_dem,
                price,
                self.strategy.senate_edge_threshold_pct,
                now,
            )?);
        }

        // 3. Combo legs, each classified on its own.
        for code in ComboCode::ALL {
            let Some(quote) = board.combos.get(&code) else {
                debug!("{}: no combo quote", code);
                continue;
            };
            let target = SignalTarget {
                ticker: quote.ticker().to_string(),
                market: code.label().to_string(),
                source: PriceSource::Direct {
                    ticker: quote.ticker().to_string(),
                },
            };
            signals.push(signal(
                target,
                dist.probability(code),
                quote.yes_probability(),
                self.strategy.combo_edge_threshold_pct,
                now,
            )?);
        }

        for s in &signals {
            if s.classification == SignalClass::Watch {
                debug!(
                    "{}: WATCH fair={:.3} price={:.3} edge={:+.3}",
                    s.ticker, s.fair_value, s.market_price, s.edge
                );
            } else {
                info!(
                    "{}: {} fair={:.3} price={:.3} edge={:+.3} (threshold {:.2})",
                    s.ticker, s.classification, s.fair_value, s.market_price, s.edge, s.threshold
                );
            }
        }

        Ok(Evaluation {
            margin_points: margin,
            estimates,
            combos: dist.outcomes(),
            implied,
            signals,
        })
    }

    /// Direct quote first, combo-implied marginal second.
    ///
    /// An implied price has no tradable contract behind it, so its signal
    /// is keyed by the series ticker and carries the legs it came from.
    fn chamber_target(
        &self,
        chamber: Chamber,
        party: Party,
        series: &str,
        direct: Option<&MarketQuote>,
        implied: Option<&ImpliedMarginals>,
    ) -> Option<(SignalTarget, f64)> {
        let market = format!("{} {:?} control", party_name(party), chamber);

        if let Some(quote) = direct {
            let target = SignalTarget {
                ticker: quote.ticker().to_string(),
                market,
                source: PriceSource::Direct {
                    ticker: quote.ticker().to_string(),
                },
            };
            return Some((target, quote.yes_probability()));
        }

        let Some(implied) = implied else {
            debug!("{:?}: no direct or combo-implied price", chamber);
            return None;
        };

        let price = implied.probability(chamber, party);
        if price > 1.0 {
            warn!(
                "{:?}: combo legs sum to {:.2}, not usable as a price",
                chamber, price
            );
            return None;
        }

        debug!("{:?}: pricing from combo legs", chamber);
        let target = SignalTarget {
            ticker: series.to_string(),
            market,
            source: PriceSource::ComboImplied {
                legs: ImpliedMarginals::legs(chamber, party),
            },
        };
        Some((target, price))
    }
}

fn party_name(party: Party) -> &'static str {
    match party {
        Party::Dem => "Dem",
        Party::Rep => "Rep",
    }
}
