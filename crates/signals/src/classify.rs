//! Edge classification.
//!
//! Pure: identical inputs always give an identical classification and
//! edge. Only [`signal`] stamps a timestamp, and it takes it as a
//! parameter.

use chrono::{DateTime, Utc};
use common::{Error, PriceSource, Signal, SignalClass};

/// Edge and class for one fair-value / price comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// fair_value − market_price, in probability units.
    pub edge: f64,
    /// Threshold in probability units.
    pub threshold: f64,
    pub class: SignalClass,
}

fn check_probability(name: &str, value: f64) -> Result<(), Error> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidInput(format!("{name} {value} outside [0, 1]")));
    }
    Ok(())
}

/// Classify the edge of `fair_value` over `market_price`.
///
/// `threshold_pct` is in percent (8.0 means 0.08). Exactly one branch
/// fires: edge above +threshold is STRONG_BUY, below −threshold is
/// STRONG_SELL, anything in between (inclusive) is WATCH.
pub fn classify(fair_value: f64, market_price: f64, threshold_pct: f64) -> Result<Classification, Error> {
    check_probability("fair value", fair_value)?;
    check_probability("market price", market_price)?;
    if !(0.0..=100.0).contains(&threshold_pct) {
        return Err(Error::InvalidInput(format!(
            "threshold {threshold_pct}% outside [0, 100]"
        )));
    }

    let edge = fair_value - market_price;
    let threshold = threshold_pct / 100.0;

    let class = if edge > threshold {
        SignalClass::StrongBuy
    } else if edge < -threshold {
        SignalClass::StrongSell
    } else {
        SignalClass::Watch
    };

    Ok(Classification {
        edge,
        threshold,
        class,
    })
}

/// What a signal is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalTarget {
    pub ticker: String,
    pub market: String,
    pub source: PriceSource,
}

/// Classify and wrap into an immutable [`Signal`].
pub fn signal(
    target: SignalTarget,
    fair_value: f64,
    market_price: f64,
    threshold_pct: f64,
    generated_at: DateTime<Utc>,
) -> Result<Signal, Error> {
    let c = classify(fair_value, market_price, threshold_pct)?;
    Ok(Signal {
        ticker: target.ticker,
        market: target.market,
        source: target.source,
        fair_value,
        market_price,
        edge: c.edge,
        threshold: c.threshold,
        classification: c.class,
        generated_at,
    })
}
