//! Joint House/Senate outcome distribution.
//!
//! **Limitation:** the model treats the two chambers as independent draws.
//! Real outcomes are correlated (a wave election moves both), so the
//! diagonal outcomes RR and DD are understated and RD/DR overstated.

use std::collections::HashMap;

use common::{Chamber, ComboCode, ComboOutcome, Error, MarketQuote, Party};
use serde::Serialize;
use tracing::error;

/// Allowed deviation of the four probabilities from 1.0.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Probability of each balance-of-power outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComboDistribution {
    pub rr: f64,
    pub rd: f64,
    pub dr: f64,
    pub dd: f64,
}

impl ComboDistribution {
    /// Build from explicit outcome probabilities, enforcing the sum-to-one
    /// invariant. A violation is a model defect: logged and returned as
    /// [`Error::Model`], never renormalized.
    pub fn from_parts(rr: f64, rd: f64, dr: f64, dd: f64) -> Result<Self, Error> {
        let dist = Self { rr, rd, dr, dd };
        let total = dist.total();
        if !total.is_finite() || (total - 1.0).abs() > SUM_TOLERANCE {
            error!(
                "Combo distribution sums to {} (RR={} RD={} DR={} DD={})",
                total, rr, rd, dr, dd
            );
            return Err(Error::Model(format!(
                "combo probabilities sum to {total}, expected 1 ± {SUM_TOLERANCE}"
            )));
        }
        Ok(dist)
    }

    pub fn probability(&self, code: ComboCode) -> f64 {
        match code {
            ComboCode::RR => self.rr,
            ComboCode::RD => self.rd,
            ComboCode::DR => self.dr,
            ComboCode::DD => self.dd,
        }
    }

    pub fn total(&self) -> f64 {
        self.rr + self.rd + self.dr + self.dd
    }

    /// All four outcomes in RR, RD, DR, DD order.
    pub fn outcomes(&self) -> Vec<ComboOutcome> {
        ComboCode::ALL
            .into_iter()
            .map(|code| ComboOutcome {
                code,
                probability: self.probability(code),
            })
            .collect()
    }
}

/// Joint distribution from P(House = D) and P(Senate = D), assuming the
/// chambers are independent.
pub fn combo_distribution(p_house_dem: f64, p_senate_dem: f64) -> Result<ComboDistribution, Error> {
    for (name, p) in [("house", p_house_dem), ("senate", p_senate_dem)] {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::InvalidInput(format!(
                "{name} control probability {p} outside [0, 1]"
            )));
        }
    }

    let (h, s) = (p_house_dem, p_senate_dem);
    ComboDistribution::from_parts(
        (1.0 - h) * (1.0 - s),
        (1.0 - h) * s,
        h * (1.0 - s),
        h * s,
    )
}

/// Single-chamber prices implied by the four combo legs, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImpliedMarginals {
    pub dem_house: i64,
    pub rep_house: i64,
    pub dem_senate: i64,
    pub rep_senate: i64,
}

impl ImpliedMarginals {
    /// Implied price of `party` controlling `chamber`, as a probability.
    pub fn probability(&self, chamber: Chamber, party: Party) -> f64 {
        let cents = match (chamber, party) {
            (Chamber::House, Party::Dem) => self.dem_house,
            (Chamber::House, Party::Rep) => self.rep_house,
            (Chamber::Senate, Party::Dem) => self.dem_senate,
            (Chamber::Senate, Party::Rep) => self.rep_senate,
        };
        cents as f64 / 100.0
    }

    /// Combo legs that sum to the given marginal.
    pub fn legs(chamber: Chamber, party: Party) -> Vec<ComboCode> {
        ComboCode::ALL
            .into_iter()
            .filter(|code| match chamber {
                Chamber::House => code.house() == party,
                Chamber::Senate => code.senate() == party,
            })
            .collect()
    }
}

/// Marginals from a complete set of combo quotes; `None` if any leg is
/// missing.
pub fn implied_marginals(quotes: &HashMap<ComboCode, MarketQuote>) -> Option<ImpliedMarginals> {
    let price = |code: ComboCode| quotes.get(&code).map(MarketQuote::yes_price);
    let (rr, rd, dr, dd) = (
        price(ComboCode::RR)?,
        price(ComboCode::RD)?,
        price(ComboCode::DR)?,
        price(ComboCode::DD)?,
    );

    Some(ImpliedMarginals {
        dem_house: dr + dd,
        rep_house: rr + rd,
        dem_senate: rd + dd,
        rep_senate: rr + dr,
    })
}
