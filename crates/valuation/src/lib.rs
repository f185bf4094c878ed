//! Valuation model: poll margin → chamber-control probabilities and the
//! joint balance-of-power distribution.

pub mod chamber;
pub mod combo;

use std::sync::Arc;

use common::{validate_margin, Chamber, ChamberControlEstimate, Error, ModelConfig};
use tracing::debug;

pub use chamber::{ChamberModel, FixedProbability, HouseModel, SENATE_REP_CONTROL_PLACEHOLDER};
pub use combo::{combo_distribution, implied_marginals, ComboDistribution, ImpliedMarginals};

/// One model slot per chamber.
#[derive(Debug, Clone)]
pub struct ValuationModel {
    house: Arc<dyn ChamberModel>,
    senate: Arc<dyn ChamberModel>,
}

impl ValuationModel {
    pub fn new(house: Arc<dyn ChamberModel>, senate: Arc<dyn ChamberModel>) -> Self {
        Self { house, senate }
    }

    /// Logistic House model plus the fixed Senate placeholder.
    pub fn from_config(cfg: &ModelConfig) -> Result<Self, Error> {
        Ok(Self::new(
            Arc::new(HouseModel::from_config(cfg)?),
            Arc::new(FixedProbability::senate_placeholder(cfg.senate_rep_control)?),
        ))
    }

    /// P(Democratic control of `chamber`) at the given margin.
    pub fn chamber_probability(&self, chamber: Chamber, margin_points: f64) -> Result<f64, Error> {
        validate_margin(margin_points)?;
        let model = match chamber {
            Chamber::House => &self.house,
            Chamber::Senate => &self.senate,
        };
        let p = model.dem_control_probability(margin_points);
        debug!("{:?} ({}) at {:+.1}: p_dem={:.4}", chamber, model.name(), margin_points, p);
        Ok(p)
    }

    /// Estimates for both chambers.
    pub fn estimates(&self, margin_points: f64) -> Result<Vec<ChamberControlEstimate>, Error> {
        [Chamber::House, Chamber::Senate]
            .into_iter()
            .map(|chamber| {
                Ok(ChamberControlEstimate {
                    chamber,
                    implied_probability: self.chamber_probability(chamber, margin_points)?,
                })
            })
            .collect()
    }

    /// Joint distribution at the given margin.
    pub fn combos(&self, margin_points: f64) -> Result<ComboDistribution, Error> {
        let p_house = self.chamber_probability(Chamber::House, margin_points)?;
        let p_senate = self.chamber_probability(Chamber::Senate, margin_points)?;
        combo_distribution(p_house, p_senate)
    }
}

impl Default for ValuationModel {
    fn default() -> Self {
        Self::new(
            Arc::new(HouseModel::default()),
            Arc::new(FixedProbability::default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_domain_enforced() {
        let model = ValuationModel::default();
        for bad in [100.5, -101.0, f64::NAN, f64::INFINITY] {
            let err = model.chamber_probability(Chamber::House, bad).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "margin {bad}");
        }
        assert!(model.chamber_probability(Chamber::House, 100.0).is_ok());
        assert!(model.chamber_probability(Chamber::Senate, -100.0).is_ok());
    }

    #[test]
    fn test_estimates_cover_both_chambers() {
        let model = ValuationModel::from_config(&ModelConfig::default()).unwrap();
        let est = model.estimates(4.0).unwrap();
        assert_eq!(est.len(), 2);
        assert_eq!(est[0].chamber, Chamber::House);
        assert!(est[0].implied_probability > 0.5);
        assert_eq!(est[1].chamber, Chamber::Senate);
        assert!((est[1].implied_probability - 0.42).abs() < 1e-12);
    }

    #[test]
    fn test_senate_slot_is_pluggable() {
        #[derive(Debug)]
        struct Tracking;
        impl ChamberModel for Tracking {
            fn dem_control_probability(&self, margin_points: f64) -> f64 {
                0.5 + margin_points / 400.0
            }
            fn name(&self) -> &'static str {
                "tracking"
            }
        }

        let model = ValuationModel::new(Arc::new(HouseModel::default()), Arc::new(Tracking));
        let p = model.chamber_probability(Chamber::Senate, 20.0).unwrap();
        assert!((p - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_combos_follow_chambers() {
        let model = ValuationModel::default();
        let dist = model.combos(0.0).unwrap();
        // Even ballot: House 0.5, Senate 0.42.
        assert!((dist.dr - 0.5 * 0.58).abs() < 1e-12);
        assert!((dist.dd - 0.5 * 0.42).abs() < 1e-12);
    }
}
