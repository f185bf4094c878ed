//! Poll-margin → chamber-control probability.
//!
//! Each chamber is priced by a [`ChamberModel`]. The House uses a logistic
//! seat model; the Senate currently uses a fixed placeholder probability
//! that can be swapped for a state-level model without touching the
//! signal engine.

use common::{Error, ModelConfig, MARGIN_LIMIT_POINTS};

/// Largest logit the House model may reach inside the margin domain.
/// `logistic(30)` is still strictly below 1.0 in f64.
pub const MAX_LOGIT: f64 = 30.0;

/// Historical placeholder for P(Republican Senate control).
pub const SENATE_REP_CONTROL_PLACEHOLDER: f64 = 0.58;

/// Maps a validated generic-ballot margin (Dem − Rep, points) to the
/// probability that Democrats control the chamber.
pub trait ChamberModel: Send + Sync + std::fmt::Debug {
    fn dem_control_probability(&self, margin_points: f64) -> f64;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

// ── House ─────────────────────────────────────────────────────────────

/// Logistic seat model.
///
/// Expected Democratic seats grow linearly with the margin:
/// `seats(m) = baseline_dem_seats + seats_per_point · m`.
/// The surplus over a majority is scaled by `seat_sigma` (seats per logit
/// unit, the steepness constant) and squashed:
///
/// `p(m) = 1 / (1 + exp(-(seats(m) − majority_seats) / seat_sigma))`
///
/// Strictly increasing for `seats_per_point > 0`, and bounded away from
/// 0 and 1 on the whole margin domain by [`MAX_LOGIT`].
#[derive(Debug, Clone, PartialEq)]
pub struct HouseModel {
    seats_per_point: f64,
    baseline_dem_seats: f64,
    majority_seats: f64,
    seat_sigma: f64,
}

impl HouseModel {
    pub fn new(
        seats_per_point: f64,
        baseline_dem_seats: f64,
        majority_seats: f64,
        seat_sigma: f64,
    ) -> Result<Self, Error> {
        let model = Self {
            seats_per_point,
            baseline_dem_seats,
            majority_seats,
            seat_sigma,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn from_config(cfg: &ModelConfig) -> Result<Self, Error> {
        Self::new(
            cfg.seats_per_point,
            cfg.baseline_dem_seats,
            cfg.majority_seats,
            cfg.seat_sigma,
        )
    }

    fn validate(&self) -> Result<(), Error> {
        let params = [
            self.seats_per_point,
            self.baseline_dem_seats,
            self.majority_seats,
            self.seat_sigma,
        ];
        if params.iter().any(|p| !p.is_finite()) {
            return Err(Error::Config("house model parameters must be finite".into()));
        }
        if self.seats_per_point <= 0.0 {
            return Err(Error::Config(format!(
                "seats_per_point must be > 0 (got {})",
                self.seats_per_point
            )));
        }
        if self.seat_sigma <= 0.0 {
            return Err(Error::Config(format!(
                "seat_sigma must be > 0 (got {})",
                self.seat_sigma
            )));
        }

        let widest = self
            .logit(MARGIN_LIMIT_POINTS)
            .abs()
            .max(self.logit(-MARGIN_LIMIT_POINTS).abs());
        if widest > MAX_LOGIT {
            return Err(Error::Config(format!(
                "house model saturates at ±{MARGIN_LIMIT_POINTS} points (logit {widest:.1} > {MAX_LOGIT}); raise seat_sigma"
            )));
        }
        Ok(())
    }

    pub fn expected_dem_seats(&self, margin_points: f64) -> f64 {
        self.baseline_dem_seats + self.seats_per_point * margin_points
    }

    fn logit(&self, margin_points: f64) -> f64 {
        (self.expected_dem_seats(margin_points) - self.majority_seats) / self.seat_sigma
    }

    /// Probability at an even generic ballot.
    pub fn baseline_probability(&self) -> f64 {
        logistic((self.baseline_dem_seats - self.majority_seats) / self.seat_sigma)
    }
}

impl Default for HouseModel {
    fn default() -> Self {
        let cfg = ModelConfig::default();
        Self {
            seats_per_point: cfg.seats_per_point,
            baseline_dem_seats: cfg.baseline_dem_seats,
            majority_seats: cfg.majority_seats,
            seat_sigma: cfg.seat_sigma,
        }
    }
}

impl ChamberModel for HouseModel {
    fn dem_control_probability(&self, margin_points: f64) -> f64 {
        logistic(self.logit(margin_points))
    }

    fn name(&self) -> &'static str {
        "house-logistic"
    }
}

// ── Senate ────────────────────────────────────────────────────────────

/// Margin-independent probability. Used for the Senate until a
/// state-by-state model exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedProbability {
    dem_control: f64,
}

impl FixedProbability {
    pub fn new(dem_control: f64) -> Result<Self, Error> {
        if !(dem_control > 0.0 && dem_control < 1.0) {
            return Err(Error::Config(format!(
                "fixed control probability must be in (0, 1) (got {dem_control})"
            )));
        }
        Ok(Self { dem_control })
    }

    /// Senate placeholder, configured as P(Republican control).
    pub fn senate_placeholder(rep_control: f64) -> Result<Self, Error> {
        Self::new(1.0 - rep_control)
    }
}

impl Default for FixedProbability {
    /// The Senate placeholder.
    fn default() -> Self {
        Self {
            dem_control: 1.0 - SENATE_REP_CONTROL_PLACEHOLDER,
        }
    }
}

impl ChamberModel for FixedProbability {
    fn dem_control_probability(&self, _margin_points: f64) -> f64 {
        self.dem_control
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Numerically stable logistic.
fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_house_strictly_increasing() {
        let model = HouseModel::default();
        let mut prev = model.dem_control_probability(-100.0);
        let mut m = -99.5;
        while m <= 100.0 {
            let p = model.dem_control_probability(m);
            assert!(p > prev, "p({m}) = {p} not above p({}) = {prev}", m - 0.5);
            prev = p;
            m += 0.5;
        }
    }

    #[test]
    fn test_house_never_saturates() {
        let model = HouseModel::default();
        let low = model.dem_control_probability(-100.0);
        let high = model.dem_control_probability(100.0);
        assert!(low > 0.0 && low < 1e-9, "low = {low}");
        assert!(high < 1.0 && high > 1.0 - 1e-9, "high = {high}");
    }

    #[test]
    fn test_even_ballot_returns_baseline_exactly() {
        let model = HouseModel::default();
        assert_eq!(model.dem_control_probability(0.0), model.baseline_probability());
        assert_eq!(model.baseline_probability(), 0.5);

        // A Dem-leaning baseline split moves the even-ballot probability.
        let tilted = HouseModel::new(4.5, 226.0, 218.0, 16.0).unwrap();
        assert_eq!(tilted.dem_control_probability(0.0), tilted.baseline_probability());
        assert!(tilted.baseline_probability() > 0.5);
    }

    #[test]
    fn test_expected_seats() {
        let model = HouseModel::default();
        assert_eq!(model.expected_dem_seats(0.0), 218.0);
        assert_eq!(model.expected_dem_seats(4.0), 236.0);
        // D+4 → +18 seats of surplus, logit 1.125.
        let p = model.dem_control_probability(4.0);
        assert!((p - 0.75490).abs() < 1e-4, "p = {p}");
    }

    #[test]
    fn test_steep_parameters_rejected() {
        let err = HouseModel::new(10.0, 218.0, 218.0, 2.0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(HouseModel::new(0.0, 218.0, 218.0, 16.0).is_err());
        assert!(HouseModel::new(4.5, 218.0, 218.0, 0.0).is_err());
        assert!(HouseModel::new(f64::NAN, 218.0, 218.0, 16.0).is_err());
    }

    #[test]
    fn test_senate_placeholder_ignores_margin() {
        let senate = FixedProbability::senate_placeholder(SENATE_REP_CONTROL_PLACEHOLDER).unwrap();
        let p = senate.dem_control_probability(0.0);
        assert!((p - 0.42).abs() < 1e-12);
        assert_eq!(senate.dem_control_probability(-35.0), p);
        assert_eq!(senate.dem_control_probability(35.0), p);
    }

    #[test]
    fn test_fixed_probability_bounds() {
        assert!(FixedProbability::new(0.0).is_err());
        assert!(FixedProbability::new(1.0).is_err());
        assert!(FixedProbability::new(f64::NAN).is_err());
        assert!(FixedProbability::new(0.3).is_ok());
    }

    #[test]
    fn test_logistic_symmetry() {
        for x in [0.5, 1.0, 5.0, 29.0] {
            assert!((logistic(x) + logistic(-x) - 1.0).abs() < 1e-12);
        }
    }
}
