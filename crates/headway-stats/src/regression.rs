//! Incremental least-squares regression with a forgetting factor
//!
//! Fits `y = intercept + slope * x` online via recursive least squares.
//! The engine uses this to predict dwell time from headway: a vehicle
//! running far behind its leader picks up more waiting passengers and
//! dwells longer.
//!
//! The model is lazily materialized: the first sample is buffered, the
//! second (with a distinct covariate) constructs the fit, and later
//! samples take an incremental learn step. [`RlsRegression::predict`]
//! returns `None` until the fit exists; it never guesses.

use crate::error::{Error, Result};

/// Initial covariance for the freshly constructed fit. Large, so the
/// first few learn steps move the coefficients freely.
const INITIAL_COVARIANCE: f64 = 1e6;

/// Covariate gap below which two samples count as the same x
const SEED_X_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
enum ModelState {
    /// No samples yet
    Empty,
    /// One covariate value seen; y is the mean of the buffered samples
    Seeded { x: f64, y: f64, buffered: u64 },
    /// Model constructed; coefficients update incrementally
    Fitted {
        intercept: f64,
        slope: f64,
        // Covariance matrix of the coefficient estimate, symmetric 2x2
        p00: f64,
        p01: f64,
        p11: f64,
    },
}

/// Online linear regression with exponential forgetting
#[derive(Debug, Clone)]
pub struct RlsRegression {
    lambda: f64,
    samples: u64,
    state: ModelState,
}

impl RlsRegression {
    /// Create a regression with forgetting factor `lambda` in (0, 1]
    ///
    /// `lambda = 1` weights all samples equally; smaller values track
    /// recent samples more aggressively at the cost of stability.
    pub fn new(lambda: f64) -> Result<Self> {
        if !lambda.is_finite() {
            return Err(Error::non_finite("lambda"));
        }
        if lambda <= 0.0 || lambda > 1.0 {
            return Err(Error::out_of_range("lambda", lambda, "(0, 1]"));
        }
        Ok(Self {
            lambda,
            samples: 0,
            state: ModelState::Empty,
        })
    }

    /// The configured forgetting factor
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Number of samples accepted so far
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// Whether the fit exists and [`RlsRegression::predict`] will answer
    pub fn is_fitted(&self) -> bool {
        matches!(self.state, ModelState::Fitted { .. })
    }

    /// Fold in one (covariate, response) pair
    ///
    /// Non-finite pairs are ignored. A second sample sharing the seed's
    /// covariate keeps buffering (the seed response is averaged) since a
    /// line through a single x is undefined.
    pub fn add_sample(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        self.samples += 1;
        self.state = match self.state {
            ModelState::Empty => ModelState::Seeded { x, y, buffered: 1 },
            ModelState::Seeded {
                x: x0,
                y: y0,
                buffered,
            } => {
                if (x - x0).abs() <= SEED_X_TOLERANCE {
                    let n = buffered as f64;
                    ModelState::Seeded {
                        x: x0,
                        y: (y0 * n + y) / (n + 1.0),
                        buffered: buffered + 1,
                    }
                } else {
                    // Exact line through the seed and this sample
                    let slope = (y - y0) / (x - x0);
                    ModelState::Fitted {
                        intercept: y0 - slope * x0,
                        slope,
                        p00: INITIAL_COVARIANCE,
                        p01: 0.0,
                        p11: INITIAL_COVARIANCE,
                    }
                }
            }
            ModelState::Fitted {
                intercept,
                slope,
                p00,
                p01,
                p11,
            } => {
                // Standard RLS update with regressor phi = (1, x)
                let pp0 = p00 + p01 * x;
                let pp1 = p01 + p11 * x;
                let denominator = self.lambda + pp0 + pp1 * x;
                let k0 = pp0 / denominator;
                let k1 = pp1 / denominator;
                let residual = y - (intercept + slope * x);
                ModelState::Fitted {
                    intercept: intercept + k0 * residual,
                    slope: slope + k1 * residual,
                    p00: (p00 - k0 * pp0) / self.lambda,
                    p01: (p01 - k0 * pp1) / self.lambda,
                    p11: (p11 - k1 * pp1) / self.lambda,
                }
            }
        };
    }

    /// Predicted response at `x`, or `None` while the fit does not exist
    pub fn predict(&self, x: f64) -> Option<f64> {
        match self.state {
            ModelState::Fitted {
                intercept, slope, ..
            } => Some(intercept + slope * x),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_bad_lambda() {
        assert!(RlsRegression::new(0.0).is_err());
        assert!(RlsRegression::new(1.5).is_err());
        assert!(RlsRegression::new(f64::NAN).is_err());
        assert!(RlsRegression::new(1.0).is_ok());
        assert!(RlsRegression::new(0.5).is_ok());
    }

    #[test]
    fn predict_is_absent_below_two_samples() {
        let mut model = RlsRegression::new(1.0).unwrap();
        assert!(model.predict(10.0).is_none());
        model.add_sample(600_000.0, 20_000.0);
        assert!(model.predict(10.0).is_none());
        assert_eq!(model.sample_count(), 1);
    }

    #[test]
    fn second_distinct_sample_constructs_the_fit() {
        let mut model = RlsRegression::new(1.0).unwrap();
        model.add_sample(2.0, 5.0);
        model.add_sample(4.0, 9.0);
        assert!(model.is_fitted());
        // Line through (2, 5) and (4, 9): y = 1 + 2x
        assert_relative_eq!(model.predict(3.0).unwrap(), 7.0, epsilon = 1e-9);
    }

    #[test]
    fn repeated_covariate_keeps_buffering() {
        let mut model = RlsRegression::new(1.0).unwrap();
        model.add_sample(5.0, 10.0);
        model.add_sample(5.0, 20.0);
        assert!(!model.is_fitted());
        assert!(model.predict(5.0).is_none());
        // A distinct covariate finally constructs the fit from the
        // averaged seed (5, 15)
        model.add_sample(10.0, 30.0);
        assert_relative_eq!(model.predict(5.0).unwrap(), 15.0, epsilon = 1e-9);
    }

    #[test]
    fn converges_on_noiseless_line() {
        let mut model = RlsRegression::new(1.0).unwrap();
        for i in 0..50 {
            let x = i as f64;
            model.add_sample(x, 3.0 + 0.5 * x);
        }
        assert_relative_eq!(model.predict(100.0).unwrap(), 53.0, epsilon = 1e-6);
    }

    #[test]
    fn forgetting_tracks_a_level_shift() {
        let mut model = RlsRegression::new(0.7).unwrap();
        for i in 0..40 {
            let x = (i % 10) as f64;
            model.add_sample(x, 10.0 + x);
        }
        // Regime change: same slope, new intercept
        for i in 0..40 {
            let x = (i % 10) as f64;
            model.add_sample(x, 50.0 + x);
        }
        let predicted = model.predict(5.0).unwrap();
        assert!(
            (predicted - 55.0).abs() < 1.0,
            "forgetting factor should have tracked the shift, got {predicted}"
        );
    }

    #[test]
    fn non_finite_samples_are_ignored() {
        let mut model = RlsRegression::new(1.0).unwrap();
        model.add_sample(f64::NAN, 1.0);
        model.add_sample(1.0, f64::INFINITY);
        assert_eq!(model.sample_count(), 0);
        assert!(model.predict(1.0).is_none());
    }
}
