//! Scalar Kalman blend of a last-vehicle observation with history
//!
//! The blend refines the most recent same-segment observation from the
//! preceding vehicle using the historical distribution of the segment:
//!
//! ```text
//! K        = e / (e + var)
//! estimate = mean + K * (last - mean)
//! e'       = max((1 - K) * e, epsilon)
//! ```
//!
//! where `e` is the filter error carried forward from the previous
//! prediction on the same segment and `var` is the historical variance.
//! The epsilon floor keeps the filter from freezing at zero confidence,
//! after which it would ignore last-vehicle data forever.

use crate::error::{Error, Result};

/// Outcome of one blend step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendOutcome {
    /// Blended duration estimate
    pub estimate: f64,
    /// Gain applied to the last-vehicle residual, always in [0, 1]
    pub gain: f64,
    /// Filter error to carry into the next prediction for this segment
    pub next_error: f64,
}

/// Stateless blend operator; the per-segment filter error lives with the
/// segment's cache entry, not here
#[derive(Debug, Clone, Copy)]
pub struct KalmanBlend {
    epsilon: f64,
}

impl KalmanBlend {
    /// Create a blend operator with the given filter-error floor
    pub fn new(epsilon: f64) -> Result<Self> {
        if !epsilon.is_finite() {
            return Err(Error::non_finite("epsilon"));
        }
        if epsilon <= 0.0 {
            return Err(Error::out_of_range("epsilon", epsilon, "(0, inf)"));
        }
        Ok(Self { epsilon })
    }

    /// The configured filter-error floor
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Filter error to use for a segment that has never been blended
    pub fn initial_error(&self, historical_variance: f64) -> f64 {
        historical_variance.max(self.epsilon)
    }

    /// Kalman gain for the given prior error and historical variance
    ///
    /// Returns 0 when the inputs are degenerate (non-positive or
    /// non-finite denominator), which makes the blend collapse to the
    /// historical mean.
    pub fn gain(&self, prior_error: f64, historical_variance: f64) -> f64 {
        let denominator = prior_error + historical_variance;
        if !denominator.is_finite() || denominator <= 0.0 {
            return 0.0;
        }
        (prior_error / denominator).clamp(0.0, 1.0)
    }

    /// Blend a last-vehicle observation with the historical distribution
    pub fn blend(
        &self,
        last_vehicle_value: f64,
        historical_mean: f64,
        historical_variance: f64,
        prior_error: f64,
    ) -> BlendOutcome {
        let gain = self.gain(prior_error, historical_variance);
        let estimate = historical_mean + gain * (last_vehicle_value - historical_mean);
        let next_error = ((1.0 - gain) * prior_error).max(self.epsilon);
        BlendOutcome {
            estimate,
            gain,
            next_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_bad_epsilon() {
        assert!(KalmanBlend::new(0.0).is_err());
        assert!(KalmanBlend::new(-1.0).is_err());
        assert!(KalmanBlend::new(f64::NAN).is_err());
        assert!(KalmanBlend::new(1e-3).is_ok());
    }

    #[test]
    fn gain_is_bounded() {
        let blend = KalmanBlend::new(1e-3).unwrap();
        for &e in &[0.0, 1e-6, 1.0, 1e6, 1e12] {
            for &var in &[1e-6, 1.0, 1e6, 1e12] {
                let k = blend.gain(e, var);
                assert!((0.0..=1.0).contains(&k), "gain {k} out of bounds");
            }
        }
    }

    #[test]
    fn equal_trust_blends_halfway() {
        let blend = KalmanBlend::new(1e-3).unwrap();
        // prior error == variance: gain 0.5, estimate midway
        let out = blend.blend(500.0, 400.0, 900.0, 900.0);
        assert_relative_eq!(out.gain, 0.5, epsilon = 1e-12);
        assert_relative_eq!(out.estimate, 450.0, epsilon = 1e-9);
        assert_relative_eq!(out.next_error, 450.0, epsilon = 1e-9);
    }

    #[test]
    fn error_never_falls_below_epsilon() {
        let blend = KalmanBlend::new(0.5).unwrap();
        let mut error = blend.initial_error(100.0);
        for _ in 0..1_000 {
            let out = blend.blend(420.0, 400.0, 100.0, error);
            error = out.next_error;
        }
        assert!(error >= 0.5);
    }

    #[test]
    fn degenerate_variance_collapses_to_mean() {
        let blend = KalmanBlend::new(1e-3).unwrap();
        let out = blend.blend(700.0, 400.0, 0.0, 0.0);
        assert_relative_eq!(out.estimate, 400.0, epsilon = 1e-9);
        assert_relative_eq!(out.gain, 0.0, epsilon = 1e-12);
    }
}
