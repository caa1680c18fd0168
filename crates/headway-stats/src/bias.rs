//! Bias correction for raw predicted durations
//!
//! Prediction error tends to grow with the forecast horizon; these
//! adjusters apply a percentage correction derived from the horizon.
//! Both variants are pure functions of the raw prediction: the horizon in
//! minutes is the raw duration itself.

use crate::error::{Error, Result};

const MS_PER_MINUTE: f64 = 60_000.0;

/// Horizon-dependent correction applied to a raw predicted duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiasAdjuster {
    /// Error grows multiplicatively with horizon:
    /// `percentage = base^minutes - 1`, applied with the configured sign
    Exponential { base: f64, sign: f64 },
    /// Error grows linearly with horizon:
    /// `percentage = (raw / 100) * rate`
    Linear { rate: f64 },
}

impl BiasAdjuster {
    /// Exponential adjuster; `base >= 1`, `sign` is +1 or -1
    pub fn exponential(base: f64, sign: f64) -> Result<Self> {
        if !base.is_finite() {
            return Err(Error::non_finite("base"));
        }
        if base < 1.0 {
            return Err(Error::out_of_range("base", base, "[1, inf)"));
        }
        if sign != 1.0 && sign != -1.0 {
            return Err(Error::InvalidParameter(format!(
                "sign = {sign} must be +1 or -1"
            )));
        }
        Ok(Self::Exponential { base, sign })
    }

    /// Linear adjuster with the given percentage rate per unit horizon
    pub fn linear(rate: f64) -> Result<Self> {
        if !rate.is_finite() {
            return Err(Error::non_finite("rate"));
        }
        Ok(Self::Linear { rate })
    }

    /// Apply the correction to a raw predicted duration in milliseconds
    ///
    /// Non-finite input passes through unmodified so an upstream anomaly
    /// stays visible instead of being silently zeroed.
    pub fn adjust(&self, raw_ms: f64) -> f64 {
        if !raw_ms.is_finite() {
            return raw_ms;
        }
        match *self {
            BiasAdjuster::Exponential { base, sign } => {
                let horizon_minutes = raw_ms / MS_PER_MINUTE;
                let percentage = base.powf(horizon_minutes) - 1.0;
                raw_ms + sign * (percentage / 100.0) * raw_ms
            }
            BiasAdjuster::Linear { rate } => {
                let percentage = (raw_ms / 100.0) * rate;
                raw_ms + (percentage / 100.0) * raw_ms
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_is_a_fixpoint_for_both_variants() {
        let exp = BiasAdjuster::exponential(1.02, 1.0).unwrap();
        let lin = BiasAdjuster::linear(0.5).unwrap();
        assert_relative_eq!(exp.adjust(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(lin.adjust(0.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn exponential_correction_grows_with_horizon() {
        let adjuster = BiasAdjuster::exponential(1.02, 1.0).unwrap();
        let short = adjuster.adjust(60_000.0) - 60_000.0;
        let long = adjuster.adjust(600_000.0) - 600_000.0;
        assert!(short > 0.0);
        assert!(long / 600_000.0 > short / 60_000.0);
    }

    #[test]
    fn negative_sign_shrinks_the_prediction() {
        let adjuster = BiasAdjuster::exponential(1.02, -1.0).unwrap();
        assert!(adjuster.adjust(300_000.0) < 300_000.0);
    }

    #[test]
    fn linear_adjustment_matches_formula() {
        let adjuster = BiasAdjuster::linear(2.0).unwrap();
        let raw = 1_000.0;
        // percentage = (1000 / 100) * 2 = 20; adjusted = 1000 * 1.2
        assert_relative_eq!(adjuster.adjust(raw), 1_200.0, epsilon = 1e-9);
    }

    #[test]
    fn non_finite_input_passes_through() {
        let adjuster = BiasAdjuster::exponential(1.02, 1.0).unwrap();
        assert!(adjuster.adjust(f64::NAN).is_nan());
        assert_eq!(adjuster.adjust(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(BiasAdjuster::exponential(0.9, 1.0).is_err());
        assert!(BiasAdjuster::exponential(1.02, 0.5).is_err());
        assert!(BiasAdjuster::exponential(f64::NAN, 1.0).is_err());
        assert!(BiasAdjuster::linear(f64::INFINITY).is_err());
    }
}
