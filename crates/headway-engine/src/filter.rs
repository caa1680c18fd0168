//! Sample admission filtering
//!
//! Decides whether an observed travel/dwell duration is trustworthy
//! enough to update the statistics caches. Rejections are reported as
//! structured reason codes, never raised; the caller decides whether and
//! how to log them. Filtering has no side effects.

use std::fmt;

use crate::config::AdmissionConfig;
use crate::types::SegmentObservation;

/// Which end of the traversal an adherence check failed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    End,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => write!(f, "start"),
            Endpoint::End => write!(f, "end"),
        }
    }
}

/// Why a sample was refused admission
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// Duration is NaN or infinite
    NonFiniteDuration,
    /// Duration is zero or negative
    NonPositiveDuration,
    /// Duration is shorter than the configured minimum for its kind
    DurationBelowMinimum { min_ms: f64 },
    /// Duration is longer than the configured maximum for its kind
    DurationAboveMaximum { max_ms: f64 },
    /// Schedule adherence at an endpoint falls outside the window
    AdherenceOutOfWindow {
        endpoint: Endpoint,
        adherence_ms: f64,
    },
}

impl RejectReason {
    /// Stable reason code for observability counters
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NonFiniteDuration => "non-finite-duration",
            RejectReason::NonPositiveDuration => "non-positive-duration",
            RejectReason::DurationBelowMinimum { .. } => "duration-below-minimum",
            RejectReason::DurationAboveMaximum { .. } => "duration-above-maximum",
            RejectReason::AdherenceOutOfWindow { .. } => "adherence-out-of-window",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NonFiniteDuration => write!(f, "duration is not finite"),
            RejectReason::NonPositiveDuration => write!(f, "duration is not positive"),
            RejectReason::DurationBelowMinimum { min_ms } => {
                write!(f, "duration below minimum {min_ms} ms")
            }
            RejectReason::DurationAboveMaximum { max_ms } => {
                write!(f, "duration above maximum {max_ms} ms")
            }
            RejectReason::AdherenceOutOfWindow {
                endpoint,
                adherence_ms,
            } => {
                write!(f, "adherence {adherence_ms} ms at {endpoint} outside window")
            }
        }
    }
}

/// Admission filter for completed segment traversals
#[derive(Debug, Clone)]
pub struct SampleFilter {
    admission: AdmissionConfig,
}

impl SampleFilter {
    pub fn new(admission: AdmissionConfig) -> Self {
        Self { admission }
    }

    /// Accept or reject one observation
    ///
    /// Missing adherence at an endpoint is unconstrained, not a
    /// rejection; a missing (non-finite) or non-positive duration always
    /// rejects.
    pub fn filter(&self, observation: &SegmentObservation) -> Result<(), RejectReason> {
        let duration = observation.duration_ms;
        if !duration.is_finite() {
            return Err(RejectReason::NonFiniteDuration);
        }
        if duration <= 0.0 {
            return Err(RejectReason::NonPositiveDuration);
        }

        let bounds = self.admission.bounds_for(observation.key.kind);
        if duration < bounds.min_ms {
            return Err(RejectReason::DurationBelowMinimum {
                min_ms: bounds.min_ms,
            });
        }
        if duration > bounds.max_ms {
            return Err(RejectReason::DurationAboveMaximum {
                max_ms: bounds.max_ms,
            });
        }

        let checks = [
            (Endpoint::Start, observation.adherence_at_start_ms),
            (Endpoint::End, observation.adherence_at_end_ms),
        ];
        for (endpoint, adherence) in checks {
            if let Some(adherence_ms) = adherence {
                if adherence_ms < self.admission.min_adherence_ms
                    || adherence_ms > self.admission.max_adherence_ms
                {
                    return Err(RejectReason::AdherenceOutOfWindow {
                        endpoint,
                        adherence_ms,
                    });
                }
            }
        }

        Ok(())
    }
}
