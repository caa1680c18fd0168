//! Tiered segment prediction
//!
//! The predictor walks an ordered chain of estimation strategies and
//! stops at the first one that can answer:
//!
//! 1. fitted headway regression (dwell time only)
//! 2. historical average, once enough samples back it
//! 3. Kalman blend of the preceding vehicle's observation with history
//! 4. the preceding vehicle's observation taken directly
//! 5. the GTFS-scheduled duration supplied by the caller
//!
//! Every answer carries the tier that produced it, so callers and tests
//! can attribute the value. A tier that computes a negative or non-finite
//! value is logged and skipped, never returned.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use headway_stats::KalmanBlend;

use crate::cache::SegmentStatsCache;
use crate::dwell::DwellModelCache;
use crate::types::{
    same_utc_day, DurationKind, PredictionRequest, PredictionTier, SegmentKey,
};

/// The most recent completed traversal of a segment, kept so the next
/// vehicle can borrow it
#[derive(Debug, Clone, PartialEq)]
pub struct LastObservation {
    pub duration_ms: f64,
    pub observed_at_ms: i64,
    pub vehicle_id: String,
}

/// Per-segment store of the preceding vehicle's observation
#[derive(Default)]
pub struct LastVehicleStore {
    entries: DashMap<SegmentKey, LastObservation>,
}

impl LastVehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed traversal, replacing the previous holder
    pub fn record(&self, key: &SegmentKey, observation: LastObservation) {
        self.entries.insert(key.clone(), observation);
    }

    /// The most recent traversal of `key`, if any vehicle completed one
    pub fn get(&self, key: &SegmentKey) -> Option<LastObservation> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// A predicted duration and the tier that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorOutcome {
    pub value_ms: f64,
    pub tier: PredictionTier,
}

/// Strategy-chain predictor over the shared caches
///
/// Holds no per-request state; the Kalman filter error lives on the
/// segment's cache entry and is chained between successive predictions
/// automatically.
pub struct SegmentPredictor {
    min_samples: u64,
    kalman: KalmanBlend,
    stats: Arc<SegmentStatsCache>,
    dwell_models: Arc<DwellModelCache>,
    last_vehicle: Arc<LastVehicleStore>,
}

impl SegmentPredictor {
    pub fn new(
        min_samples: u64,
        kalman: KalmanBlend,
        stats: Arc<SegmentStatsCache>,
        dwell_models: Arc<DwellModelCache>,
        last_vehicle: Arc<LastVehicleStore>,
    ) -> Self {
        Self {
            min_samples,
            kalman,
            stats,
            dwell_models,
            last_vehicle,
        }
    }

    /// Predict the travel time for a segment
    ///
    /// `None` only when every tier, including the schedule, is exhausted;
    /// with a scheduled duration present an answer is guaranteed.
    pub fn predict_travel_time(&self, request: &PredictionRequest) -> Option<PredictorOutcome> {
        self.predict(request, None)
    }

    /// Predict the dwell time for a segment, clamped to be non-negative
    ///
    /// `headway_ms` is the expected gap to the vehicle ahead; when present
    /// and a fitted regression exists for the segment it answers first.
    pub fn predict_dwell_time(
        &self,
        request: &PredictionRequest,
        headway_ms: Option<f64>,
    ) -> Option<PredictorOutcome> {
        self.predict(request, headway_ms).map(|outcome| PredictorOutcome {
            value_ms: outcome.value_ms.max(0.0),
            ..outcome
        })
    }

    fn predict(
        &self,
        request: &PredictionRequest,
        headway_ms: Option<f64>,
    ) -> Option<PredictorOutcome> {
        if request.key.kind == DurationKind::DwellTime {
            if let Some(headway) = headway_ms {
                if let Some(dwell) = self.dwell_models.predict(&request.key, headway) {
                    if let Some(outcome) = admit(dwell, PredictionTier::Regression, &request.key) {
                        return Some(outcome);
                    }
                }
            }
        }

        let snapshot = self.stats.get(&request.key, request.now_ms);

        if let Some(stats) = &snapshot {
            if stats.count >= self.min_samples {
                if let Some(outcome) =
                    admit(stats.mean, PredictionTier::HistoricalAverage, &request.key)
                {
                    return Some(outcome);
                }
            }
        }

        let last = self.last_observation(request);

        if let (Some(stats), Some(last)) = (&snapshot, &last) {
            // Variance needs two observations; the last-vehicle value
            // must come from the same service day to be blendable
            if let Some(variance) = stats.variance {
                if same_utc_day(last.observed_at_ms, request.now_ms) {
                    let prior_error = stats
                        .filter_error
                        .unwrap_or_else(|| self.kalman.initial_error(variance));
                    let blended =
                        self.kalman
                            .blend(last.duration_ms, stats.mean, variance, prior_error);
                    self.stats
                        .set_filter_error(&request.key, blended.next_error, request.now_ms);
                    if let Some(outcome) =
                        admit(blended.estimate, PredictionTier::KalmanBlend, &request.key)
                    {
                        return Some(outcome);
                    }
                }
            }
        }

        if let Some(last) = &last {
            if let Some(outcome) =
                admit(last.duration_ms, PredictionTier::LastVehicle, &request.key)
            {
                return Some(outcome);
            }
        }

        let scheduled = request.scheduled_duration_ms?;
        admit(scheduled, PredictionTier::Scheduled, &request.key)
    }

    /// The preceding vehicle's observation for the requested segment
    ///
    /// A caller-supplied duration wins; otherwise the store answers,
    /// excluding the requesting vehicle's own traversal.
    fn last_observation(&self, request: &PredictionRequest) -> Option<LastObservation> {
        if let Some(duration_ms) = request.last_vehicle_duration_ms {
            return Some(LastObservation {
                duration_ms,
                observed_at_ms: request.now_ms,
                vehicle_id: String::new(),
            });
        }
        self.last_vehicle
            .get(&request.key)
            .filter(|last| last.vehicle_id != request.vehicle_id)
    }
}

/// Admit a tier's value, or log and signal fallthrough
fn admit(value_ms: f64, tier: PredictionTier, key: &SegmentKey) -> Option<PredictorOutcome> {
    if value_ms.is_finite() && value_ms >= 0.0 {
        Some(PredictorOutcome { value_ms, tier })
    } else {
        warn!(%tier, %key, value_ms, "tier produced an inadmissible value, falling through");
        None
    }
}
