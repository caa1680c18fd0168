//! Core types: segment keys, observations, and predictions

use std::fmt;
use std::sync::Arc;

/// Milliseconds in one UTC day
pub(crate) const MS_PER_DAY: i64 = 86_400_000;

/// How a segment's statistics are scoped across trips
///
/// Schedule-based service keys by trip; frequency-based service keys by
/// trip pattern so recurring trips share one statistics population.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TripScope {
    /// Statistics shared across all trips of a pattern
    Pattern(Arc<str>),
    /// Statistics private to a single trip
    Trip(Arc<str>),
}

impl TripScope {
    /// The underlying pattern or trip identifier
    pub fn id(&self) -> &str {
        match self {
            TripScope::Pattern(id) | TripScope::Trip(id) => id,
        }
    }
}

impl fmt::Display for TripScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripScope::Pattern(id) => write!(f, "pattern:{id}"),
            TripScope::Trip(id) => write!(f, "trip:{id}"),
        }
    }
}

/// Which duration a statistic describes
///
/// Travel-time and dwell-time statistics are independent populations and
/// are never mixed, even for the same physical segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationKind {
    /// Time to traverse a segment between two consecutive stops
    TravelTime,
    /// Time spent stationary at the stop ending a segment
    DwellTime,
}

impl fmt::Display for DurationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationKind::TravelTime => write!(f, "travel"),
            DurationKind::DwellTime => write!(f, "dwell"),
        }
    }
}

/// The unit of prediction and the sole cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub scope: TripScope,
    pub segment_index: u32,
    pub kind: DurationKind,
    /// Time-of-day bucket, present only under the time-bucketed cache
    /// policy
    pub time_bucket: Option<u32>,
}

impl SegmentKey {
    /// Travel-time key for a segment, without a time bucket
    pub fn travel(scope: TripScope, segment_index: u32) -> Self {
        Self {
            scope,
            segment_index,
            kind: DurationKind::TravelTime,
            time_bucket: None,
        }
    }

    /// Dwell-time key for a segment, without a time bucket
    pub fn dwell(scope: TripScope, segment_index: u32) -> Self {
        Self {
            scope,
            segment_index,
            kind: DurationKind::DwellTime,
            time_bucket: None,
        }
    }

    /// The same key pinned to a time-of-day bucket
    pub fn with_bucket(mut self, bucket: u32) -> Self {
        self.time_bucket = Some(bucket);
        self
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scope, self.segment_index, self.kind)?;
        if let Some(bucket) = self.time_bucket {
            write!(f, "@{bucket}")?;
        }
        Ok(())
    }
}

/// One completed segment traversal, emitted by the external
/// arrival/departure detector and consumed once by the sample filter
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentObservation {
    pub key: SegmentKey,
    /// Observed travel or dwell duration in milliseconds
    pub duration_ms: f64,
    /// Schedule adherence at the segment start, if known (signed ms,
    /// positive = late)
    pub adherence_at_start_ms: Option<f64>,
    /// Schedule adherence at the segment end, if known
    pub adherence_at_end_ms: Option<f64>,
    /// Unix timestamp of the completing arrival/departure, ms
    pub observed_at_ms: i64,
}

/// One prediction request, produced per pipeline invocation and consumed
/// synchronously
#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub key: SegmentKey,
    pub vehicle_id: String,
    /// Caller-supplied preceding-vehicle duration; when absent the
    /// predictor consults its own last-vehicle store
    pub last_vehicle_duration_ms: Option<f64>,
    /// GTFS-scheduled duration for the segment, the final fallback
    pub scheduled_duration_ms: Option<f64>,
    /// How far into the future this prediction reaches, ms
    pub forecast_horizon_ms: f64,
    /// Unix timestamp of the request, ms
    pub now_ms: i64,
}

/// Which estimator produced a predicted value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionTier {
    /// Fitted headway regression (dwell time only)
    Regression,
    /// Historical mean with enough samples behind it
    HistoricalAverage,
    /// Last-vehicle observation refined by the historical distribution
    KalmanBlend,
    /// Preceding vehicle's observation taken directly
    LastVehicle,
    /// GTFS-scheduled duration, the final fallback
    Scheduled,
}

impl fmt::Display for PredictionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PredictionTier::Regression => "regression",
            PredictionTier::HistoricalAverage => "historical-average",
            PredictionTier::KalmanBlend => "kalman-blend",
            PredictionTier::LastVehicle => "last-vehicle",
            PredictionTier::Scheduled => "scheduled",
        };
        write!(f, "{name}")
    }
}

/// Copy of one cache entry's state, taken atomically under the entry's
/// shard lock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatSnapshot {
    pub count: u64,
    pub mean: f64,
    /// Sample variance, present once two observations exist
    pub variance: Option<f64>,
    /// Kalman filter error carried from the previous blend on this key
    pub filter_error: Option<f64>,
    pub last_observed_at_ms: i64,
}

/// A single segment's predicted duration with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPrediction {
    pub segment_index: u32,
    pub kind: DurationKind,
    pub raw_ms: f64,
    pub adjusted_ms: f64,
    pub tier: PredictionTier,
    /// True when only the schedule was left to answer
    pub low_confidence: bool,
}

/// Cumulative prediction for a vehicle's remaining trip
#[derive(Debug, Clone, PartialEq)]
pub struct TripPrediction {
    pub vehicle_id: String,
    pub trip_id: String,
    pub generated_at_ms: i64,
    pub segments: Vec<SegmentPrediction>,
    /// Bias-adjusted time to the final stop, ms from `generated_at_ms`
    pub eta_ms: f64,
    pub low_confidence: bool,
}

/// A vehicle-position event already matched to a route segment by the
/// external spatial-match collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleEvent {
    pub vehicle_id: String,
    pub trip_id: String,
    /// Unix timestamp of the position report, ms
    pub timestamp_ms: i64,
    /// Segment the vehicle currently occupies
    pub segment_index: u32,
}

/// Whether two timestamps fall on the same UTC day
pub(crate) fn same_utc_day(a_ms: i64, b_ms: i64) -> bool {
    a_ms.div_euclid(MS_PER_DAY) == b_ms.div_euclid(MS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_and_dwell_keys_are_distinct() {
        let scope = TripScope::Trip("t1".into());
        let travel = SegmentKey::travel(scope.clone(), 3);
        let dwell = SegmentKey::dwell(scope, 3);
        assert_ne!(travel, dwell);
    }

    #[test]
    fn bucketed_keys_are_distinct_from_unbucketed() {
        let key = SegmentKey::travel(TripScope::Pattern("p7".into()), 0);
        assert_ne!(key.clone(), key.with_bucket(12));
    }

    #[test]
    fn key_display_is_compact() {
        let key = SegmentKey::dwell(TripScope::Trip("t9".into()), 4).with_bucket(21);
        assert_eq!(key.to_string(), "trip:t9/4/dwell@21");
    }

    #[test]
    fn same_day_boundary() {
        assert!(same_utc_day(0, MS_PER_DAY - 1));
        assert!(!same_utc_day(MS_PER_DAY - 1, MS_PER_DAY));
        assert!(same_utc_day(-1, -MS_PER_DAY));
    }
}
