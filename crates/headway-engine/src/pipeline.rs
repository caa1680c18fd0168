//! The vehicle-event prediction pipeline
//!
//! One pipeline instance serves every vehicle of a deployment. Each
//! admitted position event is resolved into the vehicle's remaining
//! segments, each segment is predicted through the strategy chain,
//! bias-adjusted, and accumulated into a cumulative ETA. Completed
//! traversals flow the opposite direction: through the sample filter into
//! the statistics caches, the dwell regression, and the last-vehicle
//! store.
//!
//! Prediction reads and sample writes are decoupled: predictions are
//! computed from the caches as they stand, and a write from one vehicle
//! never blocks reads for another beyond the touched entry's shard.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use headway_stats::BiasAdjuster;

use crate::cache::SegmentStatsCache;
use crate::config::EngineConfig;
use crate::dwell::DwellModelCache;
use crate::error::Result;
use crate::filter::{RejectReason, SampleFilter};
use crate::predictor::{LastObservation, LastVehicleStore, SegmentPredictor};
use crate::types::{
    DurationKind, PredictionRequest, PredictionTier, SegmentKey, SegmentObservation,
    SegmentPrediction, TripPrediction, TripScope, VehicleEvent,
};

/// Schedule data the pipeline needs from the (external) GTFS collaborator
pub trait ScheduleProvider: Send + Sync {
    /// Scheduled travel duration for a segment, ms
    fn scheduled_travel_ms(&self, trip_id: &str, segment_index: u32) -> Option<f64>;

    /// Scheduled dwell at the stop ending a segment, ms
    fn scheduled_dwell_ms(&self, trip_id: &str, segment_index: u32) -> Option<f64>;

    /// Number of segments in the trip; 0 for an unknown trip
    fn segment_count(&self, trip_id: &str) -> u32;

    /// Trip pattern for shared statistics; `None` keys by trip
    fn pattern_id(&self, _trip_id: &str) -> Option<String> {
        None
    }
}

/// Optional downstream consumer of predictions and accepted samples
///
/// Fire-and-forget: implementations must not block and their failures
/// must stay internal. These methods cannot return errors, so nothing
/// downstream can affect cache correctness.
pub trait PredictionSink: Send + Sync {
    fn publish_prediction(&self, _prediction: &TripPrediction) {}
    fn publish_sample(&self, _observation: &SegmentObservation) {}
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPredictionSink;

impl PredictionSink for NullPredictionSink {}

#[derive(Debug, Clone, Copy)]
struct VehicleProgress {
    last_event_at_ms: i64,
    last_segment_index: u32,
}

/// Entry point invoked once per admitted vehicle-position event
pub struct PredictionPipeline {
    filter: SampleFilter,
    predictor: SegmentPredictor,
    bias: BiasAdjuster,
    stats: Arc<SegmentStatsCache>,
    dwell_models: Arc<DwellModelCache>,
    last_vehicle: Arc<LastVehicleStore>,
    schedule: Arc<dyn ScheduleProvider>,
    sink: Arc<dyn PredictionSink>,
    vehicles: DashMap<String, VehicleProgress>,
}

impl PredictionPipeline {
    /// Wire a pipeline over explicitly provided caches
    ///
    /// The configuration must already be validated (the
    /// [`PredictionEngine`](crate::engine::PredictionEngine) constructor
    /// does this); `new` only re-derives the pure pieces from it.
    pub fn new(
        config: &EngineConfig,
        stats: Arc<SegmentStatsCache>,
        dwell_models: Arc<DwellModelCache>,
        last_vehicle: Arc<LastVehicleStore>,
        schedule: Arc<dyn ScheduleProvider>,
        sink: Arc<dyn PredictionSink>,
    ) -> Result<Self> {
        config.validate()?;
        // validate() has already bounds-checked filter_epsilon
        let kalman = headway_stats::KalmanBlend::new(config.filter_epsilon)
            .map_err(|_| crate::error::ConfigError::FilterEpsilon(config.filter_epsilon))?;
        let predictor = SegmentPredictor::new(
            config.min_samples,
            kalman,
            stats.clone(),
            dwell_models.clone(),
            last_vehicle.clone(),
        );
        Ok(Self {
            filter: SampleFilter::new(config.admission),
            predictor,
            bias: config.bias.build()?,
            stats,
            dwell_models,
            last_vehicle,
            schedule,
            sink,
            vehicles: DashMap::new(),
        })
    }

    /// Handle one matched position event; `None` when the event is stale
    /// for its vehicle or no segment could be predicted
    pub fn on_vehicle_event(&self, event: &VehicleEvent) -> Option<TripPrediction> {
        if self.record_progress(event) {
            debug!(
                vehicle = %event.vehicle_id,
                timestamp = event.timestamp_ms,
                "dropping out-of-order event"
            );
            return None;
        }

        let total_segments = self.schedule.segment_count(&event.trip_id);
        if event.segment_index >= total_segments {
            warn!(
                vehicle = %event.vehicle_id,
                trip = %event.trip_id,
                segment = event.segment_index,
                "matched segment beyond the trip's schedule"
            );
            return None;
        }

        let scope = self.scope_for(&event.trip_id);
        let mut segments = Vec::new();
        let mut eta_ms = 0.0;
        let mut low_confidence = false;

        for index in event.segment_index..total_segments {
            let travel_key = SegmentKey::travel(scope.clone(), index);
            let scheduled = self.schedule.scheduled_travel_ms(&event.trip_id, index);
            if let Some(prediction) =
                self.predict_one(event, travel_key, scheduled, eta_ms, None)
            {
                eta_ms += prediction.adjusted_ms;
                low_confidence |= prediction.low_confidence;
                segments.push(prediction);
            }

            // Dwell applies at every stop except the trip's last
            if index + 1 < total_segments {
                let dwell_key = SegmentKey::dwell(scope.clone(), index);
                let scheduled = self.schedule.scheduled_dwell_ms(&event.trip_id, index);
                let headway = self.expected_headway(&dwell_key, event.timestamp_ms, eta_ms);
                if let Some(prediction) =
                    self.predict_one(event, dwell_key, scheduled, eta_ms, headway)
                {
                    eta_ms += prediction.adjusted_ms;
                    low_confidence |= prediction.low_confidence;
                    segments.push(prediction);
                }
            }
        }

        if segments.is_empty() {
            return None;
        }

        let prediction = TripPrediction {
            vehicle_id: event.vehicle_id.clone(),
            trip_id: event.trip_id.clone(),
            generated_at_ms: event.timestamp_ms,
            segments,
            eta_ms,
            low_confidence,
        };
        self.sink.publish_prediction(&prediction);
        Some(prediction)
    }

    /// Handle one completed traversal from the arrival/departure detector
    ///
    /// Returns the rejection reason when the sample is refused; accepted
    /// samples update the statistics cache, the dwell regression (when a
    /// headway covariate exists), and the last-vehicle store, then go to
    /// the sink.
    pub fn on_traversal_completed(
        &self,
        vehicle_id: &str,
        observation: &SegmentObservation,
    ) -> std::result::Result<(), RejectReason> {
        if let Err(reason) = self.filter.filter(observation) {
            debug!(
                code = reason.code(),
                key = %observation.key,
                duration_ms = observation.duration_ms,
                "sample rejected"
            );
            return Err(reason);
        }

        // Headway to the vehicle ahead, taken before this traversal
        // replaces it in the store
        let headway = self
            .last_vehicle
            .get(&observation.key)
            .filter(|last| last.vehicle_id != vehicle_id)
            .map(|last| (observation.observed_at_ms - last.observed_at_ms) as f64)
            .filter(|gap| *gap > 0.0);

        self.stats.observe(
            &observation.key,
            observation.duration_ms,
            observation.observed_at_ms,
        );
        if observation.key.kind == DurationKind::DwellTime {
            if let Some(headway_ms) = headway {
                self.dwell_models
                    .add_sample(&observation.key, headway_ms, observation.duration_ms);
            }
        }
        self.last_vehicle.record(
            &observation.key,
            LastObservation {
                duration_ms: observation.duration_ms,
                observed_at_ms: observation.observed_at_ms,
                vehicle_id: vehicle_id.to_string(),
            },
        );
        self.sink.publish_sample(observation);
        Ok(())
    }

    /// Number of vehicles the pipeline has seen events for
    pub fn tracked_vehicles(&self) -> usize {
        self.vehicles.len()
    }

    fn predict_one(
        &self,
        event: &VehicleEvent,
        key: SegmentKey,
        scheduled_duration_ms: Option<f64>,
        forecast_horizon_ms: f64,
        headway_ms: Option<f64>,
    ) -> Option<SegmentPrediction> {
        let kind = key.kind;
        let segment_index = key.segment_index;
        let request = PredictionRequest {
            key,
            vehicle_id: event.vehicle_id.clone(),
            last_vehicle_duration_ms: None,
            scheduled_duration_ms,
            forecast_horizon_ms,
            now_ms: event.timestamp_ms,
        };
        let outcome = match kind {
            DurationKind::TravelTime => self.predictor.predict_travel_time(&request),
            DurationKind::DwellTime => self.predictor.predict_dwell_time(&request, headway_ms),
        };
        let Some(outcome) = outcome else {
            warn!(
                key = %request.key,
                trip = %event.trip_id,
                "no tier could produce a value and the segment has no schedule entry"
            );
            return None;
        };
        Some(SegmentPrediction {
            segment_index,
            kind,
            raw_ms: outcome.value_ms,
            adjusted_ms: self.bias.adjust(outcome.value_ms),
            tier: outcome.tier,
            low_confidence: outcome.tier == PredictionTier::Scheduled,
        })
    }

    /// Update per-vehicle progress; true when the event is out of order
    fn record_progress(&self, event: &VehicleEvent) -> bool {
        let mut progress = self
            .vehicles
            .entry(event.vehicle_id.clone())
            .or_insert(VehicleProgress {
                last_event_at_ms: i64::MIN,
                last_segment_index: 0,
            });
        if event.timestamp_ms < progress.last_event_at_ms {
            return true;
        }
        if event.segment_index < progress.last_segment_index {
            // The spatial matcher regressed; treat as a fresh observation
            debug!(
                vehicle = %event.vehicle_id,
                from = progress.last_segment_index,
                to = event.segment_index,
                "segment index regressed"
            );
        }
        progress.last_event_at_ms = event.timestamp_ms;
        progress.last_segment_index = event.segment_index;
        false
    }

    /// Expected gap to the vehicle ahead when this vehicle reaches the
    /// stop, derived from the last-vehicle store
    fn expected_headway(&self, dwell_key: &SegmentKey, now_ms: i64, eta_so_far_ms: f64) -> Option<f64> {
        let last = self.last_vehicle.get(dwell_key)?;
        let arrival_ms = now_ms as f64 + eta_so_far_ms;
        let gap = arrival_ms - last.observed_at_ms as f64;
        (gap > 0.0).then_some(gap)
    }

    fn scope_for(&self, trip_id: &str) -> TripScope {
        match self.schedule.pattern_id(trip_id) {
            Some(pattern) => TripScope::Pattern(pattern.into()),
            None => TripScope::Trip(trip_id.into()),
        }
    }
}
