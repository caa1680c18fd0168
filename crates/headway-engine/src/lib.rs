//! Concurrent real-time arrival/departure prediction for transit segments
//!
//! This crate turns live vehicle-position events, already matched to a
//! route segment by an external collaborator, into per-stop arrival and
//! departure predictions. The numeric estimators live in `headway-stats`;
//! this crate owns the shared state and the orchestration:
//!
//! - [`SegmentStatsCache`]: per-segment running statistics behind sharded
//!   per-key locks, deployable unbucketed, time-of-day bucketed, or
//!   TTL-evicting
//! - [`SampleFilter`]: admission control for observed travel/dwell times
//! - [`DwellModelCache`]: per-segment headway-to-dwell regressions
//! - [`SegmentPredictor`]: the ordered strategy chain with tier
//!   attribution
//! - [`PredictionPipeline`]: the per-event entry point wiring it all to
//!   the schedule provider and an optional downstream sink
//! - [`PredictionEngine`]: the explicitly constructed context holding the
//!   shared caches (no globals)
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use headway_engine::{
//!     EngineConfig, NullPredictionSink, PredictionEngine, ScheduleProvider, VehicleEvent,
//! };
//!
//! struct FlatSchedule;
//!
//! impl ScheduleProvider for FlatSchedule {
//!     fn scheduled_travel_ms(&self, _trip: &str, _segment: u32) -> Option<f64> {
//!         Some(120_000.0)
//!     }
//!     fn scheduled_dwell_ms(&self, _trip: &str, _segment: u32) -> Option<f64> {
//!         Some(15_000.0)
//!     }
//!     fn segment_count(&self, _trip: &str) -> u32 {
//!         4
//!     }
//! }
//!
//! let engine = PredictionEngine::new(EngineConfig::default()).unwrap();
//! let pipeline = engine
//!     .pipeline(Arc::new(FlatSchedule), Arc::new(NullPredictionSink))
//!     .unwrap();
//!
//! let prediction = pipeline
//!     .on_vehicle_event(&VehicleEvent {
//!         vehicle_id: "bus-12".into(),
//!         trip_id: "trip-7".into(),
//!         timestamp_ms: 1_700_000_000_000,
//!         segment_index: 1,
//!     })
//!     .unwrap();
//!
//! // No history yet: every value fell through to the schedule.
//! assert!(prediction.low_confidence);
//! assert!(prediction.eta_ms > 0.0);
//! ```

pub mod cache;
pub mod config;
pub mod dwell;
pub mod engine;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod predictor;
pub mod types;

pub use cache::{CachePolicy, SegmentStatsCache};
pub use config::{AdmissionConfig, BiasConfig, CacheMode, DurationBounds, EngineConfig};
pub use dwell::DwellModelCache;
pub use engine::PredictionEngine;
pub use error::{ConfigError, Result};
pub use filter::{Endpoint, RejectReason, SampleFilter};
pub use pipeline::{NullPredictionSink, PredictionPipeline, PredictionSink, ScheduleProvider};
pub use predictor::{LastObservation, LastVehicleStore, PredictorOutcome, SegmentPredictor};
pub use types::{
    DurationKind, PredictionRequest, PredictionTier, SegmentKey, SegmentObservation,
    SegmentPrediction, StatSnapshot, TripPrediction, TripScope, VehicleEvent,
};
