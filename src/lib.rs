//! Real-time arrival/departure prediction for scheduled transit service
//!
//! This crate re-exports the two workspace members:
//!
//! - [`stats`]: pure numeric estimation primitives, namely the Welford
//!   running statistic, the recursive-least-squares dwell regression,
//!   the scalar Kalman blend, and the bias adjusters.
//! - [`engine`]: the concurrent prediction engine, namely the segment
//!   statistics caches, the sample-admission filter, the tiered segment
//!   predictor, and the vehicle-event pipeline.
//!
//! Most applications depend on `headway-engine` directly; this facade
//! exists for convenience and for the doctests that exercise both layers
//! together.
//!
//! ```rust
//! use headway::engine::{EngineConfig, PredictionEngine};
//!
//! let engine = PredictionEngine::new(EngineConfig::default()).unwrap();
//! assert!(engine.stats_cache().is_empty());
//! ```

pub use headway_engine as engine;
pub use headway_stats as stats;
