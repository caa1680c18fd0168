//! Numeric estimation primitives for real-time transit prediction
//!
//! This crate holds the pure numeric building blocks the prediction
//! engine composes per route segment. Nothing here owns shared state or
//! does I/O; every type is a plain value the caller synchronizes.
//!
//! # Components
//!
//! - [`RunningStat`]: Welford streaming mean/variance, the value type of
//!   the per-segment statistics caches
//! - [`KalmanBlend`]: variance-weighted blend of the preceding vehicle's
//!   observation with the segment's historical distribution
//! - [`RlsRegression`]: recursive least squares with a forgetting
//!   factor, used for dwell-time-from-headway modeling
//! - [`BiasAdjuster`]: horizon-dependent percentage correction applied
//!   to raw predictions
//!
//! # Example
//!
//! ```rust
//! use headway_stats::{KalmanBlend, RunningStat};
//!
//! let mut history = RunningStat::new();
//! for observed in [380.0, 420.0, 400.0] {
//!     history.observe(observed);
//! }
//! assert_eq!(history.count(), 3);
//!
//! // Refine the last vehicle's 450 ms traversal with the history.
//! let blend = KalmanBlend::new(1e-3).unwrap();
//! let prior_error = blend.initial_error(history.variance().unwrap());
//! let outcome = blend.blend(450.0, history.mean(), history.variance().unwrap(), prior_error);
//! assert!(outcome.estimate > history.mean());
//! assert!(outcome.estimate < 450.0);
//! ```

pub mod bias;
pub mod error;
pub mod kalman;
pub mod regression;
pub mod running;

pub use bias::BiasAdjuster;
pub use error::{Error, Result};
pub use kalman::{BlendOutcome, KalmanBlend};
pub use regression::RlsRegression;
pub use running::RunningStat;
