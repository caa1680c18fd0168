//! Error types for the prediction engine
//!
//! In the steady state nothing here surfaces as an error: a tier that
//! cannot produce a value is an ordinary `None`, a rejected sample is a
//! [`RejectReason`](crate::filter::RejectReason), and numeric anomalies
//! are logged and recovered by falling through to the next tier. The only
//! hard error is a malformed configuration, which fails fast at
//! construction and is never recoverable at request time.

use thiserror::Error;

/// Configuration validation failure
#[derive(Error, Debug)]
pub enum ConfigError {
    /// TTL eviction requires a positive idle period
    #[error("ttl_secs must be positive")]
    NonPositiveTtl,

    /// Time bucketing requires a positive bucket width
    #[error("bucket_size_secs must be positive")]
    NonPositiveBucketSize,

    /// The Kalman filter-error floor must be a positive finite number
    #[error("filter_epsilon = {0} must be positive and finite")]
    FilterEpsilon(f64),

    /// The regression forgetting factor must lie in (0, 1]
    #[error("regression_lambda = {0} must be in (0, 1]")]
    RegressionLambda(f64),

    /// The bias adjuster parameters are out of range
    #[error("bias adjuster: {0}")]
    Bias(String),

    /// The schedule-adherence admission window is inverted or non-finite
    #[error("adherence window [{min_ms}, {max_ms}] is inverted or non-finite")]
    AdherenceWindow { min_ms: f64, max_ms: f64 },

    /// A duration admission bound is inverted or non-finite
    #[error("{kind} duration bounds [{min_ms}, {max_ms}] are inverted or non-finite")]
    DurationBounds {
        kind: &'static str,
        min_ms: f64,
        max_ms: f64,
    },
}

/// Result type alias for construction-time operations
pub type Result<T> = std::result::Result<T, ConfigError>;
