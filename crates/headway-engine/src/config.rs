//! Engine configuration
//!
//! Every option has a default so the engine runs with no configuration at
//! all. Validation happens once, at construction, and fails fast; nothing
//! re-checks configuration at request time.

use serde::Deserialize;

use headway_stats::BiasAdjuster;

use crate::cache::CachePolicy;
use crate::error::{ConfigError, Result};
use crate::types::DurationKind;

const MS_PER_MINUTE: f64 = 60_000.0;

/// Which statistics-cache policy the engine deploys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// One statistic per segment key; schedule-based service
    Unbucketed,
    /// Statistics grouped by time-of-day bucket; frequency-based service
    TimeBucketed,
    /// Entries invalidated after an idle period; volatile signals such as
    /// canceled-trip flags
    TtlEvicting,
}

/// Admission bounds for one duration kind
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DurationBounds {
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Sample-admission configuration
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Most-early schedule adherence accepted at either endpoint (signed
    /// ms, negative = early)
    pub min_adherence_ms: f64,
    /// Most-late schedule adherence accepted at either endpoint
    pub max_adherence_ms: f64,
    pub travel: DurationBounds,
    pub dwell: DurationBounds,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_adherence_ms: -10.0 * MS_PER_MINUTE,
            max_adherence_ms: 10.0 * MS_PER_MINUTE,
            travel: DurationBounds {
                min_ms: 100.0,
                max_ms: 20.0 * MS_PER_MINUTE,
            },
            dwell: DurationBounds {
                min_ms: 0.0,
                max_ms: 2.0 * MS_PER_MINUTE,
            },
        }
    }
}

impl AdmissionConfig {
    /// The duration bounds that apply to the given kind
    pub fn bounds_for(&self, kind: DurationKind) -> DurationBounds {
        match kind {
            DurationKind::TravelTime => self.travel,
            DurationKind::DwellTime => self.dwell,
        }
    }
}

/// Bias-adjuster selection
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BiasConfig {
    Exponential { base: f64, sign: f64 },
    Linear { rate: f64 },
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self::Exponential {
            base: 1.01,
            sign: 1.0,
        }
    }
}

impl BiasConfig {
    /// Build the adjuster, mapping parameter errors into `ConfigError`
    pub fn build(&self) -> Result<BiasAdjuster> {
        let built = match *self {
            BiasConfig::Exponential { base, sign } => BiasAdjuster::exponential(base, sign),
            BiasConfig::Linear { rate } => BiasAdjuster::linear(rate),
        };
        built.map_err(|e| ConfigError::Bias(e.to_string()))
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Statistics-cache policy for this deployment
    pub cache_mode: CacheMode,
    /// Observations required before the historical mean is trusted
    pub min_samples: u64,
    /// Idle period after which TTL-policy entries are invalidated
    pub ttl_secs: u64,
    /// Time-of-day bucket width for the bucketed policy
    pub bucket_size_secs: u32,
    /// Lower bound on the Kalman filter error
    pub filter_epsilon: f64,
    /// Forgetting factor for the dwell regression
    pub regression_lambda: f64,
    pub bias: BiasConfig,
    pub admission: AdmissionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::Unbucketed,
            min_samples: 1,
            ttl_secs: 60,
            bucket_size_secs: 1800,
            filter_epsilon: 1.0,
            regression_lambda: 0.9,
            bias: BiasConfig::default(),
            admission: AdmissionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate every option; called once at engine construction
    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::NonPositiveTtl);
        }
        if self.bucket_size_secs == 0 {
            return Err(ConfigError::NonPositiveBucketSize);
        }
        if !self.filter_epsilon.is_finite() || self.filter_epsilon <= 0.0 {
            return Err(ConfigError::FilterEpsilon(self.filter_epsilon));
        }
        if !self.regression_lambda.is_finite()
            || self.regression_lambda <= 0.0
            || self.regression_lambda > 1.0
        {
            return Err(ConfigError::RegressionLambda(self.regression_lambda));
        }
        self.bias.build()?;

        let adm = &self.admission;
        if !adm.min_adherence_ms.is_finite()
            || !adm.max_adherence_ms.is_finite()
            || adm.min_adherence_ms > adm.max_adherence_ms
        {
            return Err(ConfigError::AdherenceWindow {
                min_ms: adm.min_adherence_ms,
                max_ms: adm.max_adherence_ms,
            });
        }
        for (kind, bounds) in [("travel", adm.travel), ("dwell", adm.dwell)] {
            if !bounds.min_ms.is_finite()
                || !bounds.max_ms.is_finite()
                || bounds.min_ms > bounds.max_ms
                || bounds.max_ms <= 0.0
            {
                return Err(ConfigError::DurationBounds {
                    kind,
                    min_ms: bounds.min_ms,
                    max_ms: bounds.max_ms,
                });
            }
        }
        Ok(())
    }

    /// The cache policy this configuration selects
    pub fn cache_policy(&self) -> CachePolicy {
        match self.cache_mode {
            CacheMode::Unbucketed => CachePolicy::Unbucketed,
            CacheMode::TimeBucketed => CachePolicy::TimeBucketed {
                bucket_size_secs: self.bucket_size_secs,
            },
            CacheMode::TtlEvicting => CachePolicy::TtlEvicting {
                ttl_secs: self.ttl_secs,
            },
        }
    }
}
