//! The per-process prediction context
//!
//! All shared mutable state (the statistics cache, the dwell regression
//! models, the last-vehicle store) is constructed here once and handed
//! to predictors and pipelines explicitly. There are no globals; tests
//! get a fresh, isolated context per instance.

use std::sync::Arc;

use headway_stats::KalmanBlend;

use crate::cache::SegmentStatsCache;
use crate::config::EngineConfig;
use crate::dwell::DwellModelCache;
use crate::error::{ConfigError, Result};
use crate::pipeline::{PredictionPipeline, PredictionSink, ScheduleProvider};
use crate::predictor::{LastVehicleStore, SegmentPredictor};

/// Explicitly constructed prediction state for one deployment
pub struct PredictionEngine {
    config: EngineConfig,
    stats: Arc<SegmentStatsCache>,
    dwell_models: Arc<DwellModelCache>,
    last_vehicle: Arc<LastVehicleStore>,
}

impl PredictionEngine {
    /// Validate the configuration and build the shared caches
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let stats = Arc::new(SegmentStatsCache::new(config.cache_policy()));
        let dwell_models = Arc::new(
            DwellModelCache::new(config.regression_lambda)
                .map_err(|_| ConfigError::RegressionLambda(config.regression_lambda))?,
        );
        Ok(Self {
            config,
            stats,
            dwell_models,
            last_vehicle: Arc::new(LastVehicleStore::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared statistics cache, also exposed for diagnostic tooling
    pub fn stats_cache(&self) -> &Arc<SegmentStatsCache> {
        &self.stats
    }

    pub fn dwell_models(&self) -> &Arc<DwellModelCache> {
        &self.dwell_models
    }

    pub fn last_vehicle(&self) -> &Arc<LastVehicleStore> {
        &self.last_vehicle
    }

    /// A predictor over this engine's caches
    pub fn predictor(&self) -> Result<SegmentPredictor> {
        let kalman = KalmanBlend::new(self.config.filter_epsilon)
            .map_err(|_| ConfigError::FilterEpsilon(self.config.filter_epsilon))?;
        Ok(SegmentPredictor::new(
            self.config.min_samples,
            kalman,
            self.stats.clone(),
            self.dwell_models.clone(),
            self.last_vehicle.clone(),
        ))
    }

    /// A pipeline over this engine's caches and the given collaborators
    pub fn pipeline(
        &self,
        schedule: Arc<dyn ScheduleProvider>,
        sink: Arc<dyn PredictionSink>,
    ) -> Result<PredictionPipeline> {
        PredictionPipeline::new(
            &self.config,
            self.stats.clone(),
            self.dwell_models.clone(),
            self.last_vehicle.clone(),
            schedule,
            sink,
        )
    }

    /// Sweep idle entries; intended to be called from a periodic
    /// background task owned by the host
    pub fn evict_idle(&self, now_ms: i64) -> usize {
        self.stats.evict_idle(now_ms)
    }

    /// Drop all accumulated state (configuration reload)
    pub fn clear(&self) {
        self.stats.clear();
        self.dwell_models.clear();
        self.last_vehicle.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn default_engine_constructs_empty() {
        let engine = PredictionEngine::new(EngineConfig::default()).unwrap();
        assert!(engine.stats_cache().is_empty());
        assert!(engine.dwell_models().is_empty());
        assert!(engine.last_vehicle().is_empty());
    }

    #[test]
    fn invalid_config_fails_fast() {
        let config = EngineConfig {
            filter_epsilon: -1.0,
            ..Default::default()
        };
        assert!(PredictionEngine::new(config).is_err());
    }

    #[test]
    fn clear_resets_all_state() {
        let engine = PredictionEngine::new(EngineConfig::default()).unwrap();
        let key = crate::types::SegmentKey::travel(crate::types::TripScope::Trip("t".into()), 0);
        engine.stats_cache().observe(&key, 400.0, 0);
        engine.clear();
        assert!(engine.stats_cache().is_empty());
    }
}
