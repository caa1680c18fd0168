//! Per-segment dwell regression models
//!
//! Each dwell segment gets its own [`RlsRegression`] mapping headway to
//! dwell time, created lazily on the first accepted sample. Models live
//! in the same sharded-map discipline as the statistics cache: mutation
//! happens under the entry's shard guard, different segments never
//! contend.

use dashmap::DashMap;

use headway_stats::RlsRegression;

use crate::types::SegmentKey;

/// Concurrent cache of per-segment dwell regressions
pub struct DwellModelCache {
    prototype: RlsRegression,
    models: DashMap<SegmentKey, RlsRegression>,
}

impl DwellModelCache {
    /// Create the cache; `lambda` is validated by `EngineConfig`
    pub fn new(lambda: f64) -> Result<Self, headway_stats::Error> {
        Ok(Self {
            prototype: RlsRegression::new(lambda)?,
            models: DashMap::new(),
        })
    }

    /// Feed one (headway, dwell) pair into the model for `key`
    pub fn add_sample(&self, key: &SegmentKey, headway_ms: f64, dwell_ms: f64) {
        self.models
            .entry(key.clone())
            .or_insert_with(|| self.prototype.clone())
            .add_sample(headway_ms, dwell_ms);
    }

    /// Predicted dwell for the given headway, absent until the model for
    /// `key` is fitted
    pub fn predict(&self, key: &SegmentKey, headway_ms: f64) -> Option<f64> {
        self.models.get(key)?.predict(headway_ms)
    }

    /// Whether the model for `key` can answer predictions
    pub fn is_fitted(&self, key: &SegmentKey) -> bool {
        self.models.get(key).is_some_and(|m| m.is_fitted())
    }

    /// Number of segments with at least one sample
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Drop every model (configuration reload)
    pub fn clear(&self) {
        self.models.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SegmentKey, TripScope};
    use approx::assert_relative_eq;

    fn dwell_key(index: u32) -> SegmentKey {
        SegmentKey::dwell(TripScope::Trip("t1".into()), index)
    }

    #[test]
    fn predict_is_absent_until_fitted() {
        let cache = DwellModelCache::new(1.0).unwrap();
        let key = dwell_key(0);
        assert!(cache.predict(&key, 600_000.0).is_none());
        cache.add_sample(&key, 600_000.0, 20_000.0);
        assert!(cache.predict(&key, 600_000.0).is_none());
        cache.add_sample(&key, 1_200_000.0, 40_000.0);
        assert!(cache.is_fitted(&key));
        // Line through the two samples: dwell = headway / 30
        assert_relative_eq!(
            cache.predict(&key, 900_000.0).unwrap(),
            30_000.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn models_are_independent_per_segment() {
        let cache = DwellModelCache::new(1.0).unwrap();
        cache.add_sample(&dwell_key(0), 600_000.0, 20_000.0);
        cache.add_sample(&dwell_key(0), 1_200_000.0, 40_000.0);
        assert!(cache.is_fitted(&dwell_key(0)));
        assert!(!cache.is_fitted(&dwell_key(1)));
        assert_eq!(cache.len(), 1);
    }
}
