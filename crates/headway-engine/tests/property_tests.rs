//! Property and concurrency tests for the shared caches and predictor

use std::sync::Arc;

use headway_engine::{
    CachePolicy, DwellModelCache, LastObservation, LastVehicleStore, PredictionRequest,
    SegmentKey, SegmentPredictor, SegmentStatsCache, TripScope,
};
use headway_stats::KalmanBlend;
use proptest::prelude::*;

fn travel_key(index: u32) -> SegmentKey {
    SegmentKey::travel(TripScope::Trip("t1".into()), index)
}

// No lost updates: N threads x M observations on one key leave count N*M
#[test]
fn concurrent_observes_never_lose_updates() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 1_000;

    let cache = Arc::new(SegmentStatsCache::new(CachePolicy::Unbucketed));
    let key = travel_key(0);

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let cache = cache.clone();
            let key = key.clone();
            scope.spawn(move || {
                for i in 0..PER_THREAD {
                    cache.observe(&key, 300.0 + (t * PER_THREAD + i) as f64 % 200.0, i as i64);
                }
            });
        }
    });

    let snapshot = cache.get(&key, 0).unwrap();
    assert_eq!(snapshot.count, (THREADS * PER_THREAD) as u64);
    assert!(snapshot.variance.unwrap() >= 0.0);
}

// Writers on different keys proceed independently and all land
#[test]
fn concurrent_observes_across_keys() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let cache = Arc::new(SegmentStatsCache::new(CachePolicy::Unbucketed));

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let cache = cache.clone();
            scope.spawn(move || {
                let key = travel_key(t as u32);
                for i in 0..PER_THREAD {
                    cache.observe(&key, 400.0, i as i64);
                }
            });
        }
    });

    for t in 0..THREADS {
        let snapshot = cache.get(&travel_key(t as u32), 0).unwrap();
        assert_eq!(snapshot.count, PER_THREAD as u64);
    }
}

// Eviction sweeps racing observers must neither crash nor corrupt state;
// an entry observed mid-sweep either survives or is recreated
#[test]
fn eviction_races_observers_safely() {
    let cache = Arc::new(SegmentStatsCache::new(CachePolicy::TtlEvicting {
        ttl_secs: 1,
    }));

    std::thread::scope(|scope| {
        for t in 0..4 {
            let cache = cache.clone();
            scope.spawn(move || {
                let key = travel_key(t);
                for i in 0..2_000i64 {
                    cache.observe(&key, 400.0, i * 10);
                }
            });
        }
        let sweeper = cache.clone();
        scope.spawn(move || {
            for i in 0..200i64 {
                sweeper.evict_idle(i * 100);
            }
        });
    });

    // Every key was observed at t = 19_990 last; nothing expired there
    for t in 0..4 {
        let snapshot = cache.get(&travel_key(t), 19_990);
        assert!(snapshot.is_some());
        assert!(snapshot.unwrap().count >= 1);
    }
}

// Concurrent filter-error writers leave some writer's whole value, never
// a torn one
#[test]
fn filter_error_is_last_writer_wins() {
    let cache = Arc::new(SegmentStatsCache::new(CachePolicy::Unbucketed));
    let key = travel_key(0);

    let written: Vec<f64> = (1..=16).map(|i| i as f64 * 111.0).collect();
    std::thread::scope(|scope| {
        for &value in &written {
            let cache = cache.clone();
            let key = key.clone();
            scope.spawn(move || {
                for _ in 0..100 {
                    cache.set_filter_error(&key, value, 0);
                }
            });
        }
    });

    let observed = cache.get(&key, 0).unwrap().filter_error.unwrap();
    assert!(written.contains(&observed));
}

proptest! {
    // Count after N sequential observes is exactly N
    #[test]
    fn prop_count_is_monotonic(values in prop::collection::vec(1.0..1.0e6f64, 1..300)) {
        let cache = SegmentStatsCache::new(CachePolicy::Unbucketed);
        let key = travel_key(0);
        for (i, &v) in values.iter().enumerate() {
            cache.observe(&key, v, i as i64);
            prop_assert_eq!(cache.get(&key, i as i64).unwrap().count, i as u64 + 1);
        }
    }

    // Identical cache state and inputs select the same tier and value
    #[test]
    fn prop_prediction_is_deterministic(
        history in prop::collection::vec(100.0..1.0e6f64, 0..20),
        last in prop::option::of(100.0..1.0e6f64),
        min_samples in 1u64..10
    ) {
        let build = || {
            let stats = Arc::new(SegmentStatsCache::new(CachePolicy::Unbucketed));
            let dwell = Arc::new(DwellModelCache::new(0.9).unwrap());
            let store = Arc::new(LastVehicleStore::new());
            let key = travel_key(0);
            for (i, &v) in history.iter().enumerate() {
                stats.observe(&key, v, i as i64);
            }
            if let Some(duration_ms) = last {
                store.record(&key, LastObservation {
                    duration_ms,
                    observed_at_ms: 50_000,
                    vehicle_id: "bus-1".into(),
                });
            }
            SegmentPredictor::new(
                min_samples,
                KalmanBlend::new(1e-3).unwrap(),
                stats,
                dwell,
                store,
            )
        };

        let request = PredictionRequest {
            key: travel_key(0),
            vehicle_id: "bus-2".into(),
            last_vehicle_duration_ms: None,
            scheduled_duration_ms: Some(777.0),
            forecast_horizon_ms: 0.0,
            now_ms: 60_000,
        };

        let first = build().predict_travel_time(&request).unwrap();
        let second = build().predict_travel_time(&request).unwrap();
        prop_assert_eq!(first.tier, second.tier);
        prop_assert_eq!(first.value_ms, second.value_ms);
        prop_assert!(first.value_ms.is_finite() && first.value_ms >= 0.0);
    }
}
