//! Per-segment statistics cache
//!
//! One cache type serves three deployment policies: plain per-key
//! statistics for schedule-based service, time-of-day-bucketed statistics
//! for frequency-based service, and TTL-invalidated statistics for
//! volatile signals. All three share the `get`/`observe`/`evict_idle`
//! contract.
//!
//! Concurrency: entries live in a sharded map so updates to different
//! segments never contend on a common lock, and the `(count, mean, m2)`
//! triple of one entry mutates under its shard guard. A reader sees the
//! whole pre- or post-update tuple, never a mix. The per-segment Kalman
//! filter error is part of the entry for the same reason: it is shared
//! mutable state with last-writer-wins semantics, but it must never be
//! torn.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use headway_stats::RunningStat;

use crate::types::{SegmentKey, StatSnapshot};

const SECONDS_PER_DAY: u32 = 86_400;

/// Cache deployment policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// One statistic per segment key, no time dimension
    Unbucketed,
    /// Keys additionally carry a time-of-day bucket; lookups resolve the
    /// nearest populated bucket within one bucket width
    TimeBucketed { bucket_size_secs: u32 },
    /// Entries idle longer than the TTL are invisible to reads and
    /// removed by the periodic sweep
    TtlEvicting { ttl_secs: u64 },
}

#[derive(Debug, Clone)]
struct Entry {
    stat: RunningStat,
    filter_error: Option<f64>,
    last_observed_at_ms: i64,
}

impl Entry {
    fn new(at_ms: i64) -> Self {
        Self {
            stat: RunningStat::new(),
            filter_error: None,
            last_observed_at_ms: at_ms,
        }
    }

    fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            count: self.stat.count(),
            mean: self.stat.mean(),
            variance: self.stat.variance(),
            filter_error: self.filter_error,
            last_observed_at_ms: self.last_observed_at_ms,
        }
    }
}

/// Concurrent per-segment running statistics
pub struct SegmentStatsCache {
    policy: CachePolicy,
    entries: DashMap<SegmentKey, Entry>,
    observations: AtomicU64,
    evictions: AtomicU64,
}

impl SegmentStatsCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
            observations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total observations folded in since construction
    pub fn observation_count(&self) -> u64 {
        self.observations.load(Ordering::Relaxed)
    }

    /// Total entries removed by eviction sweeps
    pub fn eviction_count(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Fold one observed duration into the statistic for `key`
    ///
    /// Creates the entry lazily. Under the TTL policy an expired entry is
    /// replaced rather than extended: its contents were already invalid.
    pub fn observe(&self, key: &SegmentKey, value_ms: f64, at_ms: i64) {
        let storage_key = self.storage_key(key, at_ms);
        self.observations.fetch_add(1, Ordering::Relaxed);
        let mut entry = self
            .entries
            .entry(storage_key)
            .or_insert_with(|| Entry::new(at_ms));
        if self.is_expired(&entry, at_ms) {
            *entry = Entry::new(at_ms);
        }
        entry.stat.observe(value_ms);
        entry.last_observed_at_ms = at_ms;
    }

    /// Atomic copy of the statistic for `key`, or `None`
    ///
    /// Under the time-bucketed policy an unbucketed key resolves to the
    /// nearest populated bucket within one bucket width of `at_ms`. Under
    /// the TTL policy expired entries read as absent even before the
    /// sweep removes them.
    pub fn get(&self, key: &SegmentKey, at_ms: i64) -> Option<StatSnapshot> {
        self.read_entry(key, at_ms, Entry::snapshot)
    }

    /// The Kalman filter error carried on the entry for `key`
    pub fn filter_error(&self, key: &SegmentKey, at_ms: i64) -> Option<f64> {
        self.read_entry(key, at_ms, |entry| entry.filter_error)
            .flatten()
    }

    /// Store the filter error to carry into the next blend on `key`
    ///
    /// Last-writer-wins under concurrent predictions on the same segment.
    /// Creating the entry on demand is harmless: an entry with zero
    /// observations never feeds a prediction.
    pub fn set_filter_error(&self, key: &SegmentKey, error: f64, at_ms: i64) {
        let storage_key = self.storage_key(key, at_ms);
        let mut entry = self
            .entries
            .entry(storage_key)
            .or_insert_with(|| Entry::new(at_ms));
        entry.filter_error = Some(error);
    }

    /// Remove entries idle past the TTL; a no-op for other policies
    ///
    /// Safe to run concurrently with `observe`/`get`: an entry observed
    /// mid-sweep either survives or is recreated by the next observation.
    pub fn evict_idle(&self, now_ms: i64) -> usize {
        let CachePolicy::TtlEvicting { ttl_secs } = self.policy else {
            return 0;
        };
        let cutoff = now_ms.saturating_sub(ttl_secs as i64 * 1000);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.last_observed_at_ms >= cutoff);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, remaining = self.entries.len(), "evicted idle segment statistics");
        }
        removed
    }

    /// Drop every entry (configuration reload)
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// All live keys, for diagnostic dumps
    pub fn keys(&self) -> Vec<SegmentKey> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    fn read_entry<T>(
        &self,
        key: &SegmentKey,
        at_ms: i64,
        read: impl Fn(&Entry) -> T,
    ) -> Option<T> {
        let storage_key = self.resolve_key(key, at_ms)?;
        let entry = self.entries.get(&storage_key)?;
        if self.is_expired(&entry, at_ms) {
            return None;
        }
        Some(read(&entry))
    }

    fn is_expired(&self, entry: &Entry, at_ms: i64) -> bool {
        match self.policy {
            CachePolicy::TtlEvicting { ttl_secs } => {
                at_ms.saturating_sub(entry.last_observed_at_ms) > ttl_secs as i64 * 1000
            }
            _ => false,
        }
    }

    /// The key an observation at `at_ms` is stored under
    fn storage_key(&self, key: &SegmentKey, at_ms: i64) -> SegmentKey {
        match self.policy {
            CachePolicy::TimeBucketed { bucket_size_secs } if key.time_bucket.is_none() => key
                .clone()
                .with_bucket(bucket_index(seconds_since_midnight(at_ms), bucket_size_secs)),
            _ => key.clone(),
        }
    }

    /// The populated key a read of `key` at `at_ms` resolves to
    fn resolve_key(&self, key: &SegmentKey, at_ms: i64) -> Option<SegmentKey> {
        let CachePolicy::TimeBucketed { bucket_size_secs } = self.policy else {
            return Some(key.clone());
        };
        if key.time_bucket.is_some() {
            return Some(key.clone());
        }

        let requested = seconds_since_midnight(at_ms);
        let exact = bucket_index(requested, bucket_size_secs);
        let exact_key = key.clone().with_bucket(exact);
        if self.entries.contains_key(&exact_key) {
            return Some(exact_key);
        }

        // Nearest neighboring bucket whose center is within one bucket
        // width of the requested time
        let buckets = buckets_per_day(bucket_size_secs);
        let mut best: Option<(u32, SegmentKey)> = None;
        for neighbor in [
            (exact + buckets - 1) % buckets,
            (exact + 1) % buckets,
        ] {
            let candidate = key.clone().with_bucket(neighbor);
            if !self.entries.contains_key(&candidate) {
                continue;
            }
            let distance = wrapped_distance(requested, neighbor * bucket_size_secs);
            if distance <= bucket_size_secs
                && best.as_ref().map_or(true, |(d, _)| distance < *d)
            {
                best = Some((distance, candidate));
            }
        }
        best.map(|(_, key)| key)
    }
}

/// Seconds past UTC midnight for a Unix-ms timestamp
pub(crate) fn seconds_since_midnight(at_ms: i64) -> u32 {
    at_ms
        .div_euclid(1000)
        .rem_euclid(SECONDS_PER_DAY as i64) as u32
}

/// Index of the bucket whose center is closest to `seconds`
pub(crate) fn bucket_index(seconds: u32, bucket_size_secs: u32) -> u32 {
    let index = (seconds + bucket_size_secs / 2) / bucket_size_secs;
    index % buckets_per_day(bucket_size_secs)
}

fn buckets_per_day(bucket_size_secs: u32) -> u32 {
    SECONDS_PER_DAY.div_ceil(bucket_size_secs).max(1)
}

/// Distance between two times-of-day, accounting for midnight wrap
fn wrapped_distance(a_secs: u32, b_secs: u32) -> u32 {
    let direct = a_secs.abs_diff(b_secs);
    direct.min(SECONDS_PER_DAY - direct)
}
