//! Cache statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Lifecycle counters for one cache.
///
/// Traffic (`hits`, `misses`) is counted per lookup. The other counters
/// follow entries: `inserts` when one is indexed, `evictions` when capacity
/// pushes one out, `destroyed` each time a deleter fires, and `orphans` for
/// the subset of destructions triggered by a handle after the entry had
/// already left the index.
///
/// All counters are relaxed atomics and are read without the cache lock.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    destroyed: AtomicU64,
    orphans: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// `by_handle` marks a destruction caused by releasing a handle rather
    /// than by the cache dropping its own reference
    pub(crate) fn record_destroyed(&self, by_handle: bool) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        if by_handle {
            self.orphans.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Lookups that found their key
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that did not
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries indexed, including replacements
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Entries pushed out by the capacity bound
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Deleters fired
    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Entries that outlived their time in the index and were destroyed by
    /// the last handle on them
    pub fn orphans(&self) -> u64 {
        self.orphans.load(Ordering::Relaxed)
    }

    /// Fraction of lookups that hit, `None` before the first lookup
    pub fn hit_ratio(&self) -> Option<f64> {
        let hits = self.hits();
        match hits + self.misses() {
            0 => None,
            lookups => Some(hits as f64 / lookups as f64),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.inserts,
            &self.evictions,
            &self.destroyed,
            &self.orphans,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time view of a cache.
///
/// `length`, `size` and `capacity` are read under the cache lock together,
/// so they are mutually consistent. Counters are read just after.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of indexed entries
    pub length: usize,
    /// Summed size of indexed entries
    pub size: u64,
    /// Configured capacity
    pub capacity: u64,
    /// Oldest access time among indexed entries, `None` when empty
    pub oldest_access: Option<DateTime<Utc>>,
    /// Lookup hits since creation or the last counter reset
    pub hits: u64,
    /// Lookup misses since creation or the last counter reset
    pub misses: u64,
    /// Capacity evictions since creation or the last counter reset
    pub evictions: u64,
    /// Inserts since creation or the last counter reset
    pub inserts: u64,
    /// Deleters fired since creation or the last counter reset
    pub destroyed: u64,
    /// Destructions triggered by a handle after the entry left the index
    pub orphans: u64,
}

impl CacheStats {
    /// Render as a JSON object
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
