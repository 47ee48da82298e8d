//! LruCache: reference-counted LRU cache engine
//!
//! Every indexed entry carries one reference owned by the cache itself, and
//! each [`Handle`] owns one more. Removing an entry from the index (replace,
//! erase, eviction, clear) and destroying it (deleter fired) are separate
//! steps: destruction happens when the last reference goes away.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::CacheConfig;
use crate::entry::{Deleter, Entry};
use crate::error::{BoxError, Error, Result};
use crate::handle::Handle;
use crate::lru::{LruList, Slot};
use crate::stats::{CacheCounters, CacheStats};

/// State shared between the cache and every handle it has given out
pub(crate) struct Shared<V> {
    pub(crate) state: Mutex<State<V>>,
    counters: CacheCounters,
    name: String,
}

/// Everything guarded by the cache lock
pub(crate) struct State<V> {
    list: LruList<String, Arc<Entry<V>>>,
    /// Summed size of indexed entries. Wider than a single entry size so an
    /// oversized singleton plus the entry that displaces it cannot overflow.
    size: u128,
    capacity: u64,
    last_id: u64,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
enum End {
    Front,
    Back,
}

impl<V> State<V> {
    fn check_open(&self) {
        assert!(!self.closed, "cache used after close");
    }

    fn over_capacity(&self) -> bool {
        self.size > u128::from(self.capacity)
    }

    /// Running size as reported to callers. Outside the lock it never
    /// exceeds one entry's size or the capacity, so it always fits.
    fn reported_size(&self) -> u64 {
        u64::try_from(self.size).unwrap_or(u64::MAX)
    }

    fn slot_at(&self, end: End) -> Option<Slot> {
        match end {
            End::Front => self.list.front(),
            End::Back => self.list.back(),
        }
    }

    /// Remove the entry at `slot` from the index. Its reference count is
    /// left alone; the caller decides who owns the cache's reference now.
    fn detach(&mut self, slot: Slot) -> Option<Arc<Entry<V>>> {
        let (_, entry) = self.list.remove(slot)?;
        self.size -= u128::from(entry.size);
        Some(entry)
    }
}

impl<V> Shared<V> {
    /// Drop the cache's own reference on `entry`. The guard proves the lock
    /// is held.
    pub(crate) fn release(&self, state: &mut State<V>, entry: &Entry<V>) {
        self.unref(state, entry, false);
    }

    /// Drop a handle's reference on `entry`. If that destroys it, the entry
    /// had already left the index.
    pub(crate) fn release_handle(&self, state: &mut State<V>, entry: &Entry<V>) {
        self.unref(state, entry, true);
    }

    fn unref(&self, _state: &mut State<V>, entry: &Entry<V>, by_handle: bool) {
        if entry.unref() {
            self.counters.record_destroyed(by_handle);
            trace!(cache = %self.name, key = %entry.key, by_handle, "entry destroyed");
        }
    }

    /// Evict from the back until the size fits, never below one entry
    fn evict(&self, state: &mut State<V>) {
        while state.over_capacity() && state.list.len() > 1 {
            let Some(slot) = state.list.back() else {
                break;
            };
            let Some(entry) = state.detach(slot) else {
                break;
            };

            self.counters.record_eviction();
            debug!(
                cache = %self.name,
                key = %entry.key,
                size = entry.size,
                "evicted least recently used entry"
            );
            self.release(state, &entry);
        }
    }
}

/// Thread-safe, capacity-bounded LRU cache handing out [`Handle`]s.
///
/// Capacity is measured in caller-declared sizes, not entry counts. When the
/// summed size of indexed entries exceeds the capacity, least recently used
/// entries are evicted until it fits, except that a single entry is always
/// kept even if it alone is larger than the capacity.
///
/// Deleter callbacks run on whichever thread drops the last reference, while
/// the cache lock is held. They must not call back into the same cache.
///
/// The cache must be torn down with [`LruCache::close`] once every handle on
/// an indexed entry has been released; that is what fires the remaining
/// deleters.
///
/// # Example
/// ```
/// use refcache::LruCache;
///
/// let cache = LruCache::new(10);
///
/// let handle = cache.insert("123", "data:123", 8);
/// assert_eq!(*handle.value(), "data:123");
/// handle.release();
///
/// assert_eq!(cache.get("123"), Some("data:123"));
/// cache.close();
/// ```
pub struct LruCache<V> {
    shared: Arc<Shared<V>>,
}

impl<V> LruCache<V> {
    /// Create a cache bounded by `capacity`
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: u64) -> Self {
        Self::with_config(CacheConfig::new(capacity).build())
    }

    /// Create a cache from a configuration
    ///
    /// # Panics
    /// If the configured capacity is zero.
    pub fn with_config(config: CacheConfig) -> Self {
        let config = config.build();

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    list: LruList::new(),
                    size: 0,
                    capacity: config.capacity,
                    last_id: 0,
                    closed: false,
                }),
                counters: CacheCounters::new(),
                name: config.name,
            }),
        }
    }

    /// Allocate a new numeric id, starting at 1.
    ///
    /// Clients sharing one cache can prefix their keys with an id to keep
    /// their key spaces apart.
    pub fn new_id(&self) -> u64 {
        let mut state = self.shared.state.lock();
        state.last_id += 1;
        state.last_id
    }

    /// Insert a mapping at the front and return a handle to it.
    ///
    /// An existing entry under `key` is removed from the index and loses the
    /// cache's reference; outstanding handles keep it alive.
    ///
    /// # Panics
    /// If `key` is empty or `size` is zero.
    pub fn insert(&self, key: impl Into<String>, value: V, size: u64) -> Handle<V> {
        self.insert_with_handle(key.into(), value, size, None)
    }

    /// Like [`insert`](Self::insert), with a callback fired once the entry is
    /// destroyed
    pub fn insert_with_deleter<F>(
        &self,
        key: impl Into<String>,
        value: V,
        size: u64,
        deleter: F,
    ) -> Handle<V>
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        self.insert_with_handle(key.into(), value, size, Some(Box::new(deleter)))
    }

    /// Find `key`, mark it most recently used and return a handle to it
    pub fn lookup(&self, key: &str) -> Option<Handle<V>> {
        let mut state = self.shared.state.lock();
        state.check_open();

        let Some(slot) = state.list.find(key) else {
            self.shared.counters.record_lookup(false);
            return None;
        };

        state.list.move_to_front(slot);
        let entry = Arc::clone(state.list.get(slot)?);
        entry.touch();
        entry.add_ref();
        self.shared.counters.record_lookup(true);

        Some(Handle::adopt(Arc::clone(&self.shared), entry))
    }

    /// Remove `key` from the index and drop the cache's reference on it.
    ///
    /// Returns `true` if the key was present.
    pub fn erase(&self, key: &str) -> bool {
        let mut state = self.shared.state.lock();
        state.check_open();

        let Some(slot) = state.list.find(key) else {
            return false;
        };
        match state.detach(slot) {
            Some(entry) => {
                self.shared.release(&mut state, &entry);
                true
            }
            None => false,
        }
    }

    /// Remove `key` from the index, handing the cache's reference to the
    /// caller
    pub fn take(&self, key: &str) -> Option<Handle<V>> {
        let mut state = self.shared.state.lock();
        state.check_open();

        let slot = state.list.find(key)?;
        let entry = state.detach(slot)?;
        Some(Handle::adopt(Arc::clone(&self.shared), entry))
    }

    /// Replace the capacity and evict down to it
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn set_capacity(&self, capacity: u64) {
        assert!(capacity > 0, "Capacity must be greater than 0");

        let mut state = self.shared.state.lock();
        state.check_open();

        debug!(cache = %self.shared.name, from = state.capacity, to = capacity, "capacity changed");
        state.capacity = capacity;
        self.shared.evict(&mut state);
    }

    /// Tear the cache down, firing the deleter of every indexed entry.
    ///
    /// # Panics
    /// If any indexed entry still has an outstanding handle, or if the cache
    /// was already closed. Handles on entries that were already removed from
    /// the index may outlive the cache.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        assert!(!state.closed, "cache '{}' closed twice", self.shared.name);

        for (key, entry) in state.list.iter() {
            let refs = entry.refs();
            assert!(
                refs == 1,
                "cache '{}' closed while '{}' has {} outstanding handle(s)",
                self.shared.name,
                key,
                refs.saturating_sub(1)
            );
        }

        let entries = state.list.drain();
        state.size = 0;
        state.closed = true;

        let count = entries.len();
        for (_, entry) in entries {
            self.shared.release(&mut state, &entry);
        }
        info!(cache = %self.shared.name, entries = count, "cache closed");
    }

    /// Look up `key` and clone its value
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.lookup(key).map(|handle| handle.value().clone())
    }

    /// Look up `key`, falling back to `default` on a miss
    pub fn value_or(&self, key: &str, default: V) -> V
    where
        V: Clone,
    {
        self.get(key).unwrap_or(default)
    }

    /// Look up `key`, or produce it with `loader` and cache the result.
    ///
    /// The loader returns the value and its size. Loader errors are returned
    /// as [`Error::Load`] and nothing is inserted. Concurrent misses on the
    /// same key each run the loader; the last insert wins.
    pub fn get_or_load<F, E>(&self, key: &str, loader: F) -> Result<V>
    where
        V: Clone,
        F: FnOnce(&str) -> std::result::Result<(V, u64), E>,
        E: Into<BoxError>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let (value, size) = loader(key).map_err(|e| Error::Load {
            key: key.to_string(),
            source: e.into(),
        })?;
        self.set(key, value.clone(), size);
        Ok(value)
    }

    /// Insert without keeping a handle
    pub fn set(&self, key: impl Into<String>, value: V, size: u64) {
        self.insert_at(key.into(), value, size, None, End::Front);
    }

    /// Insert with a deleter without keeping a handle
    pub fn set_with_deleter<F>(&self, key: impl Into<String>, value: V, size: u64, deleter: F)
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        self.insert_at(key.into(), value, size, Some(Box::new(deleter)), End::Front);
    }

    /// Insert at the front, held only by the cache
    pub fn push_front(&self, key: impl Into<String>, value: V, size: u64) {
        self.insert_at(key.into(), value, size, None, End::Front);
    }

    /// Insert at the front with a deleter, held only by the cache
    pub fn push_front_with_deleter<F>(&self, key: impl Into<String>, value: V, size: u64, deleter: F)
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        self.insert_at(key.into(), value, size, Some(Box::new(deleter)), End::Front);
    }

    /// Insert at the back, held only by the cache.
    ///
    /// The back is the eviction end, so an entry pushed here is the first to
    /// go if the push takes the cache over capacity.
    pub fn push_back(&self, key: impl Into<String>, value: V, size: u64) {
        self.insert_at(key.into(), value, size, None, End::Back);
    }

    /// Insert at the back with a deleter, held only by the cache
    pub fn push_back_with_deleter<F>(&self, key: impl Into<String>, value: V, size: u64, deleter: F)
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        self.insert_at(key.into(), value, size, Some(Box::new(deleter)), End::Back);
    }

    /// Handle to the most recently used entry, without reordering
    pub fn front(&self) -> Option<Handle<V>> {
        self.peek(End::Front)
    }

    /// Handle to the least recently used entry, without reordering
    pub fn back(&self) -> Option<Handle<V>> {
        self.peek(End::Back)
    }

    /// Remove the front entry, handing the cache's reference to the caller
    pub fn pop_front(&self) -> Option<Handle<V>> {
        self.pop(End::Front)
    }

    /// Remove the back entry, handing the cache's reference to the caller
    pub fn pop_back(&self) -> Option<Handle<V>> {
        self.pop(End::Back)
    }

    /// Key of the front entry
    pub fn front_key(&self) -> Option<String> {
        self.front().map(|handle| handle.key().to_string())
    }

    /// Key of the back entry
    pub fn back_key(&self) -> Option<String> {
        self.back().map(|handle| handle.key().to_string())
    }

    /// Value of the front entry
    pub fn front_value(&self) -> Option<V>
    where
        V: Clone,
    {
        self.front().map(|handle| handle.value().clone())
    }

    /// Value of the back entry
    pub fn back_value(&self) -> Option<V>
    where
        V: Clone,
    {
        self.back().map(|handle| handle.value().clone())
    }

    /// Pop and release the front entry. Returns `true` if one was removed.
    pub fn remove_front(&self) -> bool {
        self.pop_front().is_some()
    }

    /// Pop and release the back entry. Returns `true` if one was removed.
    pub fn remove_back(&self) -> bool {
        self.pop_back().is_some()
    }

    /// Reorder `key` to the front. Returns `false` if absent.
    pub fn move_to_front(&self, key: &str) -> bool {
        self.move_to(key, End::Front)
    }

    /// Reorder `key` to the back. Returns `false` if absent.
    pub fn move_to_back(&self, key: &str) -> bool {
        self.move_to(key, End::Back)
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        state.list.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Remove every entry from the index, dropping the cache's reference on
    /// each
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        state.check_open();

        let entries = state.list.drain();
        state.size = 0;
        for (_, entry) in entries {
            self.shared.release(&mut state, &entry);
        }
    }

    /// Check if `key` is indexed, without touching recency or references
    pub fn contains(&self, key: &str) -> bool {
        self.shared.state.lock().list.find(key).is_some()
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.shared.state.lock().list.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().list.is_empty()
    }

    /// Summed size of indexed entries
    pub fn size(&self) -> u64 {
        self.shared.state.lock().reported_size()
    }

    /// Current capacity
    pub fn capacity(&self) -> u64 {
        self.shared.state.lock().capacity
    }

    /// Name from the configuration
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Traffic counters, readable without the cache lock
    pub fn counters(&self) -> &CacheCounters {
        &self.shared.counters
    }

    /// Zero the traffic counters
    pub fn reset_counters(&self) {
        self.shared.counters.reset();
    }

    /// Snapshot of length, size, capacity, oldest access and counters
    pub fn stats(&self) -> CacheStats {
        let (length, size, capacity, oldest_access) = {
            let state = self.shared.state.lock();
            let oldest = state
                .list
                .iter()
                .map(|(_, entry)| entry.accessed_at())
                .min();
            (state.list.len(), state.reported_size(), state.capacity, oldest)
        };

        let counters = &self.shared.counters;
        CacheStats {
            length,
            size,
            capacity,
            oldest_access: oldest_access.map(DateTime::<Utc>::from),
            hits: counters.hits(),
            misses: counters.misses(),
            evictions: counters.evictions(),
            inserts: counters.inserts(),
            destroyed: counters.destroyed(),
            orphans: counters.orphans(),
        }
    }

    /// [`stats`](Self::stats) rendered as JSON
    pub fn stats_json(&self) -> Result<String> {
        self.stats().to_json()
    }

    fn insert_with_handle(
        &self,
        key: String,
        value: V,
        size: u64,
        deleter: Option<Deleter<V>>,
    ) -> Handle<V> {
        let mut state = self.shared.state.lock();
        let entry = self.link(&mut state, key, value, size, deleter, End::Front, 2);
        self.shared.evict(&mut state);
        Handle::adopt(Arc::clone(&self.shared), entry)
    }

    fn insert_at(&self, key: String, value: V, size: u64, deleter: Option<Deleter<V>>, end: End) {
        let mut state = self.shared.state.lock();
        self.link(&mut state, key, value, size, deleter, end, 1);
        self.shared.evict(&mut state);
    }

    /// Create an entry holding `refs` references and index it at `end`,
    /// replacing any entry under the same key
    #[allow(clippy::too_many_arguments)]
    fn link(
        &self,
        state: &mut State<V>,
        key: String,
        value: V,
        size: u64,
        deleter: Option<Deleter<V>>,
        end: End,
        refs: u32,
    ) -> Arc<Entry<V>> {
        state.check_open();
        assert!(!key.is_empty(), "cache key must not be empty");
        assert!(size > 0, "entry size must be greater than 0");

        if let Some(slot) = state.list.find(key.as_str()) {
            if let Some(old) = state.detach(slot) {
                self.shared.release(state, &old);
            }
        }

        trace!(cache = %self.shared.name, key = %key, size, "insert");
        let entry = Arc::new(Entry::new(key.clone(), value, size, deleter, refs));
        match end {
            End::Front => state.list.insert_front(key, Arc::clone(&entry)),
            End::Back => state.list.insert_back(key, Arc::clone(&entry)),
        };
        state.size += u128::from(size);
        self.shared.counters.record_insert();
        entry
    }

    fn peek(&self, end: End) -> Option<Handle<V>> {
        let state = self.shared.state.lock();
        state.check_open();

        let slot = state.slot_at(end)?;
        let entry = Arc::clone(state.list.get(slot)?);
        entry.touch();
        entry.add_ref();
        Some(Handle::adopt(Arc::clone(&self.shared), entry))
    }

    fn pop(&self, end: End) -> Option<Handle<V>> {
        let mut state = self.shared.state.lock();
        state.check_open();

        let slot = state.slot_at(end)?;
        let entry = state.detach(slot)?;
        Some(Handle::adopt(Arc::clone(&self.shared), entry))
    }

    fn move_to(&self, key: &str, end: End) -> bool {
        let mut state = self.shared.state.lock();
        state.check_open();

        let Some(slot) = state.list.find(key) else {
            return false;
        };
        match end {
            End::Front => state.list.move_to_front(slot),
            End::Back => state.list.move_to_back(slot),
        }
        true
    }
}

impl<V> Drop for LruCache<V> {
    fn drop(&mut self) {
        let state = self.shared.state.lock();
        if !state.closed && !state.list.is_empty() {
            warn!(
                cache = %self.shared.name,
                entries = state.list.len(),
                "cache dropped without close, deleters of indexed entries will not run"
            );
        }
    }
}
