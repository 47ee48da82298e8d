//! Reference-counted handle to a cached entry

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::SystemTime;

use crate::cache::Shared;
use crate::entry::Entry;

/// An owned reference to one cache entry.
///
/// Every handle accounts for exactly one unit of the entry's reference count.
/// Dropping the handle (or calling [`Handle::release`]) gives that unit back;
/// when the count reaches zero the entry's deleter runs on the releasing
/// thread. The entry stays readable through the handle after it has been
/// erased, replaced or evicted from the cache.
///
/// Handles must not be dropped from inside a deleter callback of the same
/// cache: the release needs the cache lock the callback is running under.
pub struct Handle<V> {
    shared: Arc<Shared<V>>,
    entry: Arc<Entry<V>>,
}

impl<V> Handle<V> {
    /// Wrap a reference the caller has already counted
    pub(crate) fn adopt(shared: Arc<Shared<V>>, entry: Arc<Entry<V>>) -> Self {
        Self { shared, entry }
    }

    /// Key of the entry
    pub fn key(&self) -> &str {
        &self.entry.key
    }

    /// Value of the entry
    pub fn value(&self) -> &V {
        &self.entry.value
    }

    /// Declared size of the entry
    pub fn size(&self) -> u64 {
        self.entry.size
    }

    /// When the entry was inserted
    pub fn created_at(&self) -> SystemTime {
        self.entry.created_at()
    }

    /// When the entry was last returned by a lookup or peek.
    ///
    /// Read without taking the cache lock.
    pub fn accessed_at(&self) -> SystemTime {
        self.entry.accessed_at()
    }

    /// Current reference count of the entry, including the cache's own
    /// reference while the entry is indexed. Only a snapshot.
    pub fn ref_count(&self) -> u32 {
        self.entry.refs()
    }

    /// Take an additional reference to the same entry
    pub fn retain(&self) -> Handle<V> {
        let _state = self.shared.state.lock();
        self.entry.add_ref();
        Handle::adopt(Arc::clone(&self.shared), Arc::clone(&self.entry))
    }

    /// Give the reference back. Same as dropping the handle.
    pub fn release(self) {
        drop(self);
    }
}

impl<V> Clone for Handle<V> {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl<V> Deref for Handle<V> {
    type Target = V;

    fn deref(&self) -> &V {
        self.value()
    }
}

impl<V> Drop for Handle<V> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        self.shared.release_handle(&mut state, &self.entry);
    }
}

impl<V: fmt::Debug> fmt::Debug for Handle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.entry.key)
            .field("value", &self.entry.value)
            .field("size", &self.entry.size)
            .field("refs", &self.entry.refs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::LruCache;

    #[test]
    fn test_handle_accessors() {
        let cache = LruCache::new(10);

        let handle = cache.insert("k", String::from("v"), 4);
        assert_eq!(handle.key(), "k");
        assert_eq!(handle.value(), "v");
        assert_eq!(handle.size(), 4);
        assert_eq!(handle.len(), 1); // through Deref
        assert!(handle.accessed_at() >= handle.created_at());

        handle.release();
        cache.close();
    }

    #[test]
    fn test_retain_and_clone_count_references() {
        let cache = LruCache::new(10);

        let a = cache.insert("k", 1, 1);
        assert_eq!(a.ref_count(), 2);

        let b = a.retain();
        let c = b.clone();
        assert_eq!(a.ref_count(), 4);

        drop(b);
        c.release();
        assert_eq!(a.ref_count(), 2);

        a.release();
        cache.close();
    }

    #[test]
    fn test_handle_outlives_cache() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let fired = Arc::new(AtomicUsize::new(0));
        let cache = LruCache::new(10);

        let counter = fired.clone();
        let handle = cache.insert_with_deleter("k", 7, 1, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cache.erase("k");
        cache.close();
        drop(cache);

        assert_eq!(*handle, 7);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        drop(handle);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_format() {
        let cache = LruCache::new(10);

        let handle = cache.insert("k", 5, 1);
        let debug = format!("{:?}", handle);
        assert!(debug.contains("key: \"k\""));
        assert!(debug.contains("value: 5"));

        drop(handle);
        cache.close();
    }
}
