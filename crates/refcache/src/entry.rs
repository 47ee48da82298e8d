//! Cache entry with reference count and access metadata

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Callback fired with `(key, value)` when an entry is destroyed
pub type Deleter<V> = Box<dyn Fn(&str, &V) + Send + Sync>;

/// A single cached record.
///
/// Owned jointly by the cache index (one implicit reference while indexed)
/// and by every outstanding [`Handle`](crate::Handle). The reference count is
/// only changed while the cache lock is held; the atomics exist so handles
/// can read metadata without taking that lock.
pub(crate) struct Entry<V> {
    pub(crate) key: String,
    pub(crate) value: V,
    pub(crate) size: u64,
    deleter: Option<Deleter<V>>,
    created_at: SystemTime,
    /// Nanoseconds since the Unix epoch
    accessed_at: AtomicU64,
    refs: AtomicU32,
}

impl<V> Entry<V> {
    pub(crate) fn new(
        key: String,
        value: V,
        size: u64,
        deleter: Option<Deleter<V>>,
        refs: u32,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            key,
            value,
            size,
            deleter,
            created_at: now,
            accessed_at: AtomicU64::new(unix_nanos(now)),
            refs: AtomicU32::new(refs),
        }
    }

    pub(crate) fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub(crate) fn accessed_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.accessed_at.load(Ordering::Acquire))
    }

    /// Refresh the access timestamp
    pub(crate) fn touch(&self) {
        self.accessed_at
            .store(unix_nanos(SystemTime::now()), Ordering::Release);
    }

    pub(crate) fn refs(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Add one reference. Caller holds the cache lock.
    pub(crate) fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference, firing the deleter when it was the last.
    /// Caller holds the cache lock. Returns `true` if the entry was destroyed.
    pub(crate) fn unref(&self) -> bool {
        let refs = self.refs.load(Ordering::Acquire);
        assert!(refs > 0, "entry '{}' released more times than referenced", self.key);
        self.refs.store(refs - 1, Ordering::Release);

        if refs > 1 {
            return false;
        }

        if let Some(deleter) = &self.deleter {
            deleter(&self.key, &self.value);
        }
        true
    }
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
