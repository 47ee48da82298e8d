//! Cache configuration

use serde::Deserialize;

/// Configuration for creating an [`LruCache`](crate::LruCache).
///
/// ```
/// use refcache::{CacheConfig, LruCache};
///
/// let config = CacheConfig::new(64 * 1024).with_name("blocks").build();
/// let cache: LruCache<Vec<u8>> = LruCache::with_config(config);
/// assert_eq!(cache.capacity(), 64 * 1024);
/// # cache.close();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on the summed size of indexed entries
    pub(crate) capacity: u64,

    /// Label attached to log events
    #[serde(default = "default_name")]
    pub(crate) name: String,
}

fn default_name() -> String {
    "cache".to_string()
}

impl CacheConfig {
    /// Create a configuration with the given capacity
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            name: default_name(),
        }
    }

    /// Set the label used in log events
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Validate and return the final configuration.
    ///
    /// # Panics
    /// If the capacity is zero.
    pub fn build(self) -> Self {
        assert!(self.capacity > 0, "Capacity must be greater than 0");
        self
    }

    /// Get the configured capacity
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the configured name
    pub fn name(&self) -> &str {
        &self.name
    }
}
