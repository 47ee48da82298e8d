//! # refcache
//!
//! Capacity-bounded, thread-safe LRU cache that hands out reference-counted
//! handles instead of copies.
//!
//! ## Architecture
//! - **Index + order**: AHash map into a slab-backed doubly-linked list (O(1))
//! - **Entries**: shared between the index and every outstanding [`Handle`]
//! - **Engine**: one `parking_lot` mutex guards structure and reference counts
//!
//! An entry leaves the index on replace, erase, take, pop or eviction, but is
//! only destroyed (its deleter fired) once the last handle is released.
//!
//! ```
//! use refcache::LruCache;
//!
//! let cache = LruCache::new(10);
//! let handle = cache.insert("123", String::from("data:123"), 8);
//!
//! cache.erase("123");
//! assert!(cache.lookup("123").is_none());
//! assert_eq!(handle.value(), "data:123"); // still readable
//!
//! handle.release();
//! cache.close();
//! ```

#![warn(missing_docs)]

mod cache;
mod config;
mod entry;
mod error;
mod handle;
mod lru;
mod stats;

pub use cache::LruCache;
pub use config::CacheConfig;
pub use entry::Deleter;
pub use error::{BoxError, Error, Result};
pub use handle::Handle;
pub use stats::{CacheCounters, CacheStats};
