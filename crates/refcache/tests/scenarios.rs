//! End-to-end handle lifetime scenarios

use std::sync::{Arc, Once};
use std::thread;

use parking_lot::Mutex;
use refcache::{CacheConfig, LruCache};

type Log = Arc<Mutex<Vec<(String, String)>>>;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn recorder(log: &Log) -> impl Fn(&str, &String) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |key: &str, value: &String| log.lock().push((key.to_string(), value.clone()))
}

fn entry(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[test]
fn erase_with_two_handles_outstanding() {
    init_tracing();
    let log: Log = Arc::default();
    let cache = LruCache::new(10);

    let a = cache.insert_with_deleter("123", "data:123".to_string(), 8, recorder(&log));
    assert_eq!((cache.len(), cache.size()), (1, 8));

    let b = cache.lookup("123").expect("just inserted");
    assert_eq!(b.value(), "data:123");
    assert_eq!(b.ref_count(), 3);

    cache.erase("123");
    assert!(!cache.contains("123"));
    assert!(cache.lookup("123").is_none());

    a.release();
    assert!(log.lock().is_empty());

    b.release();
    assert_eq!(*log.lock(), vec![entry("123", "data:123")]);

    cache.close();
    assert_eq!(log.lock().len(), 1);
}

#[test]
fn insert_over_capacity_evicts_pushed_entry() {
    init_tracing();
    let log: Log = Arc::default();
    let cache = LruCache::new(10);

    cache.push_front_with_deleter("abc", "data:abc".to_string(), 8, recorder(&log));
    assert_eq!((cache.len(), cache.size()), (1, 8));

    let handle = cache.insert_with_deleter("456", "data:456".to_string(), 8, recorder(&log));
    assert_eq!(*log.lock(), vec![entry("abc", "data:abc")]);
    assert_eq!((cache.len(), cache.size()), (1, 8));
    assert_eq!(cache.keys(), vec!["456"]);

    handle.release();
    cache.close();
    assert_eq!(
        *log.lock(),
        vec![entry("abc", "data:abc"), entry("456", "data:456")]
    );
}

#[test]
fn reinsert_keeps_old_value_visible_to_old_handles() {
    init_tracing();
    let log: Log = Arc::default();
    let cache = LruCache::new(100);

    let old = cache.insert_with_deleter("k", "old".to_string(), 1, recorder(&log));
    let new = cache.insert_with_deleter("k", "new".to_string(), 1, recorder(&log));

    let seen = cache.lookup("k").unwrap();
    assert_eq!(seen.value(), "new");
    assert_eq!(old.value(), "old");
    drop(seen);

    new.release();
    assert!(log.lock().is_empty());

    old.release();
    assert_eq!(*log.lock(), vec![entry("k", "old")]);

    cache.close();
    assert_eq!(*log.lock(), vec![entry("k", "old"), entry("k", "new")]);
}

#[test]
fn take_then_reinsert_same_key() {
    init_tracing();
    let log: Log = Arc::default();
    let cache = LruCache::new(100);

    cache.set_with_deleter("k", "first".to_string(), 4, recorder(&log));
    let taken = cache.take("k").unwrap();
    cache.set_with_deleter("k", "second".to_string(), 4, recorder(&log));

    assert_eq!(taken.value(), "first");
    assert_eq!(cache.get("k").as_deref(), Some("second"));
    assert_eq!(cache.size(), 4);

    taken.release();
    assert_eq!(*log.lock(), vec![entry("k", "first")]);
    cache.close();
}

#[test]
fn keys_follow_recency() {
    init_tracing();
    let cache = LruCache::with_config(CacheConfig::new(100).with_name("recency"));

    for key in ["a", "b", "c", "d"] {
        cache.set(key, key.len(), 1);
    }
    cache.get("b");
    cache.lookup("a").unwrap().release();

    assert_eq!(cache.keys(), vec!["a", "b", "d", "c"]);
    cache.close();
}

#[test]
fn namespaced_clients_share_one_cache() {
    init_tracing();
    let cache = Arc::new(LruCache::new(1_000));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let id = cache.new_id();
                for i in 0..50 {
                    cache.set(format!("{id}:{i}"), id, 1);
                }
                id
            })
        })
        .collect();

    let mut ids: Vec<u64> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(cache.len(), 200);

    for id in ids {
        assert_eq!(cache.get(&format!("{id}:0")), Some(id));
    }
    cache.close();
}

#[test]
fn handles_released_on_other_threads() {
    init_tracing();
    let fired = Arc::new(Mutex::new(0usize));
    let cache = Arc::new(LruCache::new(4));

    let mut held = Vec::new();
    for i in 0..16u64 {
        let fired = Arc::clone(&fired);
        held.push(cache.insert_with_deleter(format!("k{i}"), i, 1, move |_, _| {
            *fired.lock() += 1;
        }));
    }
    assert_eq!(cache.len(), 4);
    assert_eq!(*fired.lock(), 0);

    let releasers: Vec<_> = held
        .into_iter()
        .map(|handle| thread::spawn(move || handle.release()))
        .collect();
    for releaser in releasers {
        releaser.join().unwrap();
    }

    // Evicted entries die with their last handle
    assert_eq!(*fired.lock(), 12);

    cache.close();
    assert_eq!(*fired.lock(), 16);
}

#[test]
fn concurrent_readers_and_writers_respect_capacity() {
    init_tracing();
    let cache = Arc::new(LruCache::new(32));

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..500u64 {
                    let key = format!("key_{}", (i * 7 + t) % 64);
                    match i % 5 {
                        0 => cache.set(key, i, 1 + i % 3),
                        1 => {
                            cache.erase(&key);
                        }
                        2 => {
                            if let Some(handle) = cache.take(&key) {
                                assert_eq!(handle.key(), key);
                            }
                        }
                        _ => {
                            if let Some(handle) = cache.lookup(&key) {
                                let retained = handle.retain();
                                assert_eq!(retained.value(), handle.value());
                            }
                        }
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let stats = cache.stats();
    assert!(stats.size <= stats.capacity || stats.length == 1);
    assert_eq!(stats.length, cache.keys().len());
    cache.close();
}
