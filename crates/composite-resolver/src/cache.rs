//! Compute-once cache keyed by composite type
//!
//! Each key gets its own `OnceLock`. The map lock is held only long enough
//! to fetch or create that cell, so resolving one key never blocks another,
//! while concurrent callers for the same key wait for the single
//! computation and all observe its result.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

#[derive(Debug)]
pub struct ResolutionCache<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceLock<V>>>>,
    computations: AtomicUsize,
}

impl<K, V> Default for ResolutionCache<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            computations: AtomicUsize::new(0),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> ResolutionCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing it exactly once.
    ///
    /// `compute` must not request the same key again.
    pub fn get_or_compute(&self, key: &K, compute: impl FnOnce() -> V) -> V {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            cells.entry(key.clone()).or_default().clone()
        };

        cell.get_or_init(|| {
            self.computations.fetch_add(1, Ordering::SeqCst);
            compute()
        })
        .clone()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of computations run so far
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_computes_once_per_key() {
        let cache: ResolutionCache<&str, usize> = ResolutionCache::new();
        assert_eq!(cache.get_or_compute(&"a", || 1), 1);
        assert_eq!(cache.get_or_compute(&"a", || 2), 1);
        assert_eq!(cache.get_or_compute(&"b", || 3), 3);
        assert_eq!(cache.computations(), 2);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), None);
    }

    #[test]
    fn test_concurrent_callers_share_one_computation() {
        let cache: Arc<ResolutionCache<String, Arc<String>>> = Arc::new(ResolutionCache::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache.get_or_compute(&"key".to_string(), || {
                        thread::sleep(std::time::Duration::from_millis(20));
                        Arc::new("value".to_string())
                    })
                })
            })
            .collect();

        let results: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.computations(), 1);
        for result in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], result));
        }
    }

    #[test]
    fn test_failures_are_cached() {
        let cache: ResolutionCache<&str, Result<u32, String>> = ResolutionCache::new();
        let first = cache.get_or_compute(&"bad", || Err("broken".to_string()));
        let second = cache.get_or_compute(&"bad", || Ok(7));
        assert_eq!(first, second);
        assert_eq!(cache.computations(), 1);
    }
}
