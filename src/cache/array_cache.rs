use super::{ArrayCache, CacheKey};
use crate::array::Array;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

struct CacheEntry {
    array: Arc<Array>,
    used_time: u64,
    nbytes: usize,
}

#[derive(Default)]
struct LruState {
    store: HashMap<CacheKey, CacheEntry>,
    lru_queue: BTreeSet<(u64, CacheKey)>,
    clock: u64,
    current_bytes: usize,
}

/// Least-recently-used array cache bounded by the bytes of the arrays it holds.
///
/// An array larger than the whole limit is never stored.
pub struct LruArrayCache {
    limit_bytes: usize,
    state: Mutex<LruState>,
}

impl LruArrayCache {
    pub fn new(limit_bytes: usize) -> Self {
        LruArrayCache {
            limit_bytes,
            state: Mutex::new(LruState::default()),
        }
    }

    pub fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }

    pub fn current_bytes(&self) -> usize {
        self.lock().current_bytes
    }

    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().store.contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LruState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict(&mut self, key: &CacheKey) {
        if let Some(entry) = self.store.remove(key) {
            self.lru_queue.remove(&(entry.used_time, key.clone()));
            self.current_bytes -= entry.nbytes;
        }
    }
}

impl ArrayCache for LruArrayCache {
    fn get(&self, key: &CacheKey) -> Option<Array> {
        let mut state = self.lock();
        let used_time = state.tick();
        let entry = state.store.get_mut(key)?;
        let previous = std::mem::replace(&mut entry.used_time, used_time);
        let array = Arc::clone(&entry.array);
        state.lru_queue.remove(&(previous, key.clone()));
        state.lru_queue.insert((used_time, key.clone()));
        trace!(%key, "array cache hit");
        Some(array.as_ref().clone())
    }

    fn set(&self, key: CacheKey, array: Array) {
        let nbytes = array.nbytes();
        if nbytes > self.limit_bytes {
            debug!(%key, nbytes, limit = self.limit_bytes, "array too large to cache");
            return;
        }

        let mut state = self.lock();
        state.evict(&key);
        while state.current_bytes + nbytes > self.limit_bytes {
            let Some((_, oldest)) = state.lru_queue.iter().next().cloned() else {
                break;
            };
            debug!(key = %oldest, "evicting array");
            state.evict(&oldest);
        }

        let used_time = state.tick();
        state.current_bytes += nbytes;
        state.lru_queue.insert((used_time, key.clone()));
        state.store.insert(
            key,
            CacheEntry {
                array: Arc::new(array),
                used_time,
                nbytes,
            },
        );
    }
}

impl fmt::Debug for LruArrayCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("LruArrayCache")
            .field("limit_bytes", &self.limit_bytes)
            .field("current_bytes", &state.current_bytes)
            .field("len", &state.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey {
            tree: "t".to_string(),
            expression: name.to_string(),
            interpretation: "AsDtype(>i8)".to_string(),
            entry_start: 0,
            entry_stop: 4,
            library: "arrays".to_string(),
        }
    }

    fn array() -> Array {
        Array::Int64(vec![1, 2, 3, 4])
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruArrayCache::new(64);
        cache.set(key("a"), array());
        cache.set(key("b"), array());
        assert!(cache.get(&key("a")).is_some());

        cache.set(key("c"), array());
        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.current_bytes(), 64);
    }

    #[test]
    fn replacing_a_key_does_not_double_count() {
        let cache = LruArrayCache::new(1024);
        cache.set(key("a"), array());
        cache.set(key("a"), array());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_bytes(), 32);
    }

    #[test]
    fn oversized_arrays_are_skipped() {
        let cache = LruArrayCache::new(8);
        cache.set(key("a"), array());
        assert!(cache.is_empty());
    }
}
