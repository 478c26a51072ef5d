pub mod array_cache;

pub use array_cache::LruArrayCache;

use crate::array::Array;
use crate::branch::Branch;
use crate::interpretation::Interpretation;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Identity of one materialized array.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    pub tree: String,
    pub expression: String,
    pub interpretation: String,
    pub entry_start: u64,
    pub entry_stop: u64,
    pub library: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}-{}:{}",
            self.tree,
            self.expression,
            self.interpretation,
            self.entry_start,
            self.entry_stop,
            self.library
        )
    }
}

/// Key-value store for materialized arrays.
///
/// Implementations synchronize themselves; the pipeline only calls `get`
/// before scheduling and `set` after a call has fully succeeded.
pub trait ArrayCache: Send + Sync + fmt::Debug {
    fn get(&self, key: &CacheKey) -> Option<Array>;

    fn set(&self, key: CacheKey, array: Array);
}

/// Unbounded cache.
impl ArrayCache for Mutex<HashMap<CacheKey, Array>> {
    fn get(&self, key: &CacheKey) -> Option<Array> {
        let store = self.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        store.get(key).cloned()
    }

    fn set(&self, key: CacheKey, array: Array) {
        let mut store = self.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        store.insert(key, array);
    }
}

/// A cache bound to one tree, entry window and library.
#[derive(Clone, Copy, Debug)]
pub struct BranchCache<'a> {
    pub cache: &'a dyn ArrayCache,
    pub tree: &'a str,
    pub entry_start: u64,
    pub entry_stop: u64,
    pub library: &'a str,
}

impl BranchCache<'_> {
    pub fn key(&self, branch: &Branch, interpretation: &dyn Interpretation) -> CacheKey {
        CacheKey {
            tree: self.tree.to_string(),
            expression: branch.object_path().to_string(),
            interpretation: interpretation.cache_key(),
            entry_start: self.entry_start,
            entry_stop: self.entry_stop,
            library: self.library.to_string(),
        }
    }

    pub fn get(&self, branch: &Branch, interpretation: &dyn Interpretation) -> Option<Array> {
        self.cache.get(&self.key(branch, interpretation))
    }

    pub fn set(&self, branch: &Branch, interpretation: &dyn Interpretation, array: Array) {
        self.cache.set(self.key(branch, interpretation), array);
    }
}
