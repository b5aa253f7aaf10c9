//! LRU cache of reconstructed paths, keyed by inode identity (§3: "cached in an LRU (capacity
//! 256) keyed by inode identity").

use std::collections::HashMap;

use parking_lot::Mutex;

const DEFAULT_CAPACITY: usize = 256;

struct Inner {
    capacity: usize,
    map: HashMap<u64, String>,
    /// Most-recently-used at the back.
    order: Vec<u64>,
}

/// A small LRU in front of [`super::inode::InodeArena::full_path`], so repeated path lookups for
/// the same inode don't re-walk the parent chain.
pub struct PathCache {
    inner: Mutex<Inner>,
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PathCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        PathCache {
            inner: Mutex::new(Inner {
                capacity,
                map: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn get(&self, inode_id: u64) -> Option<String> {
        let mut inner = self.inner.lock();
        if let Some(path) = inner.map.get(&inode_id).cloned() {
            inner.order.retain(|id| *id != inode_id);
            inner.order.push(inode_id);
            Some(path)
        } else {
            None
        }
    }

    pub fn insert(&self, inode_id: u64, path: String) {
        let mut inner = self.inner.lock();
        if inner.map.insert(inode_id, path).is_none() {
            inner.order.push(inode_id);
        } else {
            inner.order.retain(|id| *id != inode_id);
            inner.order.push(inode_id);
        }
        while inner.order.len() > inner.capacity {
            let evicted = inner.order.remove(0);
            inner.map.remove(&evicted);
        }
    }

    /// Drops a single entry — used when an inode is renamed or removed so stale paths don't
    /// linger.
    pub fn invalidate(&self, inode_id: u64) {
        let mut inner = self.inner.lock();
        inner.map.remove(&inode_id);
        inner.order.retain(|id| *id != inode_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_beyond_capacity() {
        let cache = PathCache::new(2);
        cache.insert(1, "/a".into());
        cache.insert(2, "/b".into());
        cache.insert(3, "/c".into());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn access_refreshes_recency() {
        let cache = PathCache::new(2);
        cache.insert(1, "/a".into());
        cache.insert(2, "/b".into());
        cache.get(1);
        cache.insert(3, "/c".into());
        assert!(cache.get(1).is_some(), "recently accessed, should survive eviction");
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn invalidate_removes_an_entry() {
        let cache = PathCache::new(256);
        cache.insert(1, "/a".into());
        cache.invalidate(1);
        assert!(cache.get(1).is_none());
    }
}
