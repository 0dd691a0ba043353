//! 元数据缓存
//!
//! 按等价集缓存行数估算，缓存项带有写入时的元数据纪元；
//! 纪元变化后（有新的注册）旧缓存项视为失效并重新计算。

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::query::planner::plan::SetId;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct CachedRowCount {
    epoch: u64,
    rows: f64,
}

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
}

#[derive(Debug)]
pub struct RowCountCache {
    cache: Mutex<LruCache<SetId, CachedRowCount>>,
    stats: Mutex<CacheStats>,
}

impl Default for RowCountCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RowCountCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// 读取当前纪元下的缓存值
    pub fn get(&self, set: SetId, epoch: u64) -> Option<f64> {
        let mut cache = self.cache.lock();
        let mut stats = self.stats.lock();
        match cache.get(&set).copied() {
            Some(entry) if entry.epoch == epoch => {
                stats.hits += 1;
                Some(entry.rows)
            }
            Some(_) => {
                stats.stale += 1;
                cache.pop(&set);
                None
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, set: SetId, epoch: u64, rows: f64) {
        self.cache.lock().put(set, CachedRowCount { epoch, rows });
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_epoch_is_recomputed() {
        let cache = RowCountCache::new(8);
        cache.put(SetId(1), 3, 42.0);
        assert_eq!(cache.get(SetId(1), 3), Some(42.0));
        assert_eq!(cache.get(SetId(1), 4), None);
        assert_eq!(cache.get(SetId(1), 3), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = RowCountCache::new(2);
        cache.put(SetId(0), 0, 1.0);
        cache.put(SetId(1), 0, 2.0);
        assert_eq!(cache.get(SetId(0), 0), Some(1.0));
        cache.put(SetId(2), 0, 3.0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(SetId(1), 0), None);
        assert_eq!(cache.get(SetId(0), 0), Some(1.0));
    }
}
