//! 模块缓存
//!
//! 使用 LRU 算法保存已落定（loaded 或 error）的模块，
//! 并支持基于最后访问时间的 TTL 过期清理。
//! 缓存本身不加锁，由注册表在持有状态锁时调用。

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;

/// 缓存条目
#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    last_accessed: Instant,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// 缓存条目数量
    pub size: usize,
    /// 缓存容量
    pub capacity: usize,
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 命中率（0.0 到 1.0）
    pub efficiency: f64,
}

/// 模块缓存
#[derive(Debug)]
pub struct ModuleCache {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl ModuleCache {
    /// 创建指定容量的缓存（容量至少为 1）
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// 插入或刷新条目
    ///
    /// 插入新条目会超出容量时，先淘汰最久未访问的条目，并返回其 ID。
    pub fn insert(&mut self, module_id: &str) -> Option<String> {
        let entry = CacheEntry {
            last_accessed: Instant::now(),
        };
        match self.entries.push(module_id.to_string(), entry) {
            Some((evicted, _)) if evicted != module_id => Some(evicted),
            _ => None,
        }
    }

    /// 更新条目的访问时间，条目不存在时返回 false
    pub fn touch(&mut self, module_id: &str) -> bool {
        match self.entries.get_mut(module_id) {
            Some(entry) => {
                entry.last_accessed = Instant::now();
                true
            }
            None => false,
        }
    }

    /// 是否包含条目
    pub fn contains(&self, module_id: &str) -> bool {
        self.entries.contains(module_id)
    }

    /// 条目自最后访问起是否已超过 `ttl`（不存在的条目视为未过期）
    pub fn is_expired(&self, module_id: &str, ttl: Duration) -> bool {
        self.entries
            .peek(module_id)
            .map(|entry| entry.last_accessed.elapsed() > ttl)
            .unwrap_or(false)
    }

    /// 移除条目
    pub fn remove(&mut self, module_id: &str) -> bool {
        self.entries.pop(module_id).is_some()
    }

    /// 清理所有过期条目，返回被清理的 ID
    pub fn sweep_expired(&mut self, ttl: Duration) -> Vec<String> {
        self.sweep_expired_at(ttl, Instant::now())
    }

    fn sweep_expired_at(&mut self, ttl: Duration, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_accessed) > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.entries.pop(id);
        }
        expired
    }

    /// 清空缓存，返回被移除的 ID
    pub fn clear(&mut self) -> Vec<String> {
        let ids: Vec<String> = self.entries.iter().map(|(id, _)| id.clone()).collect();
        self.entries.clear();
        ids
    }

    /// 记录一次命中
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    /// 记录一次未命中
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// 命中率：`hits / (hits + misses)`，没有任何记录时为 0
    pub fn efficiency(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// 当前条目数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 缓存容量
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity(),
            hits: self.hits,
            misses: self.misses,
            efficiency: self.efficiency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_efficiency_without_traffic() {
        let cache = ModuleCache::new(4);
        assert_eq!(cache.efficiency(), 0.0);
        assert!(!cache.efficiency().is_nan());
    }

    #[test]
    fn test_efficiency() {
        let mut cache = ModuleCache::new(4);
        cache.record_hit();
        cache.record_hit();
        cache.record_hit();
        cache.record_miss();
        assert_eq!(cache.efficiency(), 0.75);
        assert_eq!(cache.stats().hits, 3);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = ModuleCache::new(2);
        assert_eq!(cache.insert("a"), None);
        assert_eq!(cache.insert("b"), None);

        // 访问 a，使 b 成为最久未访问的条目
        assert!(cache.touch("a"));

        assert_eq!(cache.insert("c"), Some("b".to_string()));
        assert!(cache.contains("a"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_does_not_evict() {
        let mut cache = ModuleCache::new(2);
        cache.insert("a");
        cache.insert("b");
        assert_eq!(cache.insert("a"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = ModuleCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_sweep_expired() {
        let mut cache = ModuleCache::new(4);
        cache.insert("old");
        cache.insert("new");

        let later = Instant::now() + Duration::from_secs(10);
        let expired = cache.sweep_expired_at(Duration::from_secs(5), later);
        assert_eq!(expired.len(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_keeps_fresh_entries() {
        let mut cache = ModuleCache::new(4);
        cache.insert("fresh");
        assert!(cache.sweep_expired(Duration::from_secs(60)).is_empty());
        assert!(!cache.is_expired("fresh", Duration::from_secs(60)));
        assert!(!cache.is_expired("absent", Duration::ZERO));
    }

    #[test]
    fn test_clear() {
        let mut cache = ModuleCache::new(4);
        cache.insert("a");
        cache.insert("b");

        let mut cleared = cache.clear();
        cleared.sort();
        assert_eq!(cleared, vec!["a", "b"]);
        assert!(cache.is_empty());
        assert!(!cache.remove("a"));
    }
}
