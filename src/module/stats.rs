//! 注册表统计

use std::collections::BTreeMap;

use serde::Serialize;

use super::cache::CacheStats;
use super::metadata::{ModuleConfig, ModuleStatus};

/// 注册表统计信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryStats {
    /// 已注册模块数量
    pub total_modules: usize,
    /// 已加载模块数量
    pub loaded_modules: usize,
    /// 按状态统计（未创建实例的模块计为 unregistered）
    pub by_status: BTreeMap<String, usize>,
    /// 按分类统计
    pub by_category: BTreeMap<String, usize>,
    /// 按优先级统计
    pub by_priority: BTreeMap<String, usize>,
    /// 依赖图节点数量
    pub dependency_graph_size: usize,
    /// 缓存条目数量
    pub cache_size: usize,
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 缓存命中率
    pub efficiency: f64,
}

impl RegistryStats {
    /// 汇总统计
    ///
    /// `modules` 为每个已注册模块的声明及其当前状态。
    pub(crate) fn collect<'a>(
        modules: impl IntoIterator<Item = (&'a ModuleConfig, ModuleStatus)>,
        dependency_graph_size: usize,
        cache: CacheStats,
    ) -> Self {
        let mut stats = RegistryStats {
            dependency_graph_size,
            cache_size: cache.size,
            hits: cache.hits,
            misses: cache.misses,
            efficiency: cache.efficiency,
            ..Default::default()
        };

        for (config, status) in modules {
            stats.total_modules += 1;
            if status == ModuleStatus::Loaded {
                stats.loaded_modules += 1;
            }
            *stats.by_status.entry(status.to_string()).or_default() += 1;
            *stats.by_category.entry(config.category.clone()).or_default() += 1;
            *stats.by_priority.entry(config.priority.to_string()).or_default() += 1;
        }

        stats
    }

    /// 指定状态的模块数量
    pub fn count_with_status(&self, status: ModuleStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::ModulePriority;

    #[test]
    fn test_collect() {
        let a = ModuleConfig::new("a", "./a").with_category("business");
        let b = ModuleConfig::new("b", "./b")
            .with_category("business")
            .with_priority(ModulePriority::Critical);
        let c = ModuleConfig::new("c", "./c").with_category("admin");

        let stats = RegistryStats::collect(
            vec![
                (&a, ModuleStatus::Loaded),
                (&b, ModuleStatus::Error),
                (&c, ModuleStatus::Unregistered),
            ],
            3,
            CacheStats {
                size: 2,
                capacity: 10,
                hits: 1,
                misses: 3,
                efficiency: 0.25,
            },
        );

        assert_eq!(stats.total_modules, 3);
        assert_eq!(stats.loaded_modules, 1);
        assert_eq!(stats.count_with_status(ModuleStatus::Error), 1);
        assert_eq!(stats.count_with_status(ModuleStatus::Reloading), 0);
        assert_eq!(stats.by_category["business"], 2);
        assert_eq!(stats.by_priority["critical"], 1);
        assert_eq!(stats.by_priority["normal"], 2);
        assert_eq!(stats.dependency_graph_size, 3);
        assert_eq!(stats.cache_size, 2);
        assert_eq!(stats.efficiency, 0.25);
    }

    #[test]
    fn test_empty_stats_are_not_nan() {
        let stats = RegistryStats::collect(Vec::new(), 0, CacheStats::default());
        assert_eq!(stats.efficiency, 0.0);
        assert_eq!(stats.total_modules, 0);
    }
}
