//! 加载性能监控
//!
//! 收集模块加载耗时、成功/失败次数和各模块的加载历史，
//! 并支持导出为可序列化的性能报告。
//!
//! # 示例
//!
//! ```rust
//! use chips_registry::utils::metrics::LoadMetricsCollector;
//!
//! let collector = LoadMetricsCollector::new();
//! collector.record_load("sales", true, 12);
//! collector.record_load("stock", false, 40);
//!
//! let report = collector.export();
//! assert_eq!(report.total_loads, 2);
//! assert_eq!(report.failed_loads, 1);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 耗时样本的最大数量（防止内存无限增长）
const MAX_LOAD_SAMPLES: usize = 10_000;

/// 默认慢加载告警阈值（毫秒）
pub const DEFAULT_SLOW_LOAD_THRESHOLD_MS: u64 = 1_000;

/// 单个模块的加载统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleLoadStats {
    /// 加载次数
    pub loads: u64,
    /// 失败次数
    pub failures: u64,
    /// 最近一次加载耗时（毫秒）
    pub last_load_ms: u64,
    /// 累计加载耗时（毫秒）
    pub total_load_ms: u64,
}

impl ModuleLoadStats {
    /// 平均加载耗时（毫秒），没有记录时为 0
    pub fn average_load_ms(&self) -> f64 {
        if self.loads == 0 {
            0.0
        } else {
            self.total_load_ms as f64 / self.loads as f64
        }
    }
}

/// 性能报告
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// 报告生成时间
    pub timestamp: Option<DateTime<Utc>>,
    /// 加载总次数
    pub total_loads: u64,
    /// 成功次数
    pub successful_loads: u64,
    /// 失败次数
    pub failed_loads: u64,
    /// 成功率（0.0 到 1.0，无记录时为 0）
    pub success_rate: f64,
    /// 平均耗时（毫秒）
    pub avg_load_ms: u64,
    /// 最小耗时（毫秒）
    pub min_load_ms: u64,
    /// 最大耗时（毫秒）
    pub max_load_ms: u64,
    /// P50 耗时（毫秒）
    pub p50_load_ms: u64,
    /// P95 耗时（毫秒）
    pub p95_load_ms: u64,
    /// 最慢的模块 ID
    pub slowest_module: Option<String>,
    /// 各模块统计
    pub modules: HashMap<String, ModuleLoadStats>,
}

/// 加载指标收集器
///
/// 计数器使用 `AtomicU64`，耗时样本与各模块统计使用 `Mutex` 保护。
#[derive(Debug)]
pub struct LoadMetricsCollector {
    total_count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_load_ms: AtomicU64,
    min_load_ms: AtomicU64,
    max_load_ms: AtomicU64,

    /// 耗时样本 - 用于计算百分位数
    samples: Mutex<Vec<u64>>,

    /// 各模块统计：module_id -> ModuleLoadStats
    per_module: Mutex<HashMap<String, ModuleLoadStats>>,

    /// 慢加载告警阈值（毫秒）
    slow_threshold_ms: u64,
}

impl LoadMetricsCollector {
    /// 创建新的指标收集器
    pub fn new() -> Self {
        Self::with_slow_threshold(DEFAULT_SLOW_LOAD_THRESHOLD_MS)
    }

    /// 使用自定义慢加载阈值创建
    pub fn with_slow_threshold(slow_threshold_ms: u64) -> Self {
        Self {
            total_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_load_ms: AtomicU64::new(0),
            min_load_ms: AtomicU64::new(u64::MAX),
            max_load_ms: AtomicU64::new(0),
            samples: Mutex::new(Vec::with_capacity(256)),
            per_module: Mutex::new(HashMap::new()),
            slow_threshold_ms,
        }
    }

    /// 记录一次加载结果
    ///
    /// # 参数
    ///
    /// * `module_id` - 模块 ID
    /// * `success` - 是否加载成功
    /// * `load_ms` - 加载耗时（毫秒）
    pub fn record_load(&self, module_id: &str, success: bool, load_ms: u64) {
        self.total_count.fetch_add(1, Ordering::Relaxed);
        self.total_load_ms.fetch_add(load_ms, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }

        self.min_load_ms.fetch_min(load_ms, Ordering::Relaxed);
        self.max_load_ms.fetch_max(load_ms, Ordering::Relaxed);

        if load_ms > self.slow_threshold_ms {
            warn!(
                module_id = %module_id,
                duration_ms = load_ms,
                threshold_ms = self.slow_threshold_ms,
                "模块加载耗时超过阈值"
            );
        }

        if let Ok(mut samples) = self.samples.lock() {
            // 滑动窗口：超过上限时丢弃较早的一半
            if samples.len() >= MAX_LOAD_SAMPLES {
                let half = samples.len() / 2;
                samples.drain(0..half);
            }
            samples.push(load_ms);
        }

        if let Ok(mut per_module) = self.per_module.lock() {
            let stats = per_module.entry(module_id.to_string()).or_default();
            stats.loads += 1;
            if !success {
                stats.failures += 1;
            }
            stats.last_load_ms = load_ms;
            stats.total_load_ms += load_ms;
        }
    }

    /// 计算指定百分位数的加载耗时（最近等级法），没有样本时返回 0
    pub fn percentile(&self, p: f64) -> u64 {
        let p = p.clamp(0.0, 1.0);
        let Ok(samples) = self.samples.lock() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }

        let mut sorted = samples.clone();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
        sorted[idx.min(sorted.len() - 1)]
    }

    /// 加载总次数
    pub fn total_loads(&self) -> u64 {
        self.total_count.load(Ordering::Relaxed)
    }

    /// 失败次数
    pub fn failed_loads(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// 平均加载耗时（毫秒）
    pub fn average_load_ms(&self) -> u64 {
        let total = self.total_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }
        self.total_load_ms.load(Ordering::Relaxed) / total
    }

    /// 单个模块的统计
    pub fn module_stats(&self, module_id: &str) -> Option<ModuleLoadStats> {
        self.per_module
            .lock()
            .ok()
            .and_then(|m| m.get(module_id).cloned())
    }

    /// 导出性能报告
    pub fn export(&self) -> PerformanceReport {
        let total = self.total_loads();
        let success = self.success_count.load(Ordering::Relaxed);
        let min = self.min_load_ms.load(Ordering::Relaxed);
        let modules = self
            .per_module
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default();

        let slowest_module = modules
            .iter()
            .max_by(|a, b| {
                a.1.average_load_ms()
                    .partial_cmp(&b.1.average_load_ms())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| id.clone());

        PerformanceReport {
            timestamp: Some(Utc::now()),
            total_loads: total,
            successful_loads: success,
            failed_loads: self.failed_loads(),
            success_rate: if total == 0 {
                0.0
            } else {
                success as f64 / total as f64
            },
            avg_load_ms: self.average_load_ms(),
            min_load_ms: if min == u64::MAX { 0 } else { min },
            max_load_ms: self.max_load_ms.load(Ordering::Relaxed),
            p50_load_ms: self.percentile(0.50),
            p95_load_ms: self.percentile(0.95),
            slowest_module,
            modules,
        }
    }

    /// 重置所有统计数据
    pub fn reset(&self) {
        self.total_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.total_load_ms.store(0, Ordering::Relaxed);
        self.min_load_ms.store(u64::MAX, Ordering::Relaxed);
        self.max_load_ms.store(0, Ordering::Relaxed);
        if let Ok(mut samples) = self.samples.lock() {
            samples.clear();
        }
        if let Ok(mut per_module) = self.per_module.lock() {
            per_module.clear();
        }
    }
}

impl Default for LoadMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collector() {
        let collector = LoadMetricsCollector::new();
        let report = collector.export();

        assert_eq!(report.total_loads, 0);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.min_load_ms, 0);
        assert_eq!(report.p95_load_ms, 0);
        assert!(report.slowest_module.is_none());
    }

    #[test]
    fn test_record_load() {
        let collector = LoadMetricsCollector::new();
        collector.record_load("a", true, 10);
        collector.record_load("a", true, 30);
        collector.record_load("b", false, 50);

        let report = collector.export();
        assert_eq!(report.total_loads, 3);
        assert_eq!(report.successful_loads, 2);
        assert_eq!(report.failed_loads, 1);
        assert_eq!(report.min_load_ms, 10);
        assert_eq!(report.max_load_ms, 50);
        assert_eq!(report.avg_load_ms, 30);
        assert_eq!(report.slowest_module.as_deref(), Some("b"));

        let a = collector.module_stats("a").unwrap();
        assert_eq!(a.loads, 2);
        assert_eq!(a.last_load_ms, 30);
        assert_eq!(a.average_load_ms(), 20.0);
    }

    #[test]
    fn test_percentile() {
        let collector = LoadMetricsCollector::new();
        for i in 1..=100 {
            collector.record_load("m", true, i);
        }

        assert_eq!(collector.percentile(0.50), 50);
        assert_eq!(collector.percentile(0.95), 95);
        assert_eq!(collector.percentile(1.0), 100);
        assert_eq!(collector.percentile(0.0), 1);
    }

    #[test]
    fn test_sample_window_is_bounded() {
        let collector = LoadMetricsCollector::new();
        for i in 0..(MAX_LOAD_SAMPLES as u64 + 10) {
            collector.record_load("m", true, i % 7);
        }
        assert!(collector.samples.lock().unwrap().len() <= MAX_LOAD_SAMPLES);
        assert_eq!(collector.total_loads(), MAX_LOAD_SAMPLES as u64 + 10);
    }

    #[test]
    fn test_reset() {
        let collector = LoadMetricsCollector::new();
        collector.record_load("m", true, 5);
        collector.reset();

        assert_eq!(collector.total_loads(), 0);
        assert!(collector.module_stats("m").is_none());
        assert_eq!(collector.export().min_load_ms, 0);
    }

    #[test]
    fn test_report_serialization() {
        let collector = LoadMetricsCollector::new();
        collector.record_load("sales", true, 3);

        let json = serde_json::to_value(collector.export()).unwrap();
        assert_eq!(json["total_loads"], 1);
        assert_eq!(json["modules"]["sales"]["loads"], 1);
    }
}
