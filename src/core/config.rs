//! 注册表配置
//!
//! 定义注册表的构造期配置结构和加载逻辑。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::{LogLevel, RegistryError, Result};

/// 依赖失败策略
///
/// 依赖模块落定为 `error` 时，依赖方应如何处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyFailurePolicy {
    /// 记录告警后继续解析依赖方（软依赖）
    #[default]
    Continue,
    /// 依赖失败时依赖方直接进入 error 状态
    Abort,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            file_output: false,
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// 注册表配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 是否启用缓存
    #[serde(default = "default_true")]
    pub enable_cache: bool,

    /// 缓存条目存活时间（毫秒，自最后一次访问起算）
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// 缓存最大条目数
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,

    /// 周期性过期清理间隔（毫秒）
    #[serde(default = "default_sweep_interval_ms")]
    pub cache_sweep_interval_ms: u64,

    /// 是否启用热重载
    #[serde(default = "default_true")]
    pub enable_hot_reload: bool,

    /// 是否启用性能监控
    #[serde(default = "default_true")]
    pub enable_performance_monitoring: bool,

    /// 日志级别
    #[serde(default)]
    pub log_level: LogLevel,

    /// 启动时预加载的模块列表（尽力而为）
    #[serde(default)]
    pub preload_ids: Vec<String>,

    /// 单次加载的超时时间（毫秒），None 表示不限制
    #[serde(default)]
    pub load_timeout_ms: Option<u64>,

    /// 依赖失败策略
    #[serde(default)]
    pub dependency_failure_policy: DependencyFailurePolicy,

    /// 日志输出配置
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_max_cache_size() -> usize {
    50
}

fn default_sweep_interval_ms() -> u64 {
    60 * 1000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            enable_cache: true,
            cache_ttl_ms: default_cache_ttl_ms(),
            max_cache_size: default_max_cache_size(),
            cache_sweep_interval_ms: default_sweep_interval_ms(),
            enable_hot_reload: true,
            enable_performance_monitoring: true,
            log_level: LogLevel::Info,
            preload_ids: vec![],
            load_timeout_ms: None,
            dependency_failure_policy: DependencyFailurePolicy::Continue,
            logging: LogConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// 创建配置构建器
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::new()
    }

    /// 从文件加载配置（`.json` 按 JSON 解析，其余按 YAML 解析）
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await?;
        let mut config = Self::from_str_with_format(&content, is_json_path(&path))?;
        config.config_path = Some(path);
        Ok(config)
    }

    /// 从字符串解析配置
    pub fn from_str_with_format(content: &str, json: bool) -> Result<Self> {
        let config: RegistryConfig = if json {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// 验证配置值
    pub fn validate(&self) -> Result<()> {
        if self.max_cache_size == 0 {
            return Err(RegistryError::InvalidConfigValue {
                key: "max_cache_size".to_string(),
                reason: "缓存容量必须大于 0".to_string(),
            });
        }
        if self.cache_ttl_ms == 0 {
            return Err(RegistryError::InvalidConfigValue {
                key: "cache_ttl_ms".to_string(),
                reason: "缓存存活时间必须大于 0".to_string(),
            });
        }
        if self.load_timeout_ms == Some(0) {
            return Err(RegistryError::InvalidConfigValue {
                key: "load_timeout_ms".to_string(),
                reason: "加载超时必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    /// 缓存存活时间
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// 过期清理间隔
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms.max(1))
    }

    /// 加载超时
    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }

    /// 合并另一个配置（只覆盖非默认值）
    pub fn merge(&mut self, other: RegistryConfig) {
        if !other.enable_cache {
            self.enable_cache = false;
        }
        if other.cache_ttl_ms != default_cache_ttl_ms() {
            self.cache_ttl_ms = other.cache_ttl_ms;
        }
        if other.max_cache_size != default_max_cache_size() {
            self.max_cache_size = other.max_cache_size;
        }
        if !other.enable_hot_reload {
            self.enable_hot_reload = false;
        }
        if !other.enable_performance_monitoring {
            self.enable_performance_monitoring = false;
        }
        if other.log_level != LogLevel::default() {
            self.log_level = other.log_level;
        }
        for id in other.preload_ids {
            if !self.preload_ids.contains(&id) {
                self.preload_ids.push(id);
            }
        }
        if other.load_timeout_ms.is_some() {
            self.load_timeout_ms = other.load_timeout_ms;
        }
        if other.dependency_failure_policy != DependencyFailurePolicy::default() {
            self.dependency_failure_policy = other.dependency_failure_policy;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
    }
}

fn is_json_path(path: &std::path::Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
        }
    }

    /// 启用或禁用缓存
    pub fn enable_cache(mut self, enable: bool) -> Self {
        self.config.enable_cache = enable;
        self
    }

    /// 设置缓存存活时间
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// 设置缓存容量
    pub fn max_cache_size(mut self, size: usize) -> Self {
        self.config.max_cache_size = size;
        self
    }

    /// 设置过期清理间隔
    pub fn cache_sweep_interval(mut self, interval: Duration) -> Self {
        self.config.cache_sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    /// 启用或禁用热重载
    pub fn enable_hot_reload(mut self, enable: bool) -> Self {
        self.config.enable_hot_reload = enable;
        self
    }

    /// 启用或禁用性能监控
    pub fn enable_performance_monitoring(mut self, enable: bool) -> Self {
        self.config.enable_performance_monitoring = enable;
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// 添加预加载模块
    pub fn preload(mut self, id: impl Into<String>) -> Self {
        self.config.preload_ids.push(id.into());
        self
    }

    /// 设置加载超时
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.config.load_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// 设置依赖失败策略
    pub fn dependency_failure_policy(mut self, policy: DependencyFailurePolicy) -> Self {
        self.config.dependency_failure_policy = policy;
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 构建配置
    pub fn build(self) -> RegistryConfig {
        self.config
    }
}
