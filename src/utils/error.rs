//! 模块注册表错误类型定义
//!
//! 本模块定义了注册表中使用的所有错误类型。
//! 已落定的加载错误以 `Arc<RegistryError>` 的形式挂在模块实例上，
//! 以便同一个结果可以同时交给多个并发调用方。

use thiserror::Error;

/// 解析适配器错误
///
/// 由 [`ModuleResolver`](crate::module::resolver::ModuleResolver) 返回，
/// 表示某一个位置无法解析为模块实现。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// 位置不存在
    #[error("位置未找到: '{0}'")]
    NotFound(String),

    /// 解析失败
    #[error("解析 '{location}' 失败: {reason}")]
    Failed {
        /// 解析的位置
        location: String,
        /// 失败原因
        reason: String,
    },
}

impl ResolveError {
    /// 创建解析失败错误
    pub fn failed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolveError::Failed {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// 出错的位置
    pub fn location(&self) -> &str {
        match self {
            ResolveError::NotFound(location) => location,
            ResolveError::Failed { location, .. } => location,
        }
    }
}

/// 模块注册表核心错误类型
#[derive(Error, Debug)]
pub enum RegistryError {
    // ==================== 模块加载错误 ====================

    /// 模块配置未注册
    #[error("模块配置未找到: '{0}'")]
    ConfigNotFound(String),

    /// 模块已禁用
    #[error("模块已禁用: '{0}'")]
    ModuleDisabled(String),

    /// 循环依赖
    #[error("检测到循环依赖: {0}")]
    CircularDependency(String),

    /// 所有解析尝试（主位置 + 回退位置）均失败，保留最初的错误
    #[error("模块解析失败: '{module_id}' - {cause}")]
    ResolutionError {
        /// 模块 ID
        module_id: String,
        /// 主位置上最初的解析错误
        cause: ResolveError,
    },

    /// 依赖模块加载失败
    #[error("模块 '{module_id}' 的依赖 '{dependency}' 加载失败: {reason}")]
    DependencyFailed {
        /// 依赖方模块 ID
        module_id: String,
        /// 失败的依赖 ID
        dependency: String,
        /// 失败原因
        reason: String,
    },

    /// 加载超时
    #[error("模块加载超时: '{module_id}' ({timeout_ms}ms)")]
    Timeout {
        /// 模块 ID
        module_id: String,
        /// 等待时长（毫秒）
        timeout_ms: u64,
    },

    // ==================== 配置错误 ====================

    /// 模块声明无效
    #[error("无效的模块声明: {0}")]
    InvalidConfig(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        /// 配置项名称
        key: String,
        /// 无效原因
        reason: String,
    },

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 注册表操作结果类型别名
pub type Result<T> = std::result::Result<T, RegistryError>;

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    /// 模块配置未注册
    pub const MODULE_CONFIG_NOT_FOUND: &str = "MODULE-001";
    /// 模块已禁用
    pub const MODULE_DISABLED: &str = "MODULE-002";
    /// 循环依赖
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-003";
    /// 依赖加载失败
    pub const MODULE_DEPENDENCY_FAILED: &str = "MODULE-004";
    /// 模块声明无效
    pub const MODULE_INVALID_CONFIG: &str = "MODULE-005";

    // 解析错误 (RESOLVE-xxx)
    /// 解析失败
    pub const RESOLVE_FAILED: &str = "RESOLVE-001";
    /// 加载超时
    pub const RESOLVE_TIMEOUT: &str = "RESOLVE-002";

    // 配置错误 (CONFIG-xxx)
    /// 配置加载失败
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    /// 配置值无效
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 通用错误 (CORE-xxx)
    /// 初始化失败
    pub const CORE_INIT_FAILED: &str = "CORE-001";
    /// 内部错误
    pub const CORE_INTERNAL: &str = "CORE-002";
    /// IO 错误
    pub const CORE_IO: &str = "CORE-003";
}

impl RegistryError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::ConfigNotFound(_) => error_code::MODULE_CONFIG_NOT_FOUND,
            RegistryError::ModuleDisabled(_) => error_code::MODULE_DISABLED,
            RegistryError::CircularDependency(_) => error_code::MODULE_CIRCULAR_DEPENDENCY,
            RegistryError::DependencyFailed { .. } => error_code::MODULE_DEPENDENCY_FAILED,
            RegistryError::InvalidConfig(_) => error_code::MODULE_INVALID_CONFIG,
            RegistryError::ResolutionError { .. } => error_code::RESOLVE_FAILED,
            RegistryError::Timeout { .. } => error_code::RESOLVE_TIMEOUT,
            RegistryError::ConfigLoadFailed(_)
            | RegistryError::Json(_)
            | RegistryError::Yaml(_) => error_code::CONFIG_LOAD_FAILED,
            RegistryError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            RegistryError::InitFailed(_) => error_code::CORE_INIT_FAILED,
            RegistryError::Internal(_) => error_code::CORE_INTERNAL,
            RegistryError::Io(_) => error_code::CORE_IO,
        }
    }

    /// 创建解析错误
    pub fn resolution(module_id: impl Into<String>, cause: ResolveError) -> Self {
        RegistryError::ResolutionError {
            module_id: module_id.into(),
            cause,
        }
    }

    /// 是否为依赖失败的告警
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, RegistryError::DependencyFailed { .. })
    }
}
