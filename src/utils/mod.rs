//! 工具模块
//!
//! 包含错误类型、标识符工具、日志系统与加载性能监控。

pub mod error;
pub mod id;
pub mod logger;
pub mod metrics;

// 重导出常用类型
pub use error::{error_code, RegistryError, ResolveError, Result};
pub use id::{generate_operation_id, is_valid_module_id};
pub use logger::{fields, LogGuard, LogLevel, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use metrics::{LoadMetricsCollector, ModuleLoadStats, PerformanceReport};
