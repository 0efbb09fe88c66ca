//! # Chips Registry - 动态模块注册表
//!
//! 在运行期注册可插拔的功能模块，并按需解析其实现：
//!
//! - **声明管理**: 以 ID 为唯一键注册模块声明，支持按分类、优先级、标签查询
//! - **依赖图**: 循环依赖检测、加载顺序计算、悬空依赖校验
//! - **加载协调**: 同一模块的并发加载只触发一次解析，支持强制重载与超时
//! - **缓存**: LRU + TTL 淘汰，命中率统计
//! - **热重载**: 在不重启宿主的前提下使已加载模块失效并重新解析
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_registry::{ModuleConfig, ModuleRegistry, RegistryConfig, StaticResolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = StaticResolver::new()
//!         .with("./modules/stock", "stock-panel")
//!         .with("./modules/sales", "sales-panel");
//!
//!     let registry = ModuleRegistry::builder(Arc::new(resolver))
//!         .config(RegistryConfig::builder().max_cache_size(20).build())
//!         .build()?;
//!
//!     registry.register_module(ModuleConfig::new("stock", "./modules/stock"));
//!     registry.register_module(
//!         ModuleConfig::new("sales", "./modules/sales").with_dependency("stock"),
//!     );
//!     registry.initialize().await?;
//!
//!     let sales = registry.load_module("sales", false).await;
//!     assert!(sales.map(|m| m.is_loaded()).unwrap_or(false));
//!     assert!(registry.is_module_loaded("stock"));
//!
//!     registry.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 注册表子系统
//! - `core` - 注册表配置
//! - `utils` - 错误类型、日志与性能监控

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    ComponentHandle, DependencyGraph, FsResolver, GraphReport, HotReloadBridge, Implementation,
    ManifestParser, ModuleConfig, ModuleInstance, ModulePriority, ModuleRegistry,
    ModuleRegistryBuilder, ModuleResolver, ModuleStatus, Placeholder, RegistryStats,
    ResolutionStrategy, SourceChange, StaticResolver,
};

pub use utils::logger::{fields, LogGuard, LogLevel, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, PerformanceReport, RegistryError, ResolveError, Result};

pub use core::config::{DependencyFailurePolicy, LogConfig, RegistryConfig, RegistryConfigBuilder};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
