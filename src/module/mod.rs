//! 模块注册表子系统
//!
//! 包含动态模块注册表的全部组件（由底层到上层）：
//! - 模块声明与状态定义
//! - 声明存储与依赖图
//! - 解析适配器接口与加载器
//! - 缓存、统计与热重载
//! - 注册表本身

pub mod cache;
pub mod dependency;
pub mod hot_reload;
pub mod instance;
pub mod loader;
pub mod metadata;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod stats;
pub mod store;

// 重导出常用类型
pub use cache::{CacheStats, ModuleCache};
pub use dependency::{DependencyGraph, GraphReport};
pub use hot_reload::{HotReloadBridge, SourceChange};
pub use instance::ModuleInstance;
pub use loader::{
    fallback_locations, DeferredHandle, FallbackFactory, Implementation, ModuleLoader, Placeholder,
};
pub use metadata::{ModuleConfig, ModulePriority, ModuleStatus, ResolutionStrategy};
pub use parser::ManifestParser;
pub use registry::{ModuleRegistry, ModuleRegistryBuilder, RegistryCallbacks};
pub use resolver::{ComponentHandle, FileComponent, FsResolver, ModuleResolver, StaticResolver};
pub use stats::RegistryStats;
pub use store::{ConfigStore, RegisterOutcome};
