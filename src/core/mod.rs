//! 核心模块
//!
//! 包含注册表的构造期配置。

pub mod config;

pub use config::{
    DependencyFailurePolicy, LogConfig, RegistryConfig, RegistryConfigBuilder,
};
