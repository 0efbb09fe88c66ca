//! 模块实例
//!
//! 注册表独占的运行期记录：加载状态、实现句柄与访问统计。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::loader::{Implementation, Placeholder};
use super::metadata::{ModuleConfig, ModuleStatus};
use crate::utils::RegistryError;

/// 模块实例
///
/// 克隆开销很小（内部均为 `Arc`），注册表向调用方返回的是快照。
#[derive(Debug, Clone)]
pub struct ModuleInstance {
    /// 模块 ID
    pub id: String,
    /// 加载时使用的模块声明
    pub config: Arc<ModuleConfig>,
    /// 当前状态
    pub status: ModuleStatus,
    /// 实现句柄（加载中与失败时为占位实现）
    pub implementation: Option<Implementation>,
    /// 失败原因，仅在 `status = Error` 时存在
    pub error: Option<Arc<RegistryError>>,
    /// 依赖失败等告警
    pub warnings: Vec<Arc<RegistryError>>,
    /// 加载完成时间
    pub loaded_at: Option<DateTime<Utc>>,
    /// 最后访问时间
    pub last_accessed: DateTime<Utc>,
    /// 访问次数
    pub access_count: u64,
    /// 加载耗时（毫秒）
    pub load_time_ms: Option<u64>,
}

impl ModuleInstance {
    /// 以 loading 状态创建实例，实现为“尚未就绪”占位
    pub(crate) fn loading(config: Arc<ModuleConfig>, placeholder: Implementation) -> Self {
        Self {
            id: config.id.clone(),
            config,
            status: ModuleStatus::Loading,
            implementation: Some(placeholder),
            error: None,
            warnings: Vec::new(),
            loaded_at: None,
            last_accessed: Utc::now(),
            access_count: 0,
            load_time_ms: None,
        }
    }

    /// 是否已加载
    pub fn is_loaded(&self) -> bool {
        self.status == ModuleStatus::Loaded
    }

    /// 是否加载失败
    pub fn is_error(&self) -> bool {
        self.status == ModuleStatus::Error
    }

    /// 当前的占位信息（仅占位实现时存在）
    pub fn placeholder(&self) -> Option<&Placeholder> {
        self.implementation.as_ref().and_then(Implementation::placeholder)
    }

    /// 向下转型为具体组件类型
    pub fn component<T: 'static>(&self) -> Option<&T> {
        self.implementation
            .as_ref()
            .and_then(|i| i.downcast_ref::<T>())
    }

    /// 是否有引用指定依赖的告警
    pub fn has_dependency_warning(&self, dependency_id: &str) -> bool {
        self.warnings.iter().any(|w| {
            matches!(w.as_ref(), RegistryError::DependencyFailed { dependency, .. } if dependency == dependency_id)
        })
    }

    /// 记录一次访问
    pub(crate) fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }
}
