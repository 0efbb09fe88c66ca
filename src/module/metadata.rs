//! 模块声明定义
//!
//! 定义宿主注册的模块声明（ModuleConfig）及其相关的枚举类型。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// 模块优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulePriority {
    /// 关键模块
    Critical,
    /// 高优先级
    High,
    /// 普通优先级（默认）
    #[default]
    Normal,
    /// 低优先级
    Low,
}

impl ModulePriority {
    /// 优先级名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ModulePriority::Critical => "critical",
            ModulePriority::High => "high",
            ModulePriority::Normal => "normal",
            ModulePriority::Low => "low",
        }
    }
}

impl fmt::Display for ModulePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模块实例状态
///
/// ```text
/// unregistered -> loading -> {loaded, error}
/// loaded -> reloading -> {loaded, error}
/// {loaded, error} -> unloaded -> loading
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    /// 尚未创建实例
    #[default]
    Unregistered,
    /// 正在加载
    Loading,
    /// 已加载
    Loaded,
    /// 加载失败
    Error,
    /// 已卸载（显式卸载或被缓存淘汰）
    Unloaded,
    /// 正在强制重载
    Reloading,
}

impl ModuleStatus {
    /// 状态名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Unregistered => "unregistered",
            ModuleStatus::Loading => "loading",
            ModuleStatus::Loaded => "loaded",
            ModuleStatus::Error => "error",
            ModuleStatus::Unloaded => "unloaded",
            ModuleStatus::Reloading => "reloading",
        }
    }

    /// 是否已落定（loaded 或 error）
    pub fn is_settled(&self) -> bool {
        matches!(self, ModuleStatus::Loaded | ModuleStatus::Error)
    }

    /// 是否处于加载过程中
    pub fn is_pending(&self) -> bool {
        matches!(self, ModuleStatus::Loading | ModuleStatus::Reloading)
    }

    /// 是否可以卸载
    pub fn can_unload(&self) -> bool {
        matches!(
            self,
            ModuleStatus::Loaded | ModuleStatus::Error | ModuleStatus::Unloaded
        )
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解析策略
///
/// 由模块声明的 `lazy` 与 `package_module` 推导，加载器据此分派。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStrategy {
    /// 立即解析内部模块
    Eager,
    /// 延迟到首次激活时再解析
    Lazy,
    /// 按包模块的方式解析（包模块总是立即解析）
    Package,
}

/// 模块声明
///
/// 由宿主提供的不可变声明，以 `id` 为唯一键。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// 模块唯一标识
    pub id: String,

    /// 显示名称
    #[serde(default, alias = "name")]
    pub display_name: String,

    /// 模块描述
    #[serde(default)]
    pub description: String,

    /// 模块版本
    #[serde(default)]
    pub version: String,

    /// 模块分类
    #[serde(default)]
    pub category: String,

    /// 标签
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// 解析适配器可识别的位置
    pub location: String,

    /// 是否延迟解析
    #[serde(default)]
    pub lazy: bool,

    /// 依赖的模块 ID（按声明顺序）
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 优先级
    #[serde(default)]
    pub priority: ModulePriority,

    /// 是否启用
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 是否参与热重载
    #[serde(default)]
    pub hot_reload: bool,

    /// 是否为包模块
    #[serde(default)]
    pub package_module: bool,

    /// 模块声明的权限
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

fn default_true() -> bool {
    true
}

/// 通配权限
pub const WILDCARD_PERMISSION: &str = "*";

impl ModuleConfig {
    /// 创建新的模块声明
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            description: String::new(),
            version: String::new(),
            category: String::new(),
            tags: BTreeSet::new(),
            location: location.into(),
            lazy: false,
            dependencies: vec![],
            priority: ModulePriority::Normal,
            enabled: true,
            hot_reload: false,
            package_module: false,
            permissions: BTreeSet::new(),
        }
    }

    /// 设置显示名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// 设置描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 设置版本
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 设置分类
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// 添加标签
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// 添加依赖
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: ModulePriority) -> Self {
        self.priority = priority;
        self
    }

    /// 添加权限
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// 设置为延迟解析
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// 设置为包模块
    pub fn package(mut self) -> Self {
        self.package_module = true;
        self
    }

    /// 启用热重载
    pub fn hot_reloadable(mut self) -> Self {
        self.hot_reload = true;
        self
    }

    /// 禁用模块
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 推导解析策略
    pub fn strategy(&self) -> ResolutionStrategy {
        if self.package_module {
            ResolutionStrategy::Package
        } else if self.lazy {
            ResolutionStrategy::Lazy
        } else {
            ResolutionStrategy::Eager
        }
    }

    /// 是否声明了指定权限（`*` 匹配全部）
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(WILDCARD_PERMISSION) || self.permissions.contains(permission)
    }

    /// 不区分大小写地匹配名称、描述和标签
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.display_name.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&query))
    }
}
