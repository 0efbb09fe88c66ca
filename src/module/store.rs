//! 模块声明存储
//!
//! 以 ID 为唯一键保存已注册的模块声明，重复注册时后写者胜出。
//! 查询方法都是对 [`ConfigStore::all`] 的纯过滤，结果按注册顺序排列。

use std::collections::HashMap;
use std::sync::Arc;

use super::metadata::{ModuleConfig, ModulePriority};

/// 注册结果
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// 新注册
    Inserted,
    /// 替换了已有声明，附带旧声明
    Replaced(Arc<ModuleConfig>),
}

/// 模块声明存储
#[derive(Debug, Default, Clone)]
pub struct ConfigStore {
    configs: HashMap<String, Arc<ModuleConfig>>,
    /// 注册顺序
    order: Vec<String>,
}

impl ConfigStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册或替换声明，总是成功
    pub fn register(&mut self, config: ModuleConfig) -> RegisterOutcome {
        let id = config.id.clone();
        match self.configs.insert(id.clone(), Arc::new(config)) {
            Some(previous) => RegisterOutcome::Replaced(previous),
            None => {
                self.order.push(id);
                RegisterOutcome::Inserted
            }
        }
    }

    /// 移除声明，不存在时返回 None
    pub fn unregister(&mut self, module_id: &str) -> Option<Arc<ModuleConfig>> {
        let removed = self.configs.remove(module_id)?;
        self.order.retain(|id| id != module_id);
        Some(removed)
    }

    /// 获取声明
    pub fn get(&self, module_id: &str) -> Option<Arc<ModuleConfig>> {
        self.configs.get(module_id).cloned()
    }

    /// 是否已注册
    pub fn contains(&self, module_id: &str) -> bool {
        self.configs.contains_key(module_id)
    }

    /// 所有声明（注册顺序）
    pub fn all(&self) -> Vec<Arc<ModuleConfig>> {
        self.order
            .iter()
            .filter_map(|id| self.configs.get(id).cloned())
            .collect()
    }

    /// 按分类过滤
    pub fn by_category(&self, category: &str) -> Vec<Arc<ModuleConfig>> {
        self.filter(|c| c.category == category)
    }

    /// 按优先级过滤
    pub fn by_priority(&self, priority: ModulePriority) -> Vec<Arc<ModuleConfig>> {
        self.filter(|c| c.priority == priority)
    }

    /// 在名称、描述和标签中不区分大小写地搜索
    pub fn search(&self, query: &str) -> Vec<Arc<ModuleConfig>> {
        self.filter(|c| c.matches_query(query))
    }

    /// 已启用的声明
    pub fn enabled_only(&self) -> Vec<Arc<ModuleConfig>> {
        self.filter(|c| c.enabled)
    }

    /// 所有模块 ID
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// 声明数量
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    fn filter(&self, predicate: impl Fn(&ModuleConfig) -> bool) -> Vec<Arc<ModuleConfig>> {
        self.all().into_iter().filter(|c| predicate(c)).collect()
    }
}
