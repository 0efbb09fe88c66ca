//! 热重载桥
//!
//! 把外部的“源码已变化”通知转换为对注册表的失效与强制重载。
//! 注册表不关心变化是如何被检测到的：宿主可以调用 [`HotReloadBridge::invalidate`]，
//! 也可以使用 [`HotReloadBridge::signal`] 返回的单参数通知函数，
//! 或者把变化写入通道交给 [`HotReloadBridge::listen`]。

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::instance::ModuleInstance;
use super::metadata::ModuleConfig;
use super::registry::ModuleRegistry;

/// 源码变化通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceChange {
    /// 所有模块
    All,
    /// 指定 ID 的模块
    Modules(Vec<String>),
    /// 位置发生变化的模块
    Locations(Vec<String>),
}

impl SourceChange {
    /// 指定模块 ID 的变化
    pub fn modules<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SourceChange::Modules(ids.into_iter().map(Into::into).collect())
    }

    /// 变化是否涉及该模块
    pub fn affects(&self, config: &ModuleConfig) -> bool {
        match self {
            SourceChange::All => true,
            SourceChange::Modules(ids) => ids.iter().any(|id| id == &config.id),
            SourceChange::Locations(locations) => {
                locations.iter().any(|location| location == &config.location)
            }
        }
    }
}

/// 热重载桥
#[derive(Debug, Clone)]
pub struct HotReloadBridge {
    registry: ModuleRegistry,
}

impl HotReloadBridge {
    /// 为注册表创建热重载桥
    pub fn new(registry: ModuleRegistry) -> Self {
        Self { registry }
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.registry.config().enable_hot_reload
    }

    /// 使指定模块失效并重新加载
    ///
    /// 只处理已加载且声明了 `hot_reload` 的模块，按依赖顺序逐个强制重载。
    /// 未启用热重载时不做任何事。返回重载后的实例。
    pub async fn invalidate(&self, ids: &[String]) -> Vec<ModuleInstance> {
        self.apply(SourceChange::Modules(ids.to_vec())).await
    }

    /// 处理一次源码变化
    pub async fn apply(&self, change: SourceChange) -> Vec<ModuleInstance> {
        if !self.is_enabled() {
            debug!("热重载未启用，忽略源码变化");
            return Vec::new();
        }

        let targets = self.registry.hot_reload_targets(&change);
        if targets.is_empty() {
            debug!(?change, "没有需要热重载的模块");
            return Vec::new();
        }

        info!(modules = ?targets, "热重载模块");
        let mut reloaded = Vec::with_capacity(targets.len());
        for id in &targets {
            self.registry.invalidate_cache_entry(id);
            if let Some(instance) = self.registry.load_module(id, true).await {
                reloaded.push(instance);
            }
        }
        reloaded
    }

    /// 返回单参数通知函数
    ///
    /// 通知函数在当前 tokio 运行时中异步处理变化；没有运行时时记录告警并丢弃。
    pub fn signal(&self) -> impl Fn(SourceChange) + Send + Sync + 'static {
        let bridge = self.clone();
        move |change: SourceChange| match Handle::try_current() {
            Ok(handle) => {
                let bridge = bridge.clone();
                handle.spawn(async move {
                    bridge.apply(change).await;
                });
            }
            Err(_) => warn!(?change, "没有可用的运行时，丢弃热重载通知"),
        }
    }

    /// 持续消费通道中的变化，通道关闭后任务结束
    pub fn listen(&self, mut receiver: mpsc::Receiver<SourceChange>) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            while let Some(change) = receiver.recv().await {
                bridge.apply(change).await;
            }
            debug!("热重载通道已关闭");
        })
    }
}
