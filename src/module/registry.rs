//! 模块注册表
//!
//! 注册表是一个显式持有的上下文对象，负责：
//! - 模块声明的注册、替换与查询
//! - 按依赖关系加载模块，并对同一模块的并发加载请求去重
//! - 已落定模块的 LRU + TTL 缓存
//! - 统计、性能监控与生命周期回调
//!
//! 所有内部状态由一把互斥锁保护，锁只在两次挂起点之间短暂持有，
//! 从不跨越对解析适配器的等待。每个加载操作在独立的 tokio 任务中执行，
//! 调用方超时或被取消不会中断已经开始的解析。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use super::cache::ModuleCache;
use super::dependency::{DependencyGraph, GraphReport};
use super::hot_reload::SourceChange;
use super::instance::ModuleInstance;
use super::loader::{FallbackFactory, Implementation, ModuleLoader, Placeholder};
use super::metadata::{ModuleConfig, ModulePriority, ModuleStatus};
use super::parser::ManifestParser;
use super::resolver::ModuleResolver;
use super::stats::RegistryStats;
use super::store::{ConfigStore, RegisterOutcome};
use crate::core::{DependencyFailurePolicy, RegistryConfig};
use crate::utils::{
    generate_operation_id, LoadMetricsCollector, PerformanceReport, RegistryError, Result,
};

/// 模块加载完成回调
pub type LoadCallback = Arc<dyn Fn(&ModuleInstance) + Send + Sync>;

/// 模块加载失败回调
pub type ErrorCallback = Arc<dyn Fn(&str, &RegistryError) + Send + Sync>;

/// 模块声明更新回调
pub type UpdateCallback = Arc<dyn Fn(&ModuleConfig) + Send + Sync>;

/// 宿主回调
#[derive(Clone, Default)]
pub struct RegistryCallbacks {
    /// 每个成功落定的加载操作触发一次
    pub on_module_load: Option<LoadCallback>,
    /// 每个失败落定的加载操作触发一次
    pub on_module_error: Option<ErrorCallback>,
    /// 已存在的模块被重新注册时触发
    pub on_module_update: Option<UpdateCallback>,
}

/// 共享的加载结果
type SharedLoad = Shared<BoxFuture<'static, ModuleInstance>>;

/// 进行中的加载操作
struct InFlight {
    future: SharedLoad,
    forced: bool,
    /// 排队中的强制重载在前一个操作结束前为 false
    started: Arc<AtomicBool>,
    generation: u64,
}

/// 获取加载结果的方式
enum Acquired {
    /// 缓存命中
    Hit(ModuleInstance),
    /// 等待（新的或已有的）加载操作
    Wait(SharedLoad),
    /// 依赖与请求方构成环且正在加载，不能等待
    CyclicInFlight,
}

/// 依赖加载结果
enum DependencyOutcome {
    Ready,
    Failed(String),
    Cyclic,
}

/// 注册表内部状态
struct RegistryState {
    store: ConfigStore,
    /// 依赖图，声明变化后置为 None，下次使用时重建
    graph: Option<DependencyGraph>,
    instances: HashMap<String, ModuleInstance>,
    cache: ModuleCache,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
}

impl RegistryState {
    fn new(max_cache_size: usize) -> Self {
        Self {
            store: ConfigStore::new(),
            graph: None,
            instances: HashMap::new(),
            cache: ModuleCache::new(max_cache_size),
            in_flight: HashMap::new(),
            next_generation: 0,
        }
    }

    fn graph(&mut self) -> &DependencyGraph {
        let store = &self.store;
        self.graph.get_or_insert_with(|| {
            let configs = store.all();
            DependencyGraph::build(configs.iter().map(|c| c.as_ref()))
        })
    }

    /// 将已落定的实例标记为 unloaded
    fn mark_unloaded(&mut self, module_id: &str) {
        if let Some(instance) = self.instances.get_mut(module_id) {
            if instance.status.is_settled() {
                instance.status = ModuleStatus::Unloaded;
                instance.implementation = None;
                instance.error = None;
            }
        }
    }
}

struct Inner {
    config: RegistryConfig,
    loader: ModuleLoader,
    callbacks: RegistryCallbacks,
    metrics: LoadMetricsCollector,
    state: Mutex<RegistryState>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
}

/// 模块注册表
///
/// 克隆得到的是同一个注册表的句柄。
///
/// # 示例
///
/// ```rust
/// use std::sync::Arc;
/// use chips_registry::module::{ModuleConfig, ModuleRegistry, StaticResolver};
///
/// # #[tokio::main]
/// # async fn main() {
/// let resolver = StaticResolver::new().with("./sales", "sales-panel");
/// let registry = ModuleRegistry::builder(Arc::new(resolver)).build().unwrap();
///
/// registry.register_module(ModuleConfig::new("sales", "./sales"));
/// let instance = registry.load_module("sales", false).await.unwrap();
///
/// assert!(instance.is_loaded());
/// assert_eq!(instance.component::<&str>(), Some(&"sales-panel"));
/// # }
/// ```
#[derive(Clone)]
pub struct ModuleRegistry {
    inner: Arc<Inner>,
}

impl ModuleRegistry {
    /// 使用默认配置创建注册表
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self::from_parts(
            RegistryConfig::default(),
            ModuleLoader::new(resolver),
            RegistryCallbacks::default(),
        )
    }

    /// 创建注册表构建器
    pub fn builder(resolver: Arc<dyn ModuleResolver>) -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::new(resolver)
    }

    fn from_parts(config: RegistryConfig, loader: ModuleLoader, callbacks: RegistryCallbacks) -> Self {
        info!(
            cache = config.enable_cache,
            max_cache_size = config.max_cache_size,
            hot_reload = config.enable_hot_reload,
            "创建模块注册表"
        );
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RegistryState::new(config.max_cache_size)),
                config,
                loader,
                callbacks,
                metrics: LoadMetricsCollector::new(),
                sweep_task: Mutex::new(None),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// 注册表配置
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== 生命周期 ====================

    /// 初始化注册表
    ///
    /// 校验依赖图（问题只记录日志）、启动周期性过期清理，
    /// 并尽力预加载 `preload_ids` 中的模块。
    ///
    /// # 错误
    ///
    /// 重复初始化返回 `InitFailed`。
    pub async fn initialize(&self) -> Result<()> {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return Err(RegistryError::InitFailed("注册表已经初始化".to_string()));
        }

        let report = self.validate_dependencies();
        for (module_id, dependency) in &report.missing {
            warn!(module_id = %module_id, dependency = %dependency, "依赖的模块未注册");
        }

        self.start_sweeper();

        let preload = self.inner.config.preload_ids.clone();
        if !preload.is_empty() {
            info!(count = preload.len(), "预加载模块");
            let results = future::join_all(preload.iter().map(|id| self.load_module(id, false))).await;
            let loaded = results
                .iter()
                .filter(|r| r.as_ref().map(|i| i.is_loaded()).unwrap_or(false))
                .count();
            info!(loaded, requested = preload.len(), "预加载完成");
        }

        info!("模块注册表初始化完成");
        Ok(())
    }

    /// 关闭注册表：停止过期清理任务并清空缓存
    pub fn shutdown(&self) {
        let task = self
            .inner
            .sweep_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.clear_cache();
        self.inner.initialized.store(false, Ordering::SeqCst);
        info!("模块注册表已关闭");
    }

    fn start_sweeper(&self) {
        if !self.inner.config.enable_cache {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            debug!("没有可用的运行时，跳过周期性过期清理");
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval();
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 第一次 tick 立即完成
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ModuleRegistry { inner }.sweep_expired();
            }
        });

        let previous = self
            .inner
            .sweep_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    // ==================== 注册 ====================

    /// 注册模块声明
    ///
    /// 相同 ID 的声明会被替换（后写者胜出）。如果该 ID 已有实例，
    /// 会安排一次强制重载；没有运行时时实例被标记为 unloaded，
    /// 下一次加载会重新解析。循环依赖只记录告警，不阻止注册。
    pub fn register_module(&self, config: ModuleConfig) {
        let id = config.id.clone();
        let enabled = config.enabled;
        let update = self.inner.callbacks.on_module_update.clone().map(|cb| (cb, config.clone()));

        let (outcome, has_instance, cycles) = {
            let mut state = self.lock_state();
            let outcome = state.store.register(config);
            state.graph = None;
            let has_instance = state
                .instances
                .get(&id)
                .map(|i| i.status != ModuleStatus::Unloaded)
                .unwrap_or(false);
            let cycles: Vec<Vec<String>> = state
                .graph()
                .detect_cycles()
                .into_iter()
                .filter(|c| c.contains(&id))
                .collect();
            (outcome, has_instance, cycles)
        };

        for cycle in cycles {
            let err = RegistryError::CircularDependency(cycle.join(" -> "));
            warn!(module_id = %id, error = %err, "注册的模块处于循环依赖中");
        }

        match outcome {
            RegisterOutcome::Inserted => debug!(module_id = %id, "注册模块"),
            RegisterOutcome::Replaced(_) => {
                info!(module_id = %id, "模块声明已更新");
                if let Some((callback, config)) = update {
                    callback(&config);
                }
            }
        }

        if !has_instance {
            return;
        }
        if enabled {
            self.schedule_reload(&id);
        } else {
            let mut state = self.lock_state();
            state.cache.remove(&id);
            state.in_flight.remove(&id);
            if let Some(instance) = state.instances.get_mut(&id) {
                instance.status = ModuleStatus::Unloaded;
                instance.implementation = None;
                instance.error = None;
            }
            debug!(module_id = %id, "模块已禁用，卸载现有实例");
        }
    }

    fn schedule_reload(&self, module_id: &str) {
        match Handle::try_current() {
            Ok(handle) => {
                debug!(module_id = %module_id, "安排强制重载");
                let registry = self.clone();
                let id = module_id.to_string();
                handle.spawn(async move {
                    registry.load_module(&id, true).await;
                });
            }
            Err(_) => {
                let mut state = self.lock_state();
                state.cache.remove(module_id);
                state.mark_unloaded(module_id);
            }
        }
    }

    /// 从清单文件注册所有模块，返回注册数量
    pub async fn register_manifest(&self, path: impl AsRef<Path>) -> Result<usize> {
        let configs = ManifestParser::parse_file(path.as_ref()).await?;
        let count = configs.len();
        for config in configs {
            self.register_module(config);
        }
        info!(path = %path.as_ref().display(), count, "已从清单注册模块");
        Ok(count)
    }

    /// 注销模块：移除声明、实例和缓存条目，不存在时返回 false
    pub fn unregister_module(&self, module_id: &str) -> bool {
        let mut state = self.lock_state();
        if state.store.unregister(module_id).is_none() {
            return false;
        }
        state.graph = None;
        state.instances.remove(module_id);
        state.cache.remove(module_id);
        // 进行中的操作结算时不再写回
        state.in_flight.remove(module_id);
        debug!(module_id = %module_id, "注销模块");
        true
    }

    // ==================== 加载 ====================

    /// 加载模块
    ///
    /// 声明不存在或已禁用时返回 `None`，不会创建实例。
    /// 解析失败时返回 `status = Error` 的实例。
    /// 配置了 `load_timeout_ms` 时，超时同样返回 `None`。
    pub async fn load_module(&self, module_id: &str, force_reload: bool) -> Option<ModuleInstance> {
        match self.try_load_module(module_id, force_reload).await {
            Ok(instance) => Some(instance),
            Err(e) => {
                debug!(module_id = %module_id, error = %e, "模块未加载");
                None
            }
        }
    }

    /// 加载模块，返回带原因的结果
    #[instrument(skip(self), fields(module_id = %module_id))]
    pub async fn try_load_module(&self, module_id: &str, force_reload: bool) -> Result<ModuleInstance> {
        match self.inner.config.load_timeout() {
            Some(timeout) => {
                self.load_module_with_timeout(module_id, force_reload, timeout)
                    .await
            }
            None => self.load_entry(module_id, force_reload).await,
        }
    }

    /// 带超时的加载
    ///
    /// 超时只影响本次调用，底层解析继续进行并最终落定。
    pub async fn load_module_with_timeout(
        &self,
        module_id: &str,
        force_reload: bool,
        timeout: Duration,
    ) -> Result<ModuleInstance> {
        match tokio::time::timeout(timeout, self.load_entry(module_id, force_reload)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(module_id = %module_id, timeout_ms = timeout.as_millis() as u64, "模块加载超时");
                Err(RegistryError::Timeout {
                    module_id: module_id.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn load_entry(&self, module_id: &str, force_reload: bool) -> Result<ModuleInstance> {
        match self.acquire(module_id, force_reload, None)? {
            Acquired::Hit(instance) => Ok(instance),
            Acquired::Wait(pending) => Ok(pending.await),
            Acquired::CyclicInFlight => Err(RegistryError::Internal(format!(
                "模块 '{module_id}' 没有请求方却被判定为循环等待"
            ))),
        }
    }

    /// 在状态锁内决定如何获取结果：缓存命中、加入已有操作或启动新操作
    fn acquire(&self, module_id: &str, force: bool, requester: Option<&str>) -> Result<Acquired> {
        let mut state = self.lock_state();

        let config = state
            .store
            .get(module_id)
            .ok_or_else(|| RegistryError::ConfigNotFound(module_id.to_string()))?;
        if !config.enabled {
            return Err(RegistryError::ModuleDisabled(module_id.to_string()));
        }

        if let Some(requester) = requester {
            if state.in_flight.contains_key(module_id) && state.graph().reaches(module_id, requester) {
                return Ok(Acquired::CyclicInFlight);
            }
        }

        if !force {
            if self.inner.config.enable_cache {
                if let Some(instance) = self.cache_hit(&mut state, module_id) {
                    return Ok(Acquired::Hit(instance));
                }
            }
            state.cache.record_miss();
        }

        let previous = match state.in_flight.get(module_id) {
            Some(op) if !force => return Ok(Acquired::Wait(op.future.clone())),
            Some(op) if op.forced && !op.started.load(Ordering::SeqCst) => {
                return Ok(Acquired::Wait(op.future.clone()));
            }
            Some(op) => Some(op.future.clone()),
            None => None,
        };

        Ok(Acquired::Wait(self.start_operation(&mut state, config, force, previous)))
    }

    fn cache_hit(&self, state: &mut RegistryState, module_id: &str) -> Option<ModuleInstance> {
        let loaded = state
            .instances
            .get(module_id)
            .map(|i| i.status == ModuleStatus::Loaded)
            .unwrap_or(false);
        if !loaded {
            return None;
        }

        if state.cache.is_expired(module_id, self.inner.config.cache_ttl()) {
            debug!(module_id = %module_id, "缓存条目已过期");
            state.cache.remove(module_id);
            state.mark_unloaded(module_id);
            return None;
        }

        state.cache.touch(module_id);
        state.cache.record_hit();
        let instance = state.instances.get_mut(module_id)?;
        instance.touch();
        Some(instance.clone())
    }

    /// 启动新的加载操作；`previous` 不为空时，新操作在其结束后才开始解析
    fn start_operation(
        &self,
        state: &mut RegistryState,
        config: Arc<ModuleConfig>,
        force: bool,
        previous: Option<SharedLoad>,
    ) -> SharedLoad {
        let id = config.id.clone();
        let generation = state.next_generation;
        state.next_generation += 1;

        let current = state.instances.get(&id).map(|i| i.status);
        match current {
            Some(ModuleStatus::Loaded) => {
                if let Some(instance) = state.instances.get_mut(&id) {
                    instance.status = ModuleStatus::Reloading;
                }
            }
            Some(status) if status.is_pending() => {}
            _ => {
                let placeholder = self.inner.loader.placeholder(Placeholder::not_found(&id));
                state
                    .instances
                    .insert(id.clone(), ModuleInstance::loading(config.clone(), placeholder));
            }
        }

        let started = Arc::new(AtomicBool::new(previous.is_none()));
        let op_started = started.clone();
        let registry = self.clone();
        let op_config = config.clone();
        let span = info_span!(
            "load_operation",
            module_id = %id,
            operation_id = %generate_operation_id(),
            force_reload = force
        );
        let task = tokio::spawn(
            async move {
                if let Some(previous) = previous {
                    previous.await;
                    op_started.store(true, Ordering::SeqCst);
                }
                registry.run_load(op_config, generation).await
            }
            .instrument(span),
        );

        let failed_loader = self.inner.loader.clone();
        let shared = async move {
            match task.await {
                Ok(instance) => instance,
                Err(e) => {
                    error!(module_id = %config.id, error = %e, "加载任务异常终止");
                    let err = RegistryError::Internal(e.to_string());
                    let placeholder =
                        failed_loader.placeholder(Placeholder::error(&config.id, err.to_string()));
                    let mut instance = ModuleInstance::loading(config, placeholder);
                    instance.status = ModuleStatus::Error;
                    instance.error = Some(Arc::new(err));
                    instance
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight.insert(
            id,
            InFlight {
                future: shared.clone(),
                forced: force,
                started,
                generation,
            },
        );
        shared
    }

    /// 执行一次加载：先尽力加载依赖，再解析自身实现
    async fn run_load(&self, config: Arc<ModuleConfig>, generation: u64) -> ModuleInstance {
        let id = config.id.clone();
        let started = Instant::now();
        debug!(module_id = %id, dependencies = config.dependencies.len(), "开始加载模块");

        let mut warnings = Vec::new();
        let mut abort = None;
        for dependency in &config.dependencies {
            match self.load_dependency(dependency, &id).await {
                DependencyOutcome::Ready => {}
                DependencyOutcome::Cyclic => {
                    debug!(module_id = %id, dependency = %dependency, "依赖处于循环中，跳过等待");
                    warnings.push(Arc::new(RegistryError::CircularDependency(format!(
                        "{id} -> {dependency}"
                    ))));
                }
                DependencyOutcome::Failed(reason) => {
                    warn!(module_id = %id, dependency = %dependency, reason = %reason, "依赖加载失败");
                    if self.inner.config.dependency_failure_policy == DependencyFailurePolicy::Abort
                        && abort.is_none()
                    {
                        abort = Some(RegistryError::DependencyFailed {
                            module_id: id.clone(),
                            dependency: dependency.clone(),
                            reason: reason.clone(),
                        });
                    }
                    warnings.push(Arc::new(RegistryError::DependencyFailed {
                        module_id: id.clone(),
                        dependency: dependency.clone(),
                        reason,
                    }));
                }
            }
        }

        let outcome = match abort {
            Some(err) => Err(err),
            None => self.inner.loader.resolve_own_implementation(&config).await,
        };
        let load_ms = started.elapsed().as_millis() as u64;

        let instance = self.settle(&config, generation, outcome, warnings, load_ms);

        if self.inner.config.enable_performance_monitoring {
            self.inner.metrics.record_load(&id, instance.is_loaded(), load_ms);
        }
        self.notify(&instance);
        instance
    }

    async fn load_dependency(&self, dependency: &str, requester: &str) -> DependencyOutcome {
        let pending = match self.acquire(dependency, false, Some(requester)) {
            Ok(Acquired::Hit(_)) => return DependencyOutcome::Ready,
            Ok(Acquired::CyclicInFlight) => return DependencyOutcome::Cyclic,
            Ok(Acquired::Wait(pending)) => pending,
            Err(e) => return DependencyOutcome::Failed(e.to_string()),
        };

        let instance = pending.await;
        match (&instance.status, &instance.error) {
            (ModuleStatus::Loaded, _) => DependencyOutcome::Ready,
            (_, Some(err)) => DependencyOutcome::Failed(err.to_string()),
            (status, None) => DependencyOutcome::Failed(format!("依赖状态为 {status}")),
        }
    }

    /// 在状态锁内记录加载结果
    fn settle(
        &self,
        config: &Arc<ModuleConfig>,
        generation: u64,
        outcome: Result<Implementation>,
        warnings: Vec<Arc<RegistryError>>,
        load_ms: u64,
    ) -> ModuleInstance {
        let id = config.id.as_str();
        let mut state = self.lock_state();

        let mut instance = match state.instances.get(id) {
            Some(existing) if existing.status.is_pending() => existing.clone(),
            _ => {
                let placeholder = self.inner.loader.placeholder(Placeholder::not_found(id));
                ModuleInstance::loading(config.clone(), placeholder)
            }
        };
        instance.config = config.clone();
        instance.warnings = warnings;
        instance.load_time_ms = Some(load_ms);

        match outcome {
            Ok(implementation) => {
                instance.status = ModuleStatus::Loaded;
                instance.implementation = Some(implementation);
                instance.error = None;
                instance.loaded_at = Some(Utc::now());
                instance.touch();
            }
            Err(err) => {
                let placeholder = self
                    .inner
                    .loader
                    .placeholder(Placeholder::error(id, err.to_string()));
                instance.status = ModuleStatus::Error;
                instance.implementation = Some(placeholder);
                instance.error = Some(Arc::new(err));
                instance.loaded_at = None;
            }
        }

        let superseded = state
            .in_flight
            .get(id)
            .map(|op| op.generation != generation)
            .unwrap_or(false);
        if !superseded {
            state.in_flight.remove(id);
        }

        // 加载期间被注销或声明已被替换时不再记录
        let current = state
            .store
            .get(id)
            .map(|stored| Arc::ptr_eq(&stored, config))
            .unwrap_or(false);
        if current {
            let mut stored = instance.clone();
            if superseded {
                // 后续的强制重载会给出新的结果
                if stored.status == ModuleStatus::Loaded {
                    stored.status = ModuleStatus::Reloading;
                } else {
                    stored.status = ModuleStatus::Loading;
                    stored.error = None;
                    stored.implementation =
                        Some(self.inner.loader.placeholder(Placeholder::not_found(id)));
                }
            } else if self.inner.config.enable_cache {
                if let Some(evicted) = state.cache.insert(id) {
                    info!(module_id = %evicted, "缓存已满，淘汰最久未访问的模块");
                    state.mark_unloaded(&evicted);
                }
            }
            state.instances.insert(id.to_string(), stored);
        }

        instance
    }

    fn notify(&self, instance: &ModuleInstance) {
        let callbacks = &self.inner.callbacks;
        match (&instance.status, &instance.error) {
            (ModuleStatus::Loaded, _) => {
                info!(
                    module_id = %instance.id,
                    duration_ms = instance.load_time_ms.unwrap_or(0),
                    warnings = instance.warnings.len(),
                    "模块加载完成"
                );
                if let Some(callback) = &callbacks.on_module_load {
                    callback(instance);
                }
            }
            (_, Some(err)) => {
                error!(module_id = %instance.id, error = %err, code = err.error_code(), "模块加载失败");
                if let Some(callback) = &callbacks.on_module_error {
                    callback(&instance.id, err);
                }
            }
            _ => {}
        }
    }

    /// 激活延迟模块
    ///
    /// 模块未加载时先加载；实现不是延迟句柄时直接返回实例。
    /// 激活失败会把实例转为 error 状态。
    pub async fn activate(&self, module_id: &str) -> Result<ModuleInstance> {
        let instance = self.try_load_module(module_id, false).await?;
        let deferred = match &instance.implementation {
            Some(Implementation::Deferred(deferred)) if !deferred.is_activated() => deferred.clone(),
            _ => return Ok(instance),
        };

        let started = Instant::now();
        let result = deferred.activate().await;
        let activate_ms = started.elapsed().as_millis() as u64;

        if self.inner.config.enable_performance_monitoring {
            self.inner.metrics.record_load(module_id, result.is_ok(), activate_ms);
        }

        match result {
            Ok(_) => {
                debug!(module_id = %module_id, duration_ms = activate_ms, "延迟模块已激活");
                Ok(self.get_module(module_id).unwrap_or(instance))
            }
            Err(err) => {
                let snapshot = {
                    let mut state = self.lock_state();
                    let placeholder = self
                        .inner
                        .loader
                        .placeholder(Placeholder::error(module_id, err.to_string()));
                    match state.instances.get_mut(module_id) {
                        Some(current) if current.status == ModuleStatus::Loaded => {
                            current.status = ModuleStatus::Error;
                            current.error = Some(err.clone());
                            current.implementation = Some(placeholder);
                            current.clone()
                        }
                        _ => instance,
                    }
                };
                self.notify(&snapshot);
                Ok(snapshot)
            }
        }
    }

    // ==================== 卸载与缓存 ====================

    /// 卸载模块
    ///
    /// 已落定的实例转为 unloaded 并移出缓存；声明保留。
    /// 实例不存在或仍在加载时返回 false。
    pub fn unload_module(&self, module_id: &str) -> bool {
        let mut state = self.lock_state();
        let can_unload = state
            .instances
            .get(module_id)
            .map(|i| i.status.is_settled())
            .unwrap_or(false);
        if !can_unload {
            return false;
        }
        state.cache.remove(module_id);
        state.mark_unloaded(module_id);
        debug!(module_id = %module_id, "模块已卸载");
        true
    }

    /// 模块是否已加载
    pub fn is_module_loaded(&self, module_id: &str) -> bool {
        self.lock_state()
            .instances
            .get(module_id)
            .map(|i| i.is_loaded())
            .unwrap_or(false)
    }

    /// 清空缓存，对应实例转为 unloaded，声明保留
    pub fn clear_cache(&self) -> usize {
        let mut state = self.lock_state();
        let cleared = state.cache.clear();
        for id in &cleared {
            state.mark_unloaded(id);
        }
        debug!(count = cleared.len(), "缓存已清空");
        cleared.len()
    }

    /// 清理过期缓存条目，返回被清理的模块 ID
    pub fn sweep_expired(&self) -> Vec<String> {
        let ttl = self.inner.config.cache_ttl();
        let mut state = self.lock_state();
        let expired = state.cache.sweep_expired(ttl);
        for id in &expired {
            state.mark_unloaded(id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "已清理过期缓存条目");
        }
        expired
    }

    /// 移除缓存条目但保留实例状态，供热重载在强制重载前使用
    pub(crate) fn invalidate_cache_entry(&self, module_id: &str) {
        self.lock_state().cache.remove(module_id);
    }

    /// 需要热重载的模块：已加载且声明开启了热重载，按依赖顺序排列
    pub(crate) fn hot_reload_targets(&self, change: &SourceChange) -> Vec<String> {
        let mut state = self.lock_state();
        let mut selected = Vec::new();
        for config in state.store.all() {
            let loaded = state
                .instances
                .get(&config.id)
                .map(|i| i.is_loaded())
                .unwrap_or(false);
            if loaded && config.hot_reload && change.affects(&config) {
                selected.push(config.id.clone());
            }
        }
        state.graph().sort_by_load_order(&selected)
    }

    // ==================== 查询 ====================

    /// 获取模块实例快照
    pub fn get_module(&self, module_id: &str) -> Option<ModuleInstance> {
        self.lock_state().instances.get(module_id).cloned()
    }

    /// 获取模块声明
    pub fn get_config(&self, module_id: &str) -> Option<Arc<ModuleConfig>> {
        self.lock_state().store.get(module_id)
    }

    /// 所有模块声明
    pub fn get_all_modules(&self) -> Vec<Arc<ModuleConfig>> {
        self.lock_state().store.all()
    }

    /// 按分类查询
    pub fn get_modules_by_category(&self, category: &str) -> Vec<Arc<ModuleConfig>> {
        self.lock_state().store.by_category(category)
    }

    /// 按优先级查询
    pub fn get_modules_by_priority(&self, priority: ModulePriority) -> Vec<Arc<ModuleConfig>> {
        self.lock_state().store.by_priority(priority)
    }

    /// 搜索模块
    pub fn search_modules(&self, query: &str) -> Vec<Arc<ModuleConfig>> {
        self.lock_state().store.search(query)
    }

    /// 已启用的模块
    pub fn get_enabled_modules(&self) -> Vec<Arc<ModuleConfig>> {
        self.lock_state().store.enabled_only()
    }

    /// 模块的直接依赖（声明顺序），未注册时为空
    pub fn get_module_dependencies(&self, module_id: &str) -> Vec<String> {
        self.lock_state().graph().dependencies(module_id)
    }

    /// 模块的加载顺序（依赖在前，自身在最后）
    pub fn get_load_order(&self, module_id: &str) -> Vec<String> {
        self.lock_state().graph().topological_order(module_id)
    }

    /// 模块是否声明了指定权限，未注册时为 false
    pub fn has_permission(&self, module_id: &str, permission: &str) -> bool {
        self.lock_state()
            .store
            .get(module_id)
            .map(|c| c.has_permission(permission))
            .unwrap_or(false)
    }

    /// 校验依赖图
    pub fn validate_dependencies(&self) -> GraphReport {
        let mut state = self.lock_state();
        let known: HashSet<String> = state.store.ids().into_iter().collect();
        let report = state.graph().validate(&known);
        for cycle in &report.cycles {
            let err = RegistryError::CircularDependency(cycle.join(" -> "));
            warn!(error = %err, code = err.error_code(), "依赖图中存在循环");
        }
        report
    }

    /// 注册表统计
    pub fn get_stats(&self) -> RegistryStats {
        let mut state = self.lock_state();
        let graph_size = state.graph().module_count();
        let configs = state.store.all();
        let modules: Vec<(&ModuleConfig, ModuleStatus)> = configs
            .iter()
            .map(|c| {
                let status = state
                    .instances
                    .get(&c.id)
                    .map(|i| i.status)
                    .unwrap_or(ModuleStatus::Unregistered);
                (c.as_ref(), status)
            })
            .collect();
        RegistryStats::collect(modules, graph_size, state.cache.stats())
    }

    /// 加载性能报告，未启用性能监控时为空报告
    pub fn get_performance_metrics(&self) -> PerformanceReport {
        if self.inner.config.enable_performance_monitoring {
            self.inner.metrics.export()
        } else {
            PerformanceReport::default()
        }
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ModuleRegistry")
            .field("modules", &state.store.len())
            .field("instances", &state.instances.len())
            .field("in_flight", &state.in_flight.len())
            .field("cache_size", &state.cache.len())
            .finish()
    }
}

/// 注册表构建器
pub struct ModuleRegistryBuilder {
    config: RegistryConfig,
    resolver: Arc<dyn ModuleResolver>,
    fallback_factory: Option<FallbackFactory>,
    callbacks: RegistryCallbacks,
}

impl ModuleRegistryBuilder {
    /// 创建构建器
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self {
            config: RegistryConfig::default(),
            resolver,
            fallback_factory: None,
            callbacks: RegistryCallbacks::default(),
        }
    }

    /// 设置注册表配置
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置占位组件工厂
    pub fn fallback_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Placeholder) -> super::resolver::ComponentHandle + Send + Sync + 'static,
    {
        self.fallback_factory = Some(Arc::new(factory));
        self
    }

    /// 设置加载完成回调
    pub fn on_module_load<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ModuleInstance) + Send + Sync + 'static,
    {
        self.callbacks.on_module_load = Some(Arc::new(callback));
        self
    }

    /// 设置加载失败回调
    pub fn on_module_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &RegistryError) + Send + Sync + 'static,
    {
        self.callbacks.on_module_error = Some(Arc::new(callback));
        self
    }

    /// 设置声明更新回调
    pub fn on_module_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ModuleConfig) + Send + Sync + 'static,
    {
        self.callbacks.on_module_update = Some(Arc::new(callback));
        self
    }

    /// 构建注册表
    ///
    /// # 错误
    ///
    /// 配置校验失败时返回 `InvalidConfigValue`。
    pub fn build(self) -> Result<ModuleRegistry> {
        self.config.validate()?;
        let mut loader = ModuleLoader::new(self.resolver);
        if let Some(factory) = self.fallback_factory {
            loader = loader.with_fallback_factory(factory);
        }
        Ok(ModuleRegistry::from_parts(self.config, loader, self.callbacks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::resolver::StaticResolver;

    fn registry() -> ModuleRegistry {
        let resolver = StaticResolver::new()
            .with("./a", "A")
            .with("./b", "B")
            .with("./c", "C");
        ModuleRegistry::new(Arc::new(resolver))
    }

    #[tokio::test]
    async fn test_load_and_cache_hit() {
        let registry = registry();
        registry.register_module(ModuleConfig::new("a", "./a"));

        let first = registry.load_module("a", false).await.unwrap();
        assert_eq!(first.status, ModuleStatus::Loaded);
        assert_eq!(first.access_count, 1);

        let second = registry.load_module("a", false).await.unwrap();
        assert_eq!(second.access_count, 2);
        assert!(registry.is_module_loaded("a"));

        let stats = registry.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.cache_size, 1);
    }

    #[tokio::test]
    async fn test_missing_and_disabled() {
        let registry = registry();
        registry.register_module(ModuleConfig::new("b", "./b").disabled());

        assert!(registry.load_module("nope", false).await.is_none());
        assert!(registry.load_module("b", false).await.is_none());
        assert!(registry.get_module("b").is_none());

        let err = registry.try_load_module("b", false).await.unwrap_err();
        assert!(matches!(err, RegistryError::ModuleDisabled(_)));
    }

    #[tokio::test]
    async fn test_resolution_failure_yields_error_instance() {
        let registry = registry();
        registry.register_module(ModuleConfig::new("ghost", "./ghost"));

        let instance = registry.load_module("ghost", false).await.unwrap();
        assert_eq!(instance.status, ModuleStatus::Error);
        assert!(instance.error.is_some());
        assert!(instance.placeholder().unwrap().is_error());
        assert!(!registry.is_module_loaded("ghost"));
    }

    #[tokio::test]
    async fn test_unload_and_reload() {
        let registry = registry();
        registry.register_module(ModuleConfig::new("a", "./a"));
        registry.load_module("a", false).await.unwrap();

        assert!(registry.unload_module("a"));
        assert_eq!(registry.get_module("a").unwrap().status, ModuleStatus::Unloaded);
        assert!(!registry.unload_module("a"));

        let instance = registry.load_module("a", false).await.unwrap();
        assert!(instance.is_loaded());
        assert_eq!(instance.access_count, 1);
    }

    #[tokio::test]
    async fn test_clear_cache_keeps_configs() {
        let registry = registry();
        registry.register_module(ModuleConfig::new("a", "./a"));
        registry.register_module(ModuleConfig::new("b", "./b"));
        registry.load_module("a", false).await;
        registry.load_module("b", false).await;

        assert_eq!(registry.clear_cache(), 2);
        assert!(!registry.is_module_loaded("a"));
        assert_eq!(registry.get_all_modules().len(), 2);
        assert_eq!(registry.get_stats().cache_size, 0);
    }

    #[tokio::test]
    async fn test_unregister_removes_everything() {
        let registry = registry();
        registry.register_module(ModuleConfig::new("a", "./a"));
        registry.load_module("a", false).await;

        assert!(registry.unregister_module("a"));
        assert!(!registry.unregister_module("a"));
        assert!(registry.get_module("a").is_none());
        assert_eq!(registry.get_stats().cache_size, 0);
    }

    #[tokio::test]
    async fn test_queries() {
        let registry = registry();
        registry.register_module(
            ModuleConfig::new("a", "./a")
                .with_category("business")
                .with_dependency("b")
                .with_permission("sales.read"),
        );
        registry.register_module(ModuleConfig::new("b", "./b").with_priority(ModulePriority::Low));

        assert_eq!(registry.get_module_dependencies("a"), vec!["b"]);
        assert!(registry.get_module_dependencies("zzz").is_empty());
        assert_eq!(registry.get_load_order("a"), vec!["b", "a"]);
        assert!(registry.has_permission("a", "sales.read"));
        assert!(!registry.has_permission("a", "sales.write"));
        assert!(!registry.has_permission("zzz", "sales.read"));
        assert_eq!(registry.get_modules_by_category("business").len(), 1);
        assert_eq!(registry.get_modules_by_priority(ModulePriority::Low)[0].id, "b");
        assert_eq!(registry.get_enabled_modules().len(), 2);
    }

    #[tokio::test]
    async fn test_initialize_twice_fails() {
        let registry = registry();
        registry.initialize().await.unwrap();
        assert!(matches!(
            registry.initialize().await,
            Err(RegistryError::InitFailed(_))
        ));
        registry.shutdown();
        registry.initialize().await.unwrap();
        registry.shutdown();
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = RegistryConfig::builder().max_cache_size(0).build();
        let result = ModuleRegistry::builder(Arc::new(StaticResolver::new()))
            .config(config)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_register_without_runtime_marks_unloaded() {
        let registry = registry();
        registry.register_module(ModuleConfig::new("a", "./a"));
        {
            let mut state = registry.lock_state();
            let config = state.store.get("a").unwrap();
            let mut instance = ModuleInstance::loading(
                config,
                Implementation::Placeholder {
                    placeholder: Placeholder::not_found("a"),
                    component: None,
                },
            );
            instance.status = ModuleStatus::Loaded;
            state.instances.insert("a".to_string(), instance);
            state.cache.insert("a");
        }

        registry.register_module(ModuleConfig::new("a", "./a").with_name("A2"));

        assert_eq!(registry.get_module("a").unwrap().status, ModuleStatus::Unloaded);
        assert_eq!(registry.get_config("a").unwrap().display_name, "A2");
    }
}
