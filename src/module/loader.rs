//! 模块加载器
//!
//! 负责把模块声明解析为实现：按解析策略分派，主位置失败后依次尝试回退位置，
//! 全部失败时返回最初的错误。还提供加载中与失败时使用的占位实现。

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::metadata::{ModuleConfig, ResolutionStrategy};
use super::resolver::{ComponentHandle, ModuleResolver};
use crate::utils::{RegistryError, Result};

/// 占位实现
///
/// 两种占位都是 `(id, 可选错误)` 的纯函数，不含隐藏状态。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// 模块仍在解析（尚不可用）
    NotFound {
        /// 模块 ID
        module_id: String,
    },
    /// 模块解析失败
    Error {
        /// 模块 ID
        module_id: String,
        /// 失败信息
        message: String,
    },
}

impl Placeholder {
    /// 加载中的占位
    pub fn not_found(module_id: impl Into<String>) -> Self {
        Placeholder::NotFound {
            module_id: module_id.into(),
        }
    }

    /// 失败时的占位
    pub fn error(module_id: impl Into<String>, message: impl Into<String>) -> Self {
        Placeholder::Error {
            module_id: module_id.into(),
            message: message.into(),
        }
    }

    /// 所属模块 ID
    pub fn module_id(&self) -> &str {
        match self {
            Placeholder::NotFound { module_id } | Placeholder::Error { module_id, .. } => {
                module_id
            }
        }
    }

    /// 是否为错误占位
    pub fn is_error(&self) -> bool {
        matches!(self, Placeholder::Error { .. })
    }

    /// 可展示的文本
    pub fn render(&self) -> String {
        match self {
            Placeholder::NotFound { module_id } => format!("模块 '{module_id}' 尚未就绪"),
            Placeholder::Error { module_id, message } => {
                format!("模块 '{module_id}' 加载失败: {message}")
            }
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// 宿主提供的占位组件工厂
pub type FallbackFactory = Arc<dyn Fn(&Placeholder) -> ComponentHandle + Send + Sync>;

/// 延迟解析句柄
///
/// 首次 [`activate`](Self::activate) 时才调用解析适配器，
/// 之后的激活（包括并发激活）共享同一个结果。
#[derive(Clone)]
pub struct DeferredHandle {
    module_id: String,
    primary: String,
    fallbacks: Vec<String>,
    resolver: Arc<dyn ModuleResolver>,
    cell: Arc<OnceCell<std::result::Result<ComponentHandle, Arc<RegistryError>>>>,
}

impl DeferredHandle {
    fn new(config: &ModuleConfig, resolver: Arc<dyn ModuleResolver>) -> Self {
        Self {
            module_id: config.id.clone(),
            primary: config.location.clone(),
            fallbacks: fallback_locations(config),
            resolver,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// 所属模块 ID
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// 是否已经激活过
    pub fn is_activated(&self) -> bool {
        self.cell.initialized()
    }

    /// 已激活的实现
    pub fn component(&self) -> Option<&ComponentHandle> {
        self.cell.get().and_then(|r| r.as_ref().ok())
    }

    /// 激活：执行实际解析，最多解析一次
    pub async fn activate(&self) -> std::result::Result<ComponentHandle, Arc<RegistryError>> {
        self.cell
            .get_or_init(|| async {
                debug!(module_id = %self.module_id, "激活延迟模块");
                resolve_with_fallbacks(
                    self.resolver.as_ref(),
                    &self.module_id,
                    &self.primary,
                    &self.fallbacks,
                )
                .await
                .map_err(Arc::new)
            })
            .await
            .clone()
    }
}

impl fmt::Debug for DeferredHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredHandle")
            .field("module_id", &self.module_id)
            .field("primary", &self.primary)
            .field("activated", &self.is_activated())
            .finish()
    }
}

/// 模块实现
#[derive(Clone)]
pub enum Implementation {
    /// 已解析
    Ready(ComponentHandle),
    /// 延迟解析
    Deferred(DeferredHandle),
    /// 占位，`component` 为宿主占位工厂生成的组件
    Placeholder {
        placeholder: Placeholder,
        component: Option<ComponentHandle>,
    },
}

impl Implementation {
    /// 可用的组件（延迟实现仅在激活成功后可用）
    pub fn component(&self) -> Option<&ComponentHandle> {
        match self {
            Implementation::Ready(handle) => Some(handle),
            Implementation::Deferred(deferred) => deferred.component(),
            Implementation::Placeholder { component, .. } => component.as_ref(),
        }
    }

    /// 占位信息
    pub fn placeholder(&self) -> Option<&Placeholder> {
        match self {
            Implementation::Placeholder { placeholder, .. } => Some(placeholder),
            _ => None,
        }
    }

    /// 是否为占位实现
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Implementation::Placeholder { .. })
    }

    /// 是否为延迟实现
    pub fn is_deferred(&self) -> bool {
        matches!(self, Implementation::Deferred(_))
    }

    /// 向下转型为具体组件类型
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.component().and_then(|c| c.downcast_ref::<T>())
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::Ready(_) => f.write_str("Ready(..)"),
            Implementation::Deferred(deferred) => f.debug_tuple("Deferred").field(deferred).finish(),
            Implementation::Placeholder {
                placeholder,
                component,
            } => f
                .debug_struct("Placeholder")
                .field("placeholder", placeholder)
                .field("has_component", &component.is_some())
                .finish(),
        }
    }
}

/// 计算回退位置
///
/// 由 `location` 与 `id` 确定性地派生，去重且不包含主位置本身。
///
/// ```rust
/// use chips_registry::module::{loader::fallback_locations, ModuleConfig};
///
/// let config = ModuleConfig::new("sales", "./features/sales");
/// assert_eq!(
///     fallback_locations(&config),
///     vec!["./modules/sales", "./modules/sales/index", "./features/sales/index"]
/// );
/// ```
pub fn fallback_locations(config: &ModuleConfig) -> Vec<String> {
    let id = &config.id;
    let base = config.location.trim_end_matches('/');

    let candidates = match config.strategy() {
        ResolutionStrategy::Package => vec![format!("@modules/{id}"), format!("packages/{id}")],
        ResolutionStrategy::Eager | ResolutionStrategy::Lazy => vec![
            format!("./modules/{id}"),
            format!("./modules/{id}/index"),
            format!("{base}/index"),
        ],
    };

    let mut result: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate != config.location && candidate != base && !result.contains(&candidate) {
            result.push(candidate);
        }
    }
    result
}

/// 依次尝试主位置和回退位置，全部失败时返回包装了最初错误的 `ResolutionError`
async fn resolve_with_fallbacks(
    resolver: &dyn ModuleResolver,
    module_id: &str,
    primary: &str,
    fallbacks: &[String],
) -> Result<ComponentHandle> {
    let original = match resolver.resolve(primary).await {
        Ok(handle) => return Ok(handle),
        Err(e) => e,
    };

    debug!(module_id = %module_id, location = %primary, error = %original, "主位置解析失败，尝试回退位置");

    for location in fallbacks {
        match resolver.resolve(location).await {
            Ok(handle) => {
                debug!(module_id = %module_id, location = %location, "通过回退位置解析成功");
                return Ok(handle);
            }
            Err(e) => {
                debug!(module_id = %module_id, location = %location, error = %e, "回退位置解析失败");
            }
        }
    }

    warn!(module_id = %module_id, error = %original, "所有解析尝试均失败");
    Err(RegistryError::resolution(module_id, original))
}

/// 模块加载器
///
/// 持有注入的解析适配器和可选的占位组件工厂。
#[derive(Clone)]
pub struct ModuleLoader {
    resolver: Arc<dyn ModuleResolver>,
    fallback_factory: Option<FallbackFactory>,
}

impl ModuleLoader {
    /// 创建新的加载器
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self {
            resolver,
            fallback_factory: None,
        }
    }

    /// 设置占位组件工厂
    pub fn with_fallback_factory(mut self, factory: FallbackFactory) -> Self {
        self.fallback_factory = Some(factory);
        self
    }

    /// 解析模块自身的实现
    ///
    /// 延迟模块返回 [`Implementation::Deferred`]，不调用解析适配器；
    /// 其余策略立即解析。错误总是以 `Err` 返回。
    pub async fn resolve_own_implementation(&self, config: &ModuleConfig) -> Result<Implementation> {
        match config.strategy() {
            ResolutionStrategy::Lazy => Ok(Implementation::Deferred(DeferredHandle::new(
                config,
                self.resolver.clone(),
            ))),
            ResolutionStrategy::Eager | ResolutionStrategy::Package => {
                let fallbacks = fallback_locations(config);
                resolve_with_fallbacks(
                    self.resolver.as_ref(),
                    &config.id,
                    &config.location,
                    &fallbacks,
                )
                .await
                .map(Implementation::Ready)
            }
        }
    }

    /// 构造占位实现，宿主提供了工厂时一并生成组件
    pub fn placeholder(&self, placeholder: Placeholder) -> Implementation {
        let component = self.fallback_factory.as_ref().map(|f| f(&placeholder));
        Implementation::Placeholder {
            placeholder,
            component,
        }
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("has_fallback_factory", &self.fallback_factory.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ResolveError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 记录每次解析请求的位置，只有 `ok` 中的位置能解析成功
    struct RecordingResolver {
        ok: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingResolver {
        fn new(ok: &[&str]) -> Self {
            Self {
                ok: ok.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(vec![]),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModuleResolver for RecordingResolver {
        async fn resolve(
            &self,
            location: &str,
        ) -> std::result::Result<ComponentHandle, ResolveError> {
            self.calls.lock().unwrap().push(location.to_string());
            if self.ok.iter().any(|l| l == location) {
                Ok(Arc::new(location.to_string()))
            } else {
                Err(ResolveError::failed(location, "missing"))
            }
        }
    }

    #[test]
    fn test_fallback_locations_package() {
        let config = ModuleConfig::new("crm", "@vendor/crm").package();
        assert_eq!(fallback_locations(&config), vec!["@modules/crm", "packages/crm"]);
    }

    #[test]
    fn test_fallback_locations_excludes_primary() {
        let config = ModuleConfig::new("hr", "./modules/hr");
        assert_eq!(
            fallback_locations(&config),
            vec!["./modules/hr/index"]
        );
    }

    #[tokio::test]
    async fn test_resolve_primary() {
        let resolver = Arc::new(RecordingResolver::new(&["./hr"]));
        let loader = ModuleLoader::new(resolver.clone());

        let implementation = loader
            .resolve_own_implementation(&ModuleConfig::new("hr", "./hr"))
            .await
            .unwrap();

        assert_eq!(implementation.downcast_ref::<String>().unwrap(), "./hr");
        assert_eq!(resolver.calls(), vec!["./hr"]);
    }

    #[tokio::test]
    async fn test_resolve_stops_at_first_fallback_success() {
        let resolver = Arc::new(RecordingResolver::new(&["./modules/hr/index", "./hr/index"]));
        let loader = ModuleLoader::new(resolver.clone());

        let implementation = loader
            .resolve_own_implementation(&ModuleConfig::new("hr", "./hr"))
            .await
            .unwrap();

        assert_eq!(
            implementation.downcast_ref::<String>().unwrap(),
            "./modules/hr/index"
        );
        assert_eq!(
            resolver.calls(),
            vec!["./hr", "./modules/hr", "./modules/hr/index"]
        );
    }

    #[tokio::test]
    async fn test_resolve_failure_keeps_original_error() {
        let resolver = Arc::new(RecordingResolver::new(&[]));
        let loader = ModuleLoader::new(resolver.clone());

        let err = loader
            .resolve_own_implementation(&ModuleConfig::new("hr", "./hr"))
            .await
            .unwrap_err();

        match err {
            RegistryError::ResolutionError { module_id, cause } => {
                assert_eq!(module_id, "hr");
                assert_eq!(cause.location(), "./hr");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(resolver.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_lazy_resolves_once_on_activation() {
        let resolver = Arc::new(RecordingResolver::new(&["./report"]));
        let loader = ModuleLoader::new(resolver.clone());

        let implementation = loader
            .resolve_own_implementation(&ModuleConfig::new("report", "./report").lazy())
            .await
            .unwrap();
        assert!(implementation.is_deferred());
        assert!(implementation.component().is_none());
        assert!(resolver.calls().is_empty());

        let Implementation::Deferred(deferred) = &implementation else {
            panic!("expected deferred implementation");
        };
        let (a, b) = tokio::join!(deferred.activate(), deferred.activate());
        assert!(a.is_ok() && b.is_ok());
        assert!(deferred.is_activated());
        assert_eq!(resolver.calls(), vec!["./report"]);
        assert!(implementation.component().is_some());
    }

    #[test]
    fn test_placeholders_are_pure() {
        assert_eq!(Placeholder::not_found("a"), Placeholder::not_found("a"));
        assert_eq!(
            Placeholder::error("a", "boom").render(),
            Placeholder::error("a", "boom").render()
        );
        assert_ne!(Placeholder::not_found("a"), Placeholder::error("a", ""));
        assert!(Placeholder::error("a", "boom").render().contains("boom"));
        assert!(!Placeholder::not_found("a").is_error());
    }

    #[test]
    fn test_placeholder_uses_factory() {
        let loader = ModuleLoader::new(Arc::new(RecordingResolver::new(&[])))
            .with_fallback_factory(Arc::new(|p: &Placeholder| -> ComponentHandle {
                Arc::new(p.render())
            }));

        let implementation = loader.placeholder(Placeholder::error("x", "bad"));
        assert!(implementation.is_placeholder());
        assert_eq!(
            implementation.downcast_ref::<String>().unwrap(),
            &Placeholder::error("x", "bad").render()
        );
    }
}
