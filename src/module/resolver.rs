//! 解析适配器
//!
//! 注册表把“位置 -> 实现”的转换委托给注入的 [`ModuleResolver`]。
//! 本模块定义该接口以及两个内置实现：
//!
//! - [`StaticResolver`] - 预先注册好的位置表，适合宿主内嵌模块与测试
//! - [`FsResolver`] - 将位置解析为根目录下的文件，命令行工具使用

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::utils::ResolveError;

/// 已解析的模块实现句柄
///
/// 注册表不关心其具体类型，由渲染层等消费方自行向下转型。
pub type ComponentHandle = Arc<dyn Any + Send + Sync>;

/// 解析适配器接口
///
/// 失败时必须返回 `Err`，不允许 panic。
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// 将位置解析为模块实现
    async fn resolve(&self, location: &str) -> Result<ComponentHandle, ResolveError>;
}

/// 静态位置表解析器
#[derive(Default)]
pub struct StaticResolver {
    entries: RwLock<HashMap<String, ComponentHandle>>,
}

impl StaticResolver {
    /// 创建空的解析器
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个位置
    pub fn with<T: Any + Send + Sync>(self, location: impl Into<String>, component: T) -> Self {
        self.insert(location, component);
        self
    }

    /// 注册或替换一个位置
    pub fn insert<T: Any + Send + Sync>(&self, location: impl Into<String>, component: T) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(location.into(), Arc::new(component));
    }

    /// 移除一个位置
    pub fn remove(&self, location: &str) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(location).is_some()
    }
}

impl fmt::Debug for StaticResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.entries.read().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("StaticResolver")
            .field("entries", &count)
            .finish()
    }
}

#[async_trait]
impl ModuleResolver for StaticResolver {
    async fn resolve(&self, location: &str) -> Result<ComponentHandle, ResolveError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .get(location)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(location.to_string()))
    }
}

/// 文件系统中解析出的模块源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileComponent {
    /// 实际读取的文件路径
    pub path: PathBuf,
    /// 文件内容
    pub source: String,
}

/// 文件系统解析器
///
/// 位置是相对于根目录的路径（`./` 与 `@` 前缀会被忽略）。
/// 位置指向目录时读取其中的 `index` 文件。
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
}

impl FsResolver {
    /// 以指定根目录创建解析器
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, location: &str) -> PathBuf {
        let relative = location.trim_start_matches("./").trim_start_matches('@');
        self.root.join(relative)
    }
}

#[async_trait]
impl ModuleResolver for FsResolver {
    async fn resolve(&self, location: &str) -> Result<ComponentHandle, ResolveError> {
        let mut path = self.path_for(location);
        if tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            path = path.join("index");
        }

        debug!(location = %location, path = %path.display(), "读取模块文件");

        match tokio::fs::read_to_string(&path).await {
            Ok(source) => Ok(Arc::new(FileComponent { path, source })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ResolveError::NotFound(location.to_string()))
            }
            Err(e) => Err(ResolveError::failed(location, e.to_string())),
        }
    }
}
