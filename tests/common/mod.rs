//! 集成测试共用的脚本化解析器

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chips_registry::{ComponentHandle, ModuleResolver, ResolveError};

/// 单个位置的行为
#[derive(Debug, Clone, Default)]
struct Script {
    delay: Option<Duration>,
    fail: bool,
}

/// 可脚本化的解析器
///
/// 未配置的位置一律解析失败；成功时返回位置字符串和调用序号。
#[derive(Debug, Default)]
pub struct MockResolver {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    order: Mutex<Vec<String>>,
    total: AtomicUsize,
}

/// 解析出的组件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockComponent {
    pub location: String,
    pub generation: usize,
}

impl MockResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 可以解析的位置
    pub fn ok(self: &Arc<Self>, location: &str) -> Arc<Self> {
        self.script(location, Script::default());
        self.clone()
    }

    /// 延迟后解析成功的位置
    pub fn slow(self: &Arc<Self>, location: &str, delay: Duration) -> Arc<Self> {
        self.script(
            location,
            Script {
                delay: Some(delay),
                fail: false,
            },
        );
        self.clone()
    }

    /// 总是失败的位置
    pub fn failing(self: &Arc<Self>, location: &str) -> Arc<Self> {
        self.script(
            location,
            Script {
                delay: None,
                fail: true,
            },
        );
        self.clone()
    }

    /// 延迟后解析失败的位置
    pub fn slow_failing(self: &Arc<Self>, location: &str, delay: Duration) -> Arc<Self> {
        self.script(
            location,
            Script {
                delay: Some(delay),
                fail: true,
            },
        );
        self.clone()
    }

    fn script(&self, location: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(location.to_string(), script);
    }

    /// 指定位置被解析的次数
    pub fn calls(&self, location: &str) -> usize {
        self.calls.lock().unwrap().get(location).copied().unwrap_or(0)
    }

    /// 按调用顺序记录的位置
    pub fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    /// 总解析次数
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleResolver for MockResolver {
    async fn resolve(&self, location: &str) -> Result<ComponentHandle, ResolveError> {
        let generation = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(location.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        self.total.fetch_add(1, Ordering::SeqCst);
        self.order.lock().unwrap().push(location.to_string());

        let script = self.scripts.lock().unwrap().get(location).cloned();
        let Some(script) = script else {
            return Err(ResolveError::NotFound(location.to_string()));
        };

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }

        if script.fail {
            Err(ResolveError::failed(location, "scripted failure"))
        } else {
            Ok(Arc::new(MockComponent {
                location: location.to_string(),
                generation,
            }))
        }
    }
}

/// 轮询直到条件成立，最多等待一秒
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
