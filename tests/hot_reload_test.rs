//! 热重载集成测试

mod common;

use std::sync::Arc;

use chips_registry::{HotReloadBridge, ModuleConfig, ModuleRegistry, RegistryConfig, SourceChange};
use common::{wait_until, MockComponent, MockResolver};
use tokio::sync::mpsc;

/// a 依赖 b，二者开启热重载；c 未开启
async fn setup(config: RegistryConfig) -> (Arc<MockResolver>, ModuleRegistry) {
    let resolver = MockResolver::new().ok("./a").ok("./b").ok("./c").ok("./d");
    let registry = ModuleRegistry::builder(resolver.clone())
        .config(config)
        .build()
        .unwrap();

    registry.register_module(
        ModuleConfig::new("a", "./a")
            .with_dependency("b")
            .hot_reloadable(),
    );
    registry.register_module(ModuleConfig::new("b", "./b").hot_reloadable());
    registry.register_module(ModuleConfig::new("c", "./c"));
    registry.register_module(ModuleConfig::new("d", "./d").hot_reloadable());

    registry.load_module("a", false).await.unwrap();
    registry.load_module("c", false).await.unwrap();
    (resolver, registry)
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_invalidate_reloads_in_dependency_order() {
    let (resolver, registry) = setup(RegistryConfig::default()).await;
    let bridge = HotReloadBridge::new(registry.clone());
    let before = resolver.order().len();

    let reloaded = bridge.invalidate(&ids(&["a", "b", "c", "d"])).await;

    let reloaded_ids: Vec<&str> = reloaded.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(reloaded_ids, vec!["b", "a"]);
    assert_eq!(resolver.order()[before..], ["./b", "./a"]);

    // 未开启热重载或未加载的模块不受影响
    assert_eq!(resolver.calls("./c"), 1);
    assert_eq!(resolver.calls("./d"), 0);
    assert!(registry.is_module_loaded("c"));

    let a = registry.get_module("a").unwrap();
    assert!(a.is_loaded());
    assert_eq!(a.component::<MockComponent>().unwrap().generation, 2);
}

#[tokio::test]
async fn test_disabled_hot_reload_is_noop() {
    let config = RegistryConfig::builder().enable_hot_reload(false).build();
    let (resolver, registry) = setup(config).await;
    let bridge = HotReloadBridge::new(registry);

    assert!(!bridge.is_enabled());
    assert!(bridge.invalidate(&ids(&["a", "b"])).await.is_empty());
    assert_eq!(resolver.calls("./a"), 1);
    assert_eq!(resolver.calls("./b"), 1);
}

#[tokio::test]
async fn test_location_change_selects_module() {
    let (resolver, registry) = setup(RegistryConfig::default()).await;
    let bridge = HotReloadBridge::new(registry);

    let reloaded = bridge
        .apply(SourceChange::Locations(vec!["./b".to_string()]))
        .await;

    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].id, "b");
    assert_eq!(resolver.calls("./a"), 1);
    assert_eq!(resolver.calls("./b"), 2);
}

#[tokio::test]
async fn test_signal_function_reloads() {
    let (resolver, registry) = setup(RegistryConfig::default()).await;
    let notify = HotReloadBridge::new(registry.clone()).signal();

    notify(SourceChange::modules(["b"]));

    assert!(wait_until(|| resolver.calls("./b") == 2).await);
    assert!(wait_until(|| registry.is_module_loaded("b")).await);
}

#[tokio::test]
async fn test_listen_consumes_channel() {
    let (resolver, registry) = setup(RegistryConfig::default()).await;
    let bridge = HotReloadBridge::new(registry);
    let (tx, rx) = mpsc::channel(8);
    let task = bridge.listen(rx);

    tx.send(SourceChange::All).await.unwrap();
    assert!(wait_until(|| resolver.calls("./a") == 2).await);
    assert_eq!(resolver.calls("./c"), 1);

    drop(tx);
    task.await.unwrap();
}
