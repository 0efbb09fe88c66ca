//! 配置与清单加载集成测试

mod common;

use std::io::Write;
use std::time::Duration;

use chips_registry::{
    DependencyFailurePolicy, LogLevel, ManifestParser, ModulePriority, ModuleRegistry,
    RegistryConfig, RegistryError,
};
use common::MockResolver;
use tempfile::{Builder, NamedTempFile};

fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const MANIFEST_YAML: &str = r#"
modules:
  - id: stock
    name: 库存
    location: ./stock
    category: business
    priority: high
    version: 1.2.0
  - id: sales
    name: 销售
    location: ./sales
    category: business
    dependencies: [stock]
    hot_reload: true
    permissions: [sales.read]
  - id: audit
    location: ./audit
    enabled: false
"#;

#[tokio::test]
async fn test_config_from_yaml_file() {
    let file = temp_file(
        ".yaml",
        r#"
enable_cache: true
cache_ttl_ms: 1000
max_cache_size: 8
log_level: debug
preload_ids: [stock]
load_timeout_ms: 250
dependency_failure_policy: abort
"#,
    );

    let config = RegistryConfig::from_file(file.path()).await.unwrap();

    assert_eq!(config.max_cache_size, 8);
    assert_eq!(config.cache_ttl(), Duration::from_millis(1000));
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.preload_ids, vec!["stock".to_string()]);
    assert_eq!(config.load_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(config.dependency_failure_policy, DependencyFailurePolicy::Abort);
    assert_eq!(config.config_path.as_deref(), Some(file.path()));
    // 未出现的字段取默认值
    assert!(config.enable_hot_reload);
}

#[tokio::test]
async fn test_config_from_json_file() {
    let file = temp_file(".json", r#"{ "enable_cache": false, "max_cache_size": 3 }"#);

    let config = RegistryConfig::from_file(file.path()).await.unwrap();

    assert!(!config.enable_cache);
    assert_eq!(config.max_cache_size, 3);
}

#[tokio::test]
async fn test_invalid_config_values_rejected() {
    let file = temp_file(".yaml", "max_cache_size: 0\n");
    let err = RegistryConfig::from_file(file.path()).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidConfigValue { .. }));

    let missing = RegistryConfig::from_file("/nonexistent/registry.yaml").await;
    assert!(matches!(missing, Err(RegistryError::Io(_))));
}

#[tokio::test]
async fn test_register_manifest() {
    let file = temp_file(".yaml", MANIFEST_YAML);
    let resolver = MockResolver::new().ok("./stock").ok("./sales");
    let registry = ModuleRegistry::new(resolver.clone());

    let count = registry.register_manifest(file.path()).await.unwrap();

    assert_eq!(count, 3);
    assert_eq!(registry.get_enabled_modules().len(), 2);
    assert_eq!(registry.get_module_dependencies("sales"), vec!["stock"]);
    assert!(registry.has_permission("sales", "sales.read"));
    assert_eq!(
        registry.get_modules_by_priority(ModulePriority::High)[0].id,
        "stock"
    );
    assert_eq!(registry.get_config("stock").unwrap().display_name, "库存");

    let sales = registry.load_module("sales", false).await.unwrap();
    assert!(sales.is_loaded());
    assert!(registry.is_module_loaded("stock"));
    assert!(registry.load_module("audit", false).await.is_none());
}

#[tokio::test]
async fn test_register_json_manifest_list() {
    let file = temp_file(
        ".json",
        r#"[{ "id": "a", "location": "./a" }, { "id": "b", "location": "./b", "lazy": true }]"#,
    );
    let registry = ModuleRegistry::new(MockResolver::new());

    assert_eq!(registry.register_manifest(file.path()).await.unwrap(), 2);
    assert!(registry.get_config("b").unwrap().lazy);
}

#[tokio::test]
async fn test_invalid_manifest_registers_nothing() {
    let file = temp_file(
        ".yaml",
        r#"
- id: ok
  location: ./ok
- id: "bad id"
  location: ""
  version: not-a-version
- id: ok
  location: ./again
"#,
    );
    let registry = ModuleRegistry::new(MockResolver::new());

    let err = registry.register_manifest(file.path()).await.unwrap_err();

    match err {
        RegistryError::InvalidConfig(message) => {
            assert!(message.contains("bad id"));
            assert!(message.contains("not-a-version"));
            assert!(message.contains("重复"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(registry.get_all_modules().is_empty());
}

#[test]
fn test_parse_file_sync() {
    let file = temp_file(".yml", MANIFEST_YAML);

    let modules = ManifestParser::parse_file_sync(file.path()).unwrap();

    assert_eq!(modules.len(), 3);
    assert!(modules[1].hot_reload);
    assert!(!modules[2].enabled);
}
