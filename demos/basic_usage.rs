//! 基本使用示例
//!
//! 本示例展示了动态模块注册表的基本使用方法，包括：
//!
//! - 创建注册表并注册模块声明
//! - 按依赖关系加载模块
//! - 延迟模块的激活
//! - 热重载与统计信息
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use chips_registry::{
    HotReloadBridge, ModuleConfig, ModulePriority, ModuleRegistry, RegistryConfig, StaticResolver,
};

/// 主函数
///
/// 演示注册表的基本用法。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== 动态模块注册表基本使用示例 ===\n");

    // -------------------------------------------------------------------------
    // 1. 创建注册表
    // -------------------------------------------------------------------------
    println!("1. 创建注册表...");

    let resolver = StaticResolver::new()
        .with("./modules/stock", "库存面板")
        .with("./modules/sales", "销售面板")
        .with("./modules/report", "报表面板");

    let config = RegistryConfig::builder()
        .max_cache_size(20)
        .cache_ttl(Duration::from_secs(600))
        .preload("stock")
        .build();
    println!("   - 缓存容量: {}", config.max_cache_size);
    println!("   - 缓存存活: {:?}", config.cache_ttl());

    let registry = ModuleRegistry::builder(Arc::new(resolver))
        .config(config)
        .on_module_load(|instance| {
            println!("   [回调] 模块 {} 已加载", instance.id);
        })
        .on_module_error(|id, err| {
            println!("   [回调] 模块 {id} 加载失败: {err}");
        })
        .build()?;
    println!("   ✅ 注册表创建成功\n");

    // -------------------------------------------------------------------------
    // 2. 注册模块
    // -------------------------------------------------------------------------
    println!("2. 注册模块...");

    registry.register_module(
        ModuleConfig::new("stock", "./modules/stock")
            .with_name("库存")
            .with_category("business")
            .with_priority(ModulePriority::High),
    );
    registry.register_module(
        ModuleConfig::new("sales", "./modules/sales")
            .with_name("销售")
            .with_category("business")
            .with_dependency("stock")
            .with_permission("sales.read")
            .hot_reloadable(),
    );
    registry.register_module(
        ModuleConfig::new("report", "./modules/report")
            .with_name("报表")
            .with_dependency("sales")
            .lazy(),
    );
    registry.register_module(ModuleConfig::new("legacy", "./modules/legacy"));

    println!("   已注册 {} 个模块", registry.get_all_modules().len());
    println!("   报表加载顺序: {:?}\n", registry.get_load_order("report"));

    // -------------------------------------------------------------------------
    // 3. 初始化（预加载 stock）
    // -------------------------------------------------------------------------
    println!("3. 初始化注册表...");
    registry.initialize().await?;
    println!("   stock 已加载: {}\n", registry.is_module_loaded("stock"));

    // -------------------------------------------------------------------------
    // 4. 加载模块
    // -------------------------------------------------------------------------
    println!("4. 加载模块...");

    if let Some(sales) = registry.load_module("sales", false).await {
        println!("   sales 状态: {}", sales.status);
        println!("   sales 组件: {:?}", sales.component::<&str>());
    }

    if let Some(legacy) = registry.load_module("legacy", false).await {
        println!("   legacy 状态: {}", legacy.status);
        if let Some(placeholder) = legacy.placeholder() {
            println!("   legacy 占位: {placeholder}");
        }
    }
    println!();

    // -------------------------------------------------------------------------
    // 5. 激活延迟模块
    // -------------------------------------------------------------------------
    println!("5. 激活延迟模块...");
    let report = registry.activate("report").await?;
    println!("   report 组件: {:?}\n", report.component::<&str>());

    // -------------------------------------------------------------------------
    // 6. 热重载
    // -------------------------------------------------------------------------
    println!("6. 热重载 sales...");
    let bridge = HotReloadBridge::new(registry.clone());
    let reloaded = bridge.invalidate(&["sales".to_string()]).await;
    println!("   重载了 {} 个模块\n", reloaded.len());

    // -------------------------------------------------------------------------
    // 7. 统计信息
    // -------------------------------------------------------------------------
    println!("7. 统计信息...");
    let stats = registry.get_stats();
    println!("   - 模块总数: {}", stats.total_modules);
    println!("   - 已加载: {}", stats.loaded_modules);
    println!("   - 缓存条目: {}", stats.cache_size);
    println!("   - 命中率: {:.2}", stats.efficiency);

    let metrics = registry.get_performance_metrics();
    println!("   - 加载次数: {}", metrics.total_loads);
    println!("   - 失败次数: {}", metrics.failed_loads);

    // -------------------------------------------------------------------------
    // 8. 关闭
    // -------------------------------------------------------------------------
    println!("\n8. 关闭注册表...");
    registry.shutdown();
    println!("   ✅ 注册表已关闭");

    println!("\n=== 示例完成 ===");
    Ok(())
}
