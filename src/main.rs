//! Chips Registry 命令行入口
//!
//! 对模块清单做校验、计算加载顺序，并通过文件系统解析器试加载模块。
//!
//! # 命令概览
//!
//! - `check` - 解析并校验清单，列出循环依赖和悬空依赖
//! - `order` - 显示模块的加载顺序
//! - `load` - 加载模块并以 JSON 输出实例状态与统计
//! - `stats` - 预加载后输出注册表统计
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! # 校验清单
//! chips-registry check -m modules.yaml
//!
//! # 以 ./dist 为根目录加载两个模块
//! chips-registry -c registry.yaml load -m modules.yaml --root ./dist sales stock
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};

use chips_registry::{
    FsResolver, LogLevel, Logger, LoggerConfig, ManifestParser, ModuleRegistry, ModuleStatus,
    RegistryConfig,
};

/// Chips Registry - 动态模块注册表
#[derive(Parser)]
#[command(name = "chips-registry")]
#[command(version, about = "动态模块注册表工具", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 注册表配置文件路径（YAML 或 JSON）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别 (debug, info, warn, error, silent)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 校验清单
    ///
    /// 解析清单并校验依赖图，存在问题时以非零状态退出。
    Check {
        /// 清单文件
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// 显示加载顺序
    Order {
        /// 清单文件
        #[arg(short, long)]
        manifest: PathBuf,

        /// 模块 ID
        id: String,
    },

    /// 加载模块
    ///
    /// 模块位置视为相对于根目录的文件路径，回退位置同样适用。
    Load {
        /// 清单文件
        #[arg(short, long)]
        manifest: PathBuf,

        /// 解析根目录
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// 要加载的模块 ID
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// 预加载后输出统计
    Stats {
        /// 清单文件
        #[arg(short, long)]
        manifest: PathBuf,

        /// 解析根目录
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },

    /// 查看版本信息
    Version,
}

/// 读取注册表配置，命令行日志级别优先
async fn load_config(path: Option<&Path>, level: Option<LogLevel>) -> anyhow::Result<RegistryConfig> {
    let mut config = match path {
        Some(path) => RegistryConfig::from_file(path)
            .await
            .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
        None => RegistryConfig::default(),
    };
    if let Some(level) = level {
        config.log_level = level;
    }
    config.validate()?;
    Ok(config)
}

async fn build_registry(
    config: RegistryConfig,
    manifest: &Path,
    root: &Path,
) -> anyhow::Result<ModuleRegistry> {
    let registry = ModuleRegistry::builder(Arc::new(FsResolver::new(root)))
        .config(config)
        .build()?;
    let count = registry
        .register_manifest(manifest)
        .await
        .with_context(|| format!("无法注册清单 {}", manifest.display()))?;
    debug!(count, "清单已注册");
    Ok(registry)
}

/// 校验清单
async fn run_check(manifest: &Path) -> anyhow::Result<()> {
    let modules = ManifestParser::parse_file(manifest)
        .await
        .with_context(|| format!("清单无效: {}", manifest.display()))?;

    let registry = ModuleRegistry::new(Arc::new(FsResolver::new(".")));
    for module in modules {
        registry.register_module(module);
    }
    let report = registry.validate_dependencies();

    println!("模块数量: {}", registry.get_all_modules().len());
    for cycle in &report.cycles {
        println!("循环依赖: {}", cycle.join(" -> "));
    }
    for (module_id, dependency) in &report.missing {
        println!("未注册的依赖: {module_id} -> {dependency}");
    }

    if report.is_clean() {
        println!("清单有效");
        Ok(())
    } else {
        bail!(
            "发现 {} 个循环依赖和 {} 个悬空依赖",
            report.cycles.len(),
            report.missing.len()
        )
    }
}

/// 显示加载顺序
async fn run_order(manifest: &Path, id: &str) -> anyhow::Result<()> {
    let registry = build_registry(RegistryConfig::default(), manifest, Path::new(".")).await?;
    let order = registry.get_load_order(id);
    if order.is_empty() {
        bail!("模块未注册: {id}");
    }
    for (index, module_id) in order.iter().enumerate() {
        println!("{:>3}. {module_id}", index + 1);
    }
    Ok(())
}

/// 加载模块并输出结果
async fn run_load(
    config: RegistryConfig,
    manifest: &Path,
    root: &Path,
    ids: &[String],
) -> anyhow::Result<()> {
    let registry = build_registry(config, manifest, root).await?;

    let mut results = Vec::with_capacity(ids.len());
    let mut failed = 0usize;
    for id in ids {
        match registry.try_load_module(id, false).await {
            Ok(instance) => {
                if instance.status == ModuleStatus::Error {
                    failed += 1;
                }
                results.push(json!({
                    "id": instance.id,
                    "status": instance.status,
                    "load_time_ms": instance.load_time_ms,
                    "access_count": instance.access_count,
                    "error": instance.error.as_ref().map(|e| e.to_string()),
                    "warnings": instance.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
                }));
            }
            Err(e) => {
                failed += 1;
                results.push(json!({ "id": id, "error": e.to_string(), "code": e.error_code() }));
            }
        }
    }

    let output = json!({
        "modules": results,
        "stats": registry.get_stats(),
        "performance": registry.get_performance_metrics(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    registry.shutdown();
    if failed > 0 {
        bail!("{failed} 个模块加载失败");
    }
    Ok(())
}

/// 预加载并输出统计
async fn run_stats(config: RegistryConfig, manifest: &Path, root: &Path) -> anyhow::Result<()> {
    let registry = build_registry(config, manifest, root).await?;
    registry.initialize().await?;
    println!("{}", serde_json::to_string_pretty(&registry.get_stats())?);
    registry.shutdown();
    Ok(())
}

/// 打印版本信息
fn print_version() {
    println!("Chips Registry {}", chips_registry::VERSION);
    println!("  目标平台: {}", std::env::consts::ARCH);
    println!("  操作系统: {}", std::env::consts::OS);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        print_version();
        return Ok(());
    }

    let config = load_config(cli.config.as_deref(), cli.log_level).await?;
    let _guard = Logger::try_init(LoggerConfig::from_log_config(&config.logging, config.log_level));
    info!(version = chips_registry::VERSION, "chips-registry 启动");

    match &cli.command {
        Commands::Check { manifest } => run_check(manifest).await,
        Commands::Order { manifest, id } => run_order(manifest, id).await,
        Commands::Load { manifest, root, ids } => run_load(config, manifest, root, ids).await,
        Commands::Stats { manifest, root } => run_stats(config, manifest, root).await,
        Commands::Version => Ok(()),
    }
}
