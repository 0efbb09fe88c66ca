//! 注册表日志
//!
//! 在 tracing 订阅者上挂载注册表需要的输出：
//!
//! - 级别取自注册表配置的 `log_level`，`silent` 关闭全部输出
//! - 控制台输出，可读文本或 JSON 行
//! - 可选的滚动日志文件，通过非阻塞写入器落盘
//! - 设置了 `RUST_LOG` 时以环境变量为准
//!
//! # 示例
//!
//! ```rust,no_run
//! use chips_registry::utils::logger::{LogLevel, Logger, LoggerConfig};
//!
//! let config = LoggerConfig::builder()
//!     .level(LogLevel::Debug)
//!     .json_format(true)
//!     .build();
//! let _guard = Logger::init(config).unwrap();
//!
//! tracing::info!(module_id = "sales", "模块已注册");
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::core::config::LogConfig;
use crate::utils::{RegistryError, Result};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "chips-registry.log";

/// 注册表日志级别
///
/// `Silent` 关闭注册表的全部日志输出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// 调试
    Debug,
    /// 信息
    #[default]
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
    /// 关闭输出
    Silent,
}

impl LogLevel {
    /// 对应的 EnvFilter 指令
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let level = match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "silent" | "off" | "none" => LogLevel::Silent,
            other => {
                return Err(RegistryError::InvalidConfigValue {
                    key: "log_level".to_string(),
                    reason: format!("未知的日志级别 '{other}'"),
                })
            }
        };
        Ok(level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Silent => f.write_str("silent"),
            other => f.write_str(other.as_directive()),
        }
    }
}

/// 日志文件轮转周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    /// 始终写同一个文件
    Never,
    /// 按小时
    Hourly,
    /// 按天
    #[default]
    Daily,
}

impl RotationStrategy {
    /// 解析配置中的轮转周期，无法识别时按天轮转
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "none" => RotationStrategy::Never,
            "hourly" | "hour" => RotationStrategy::Hourly,
            _ => RotationStrategy::Daily,
        }
    }

    fn appender_rotation(self) -> Rotation {
        match self {
            RotationStrategy::Never => Rotation::NEVER,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        }
    }
}

/// 日志输出配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 输出 JSON 行
    pub json_format: bool,
    /// 写控制台
    pub console_output: bool,
    /// 日志文件目录，None 时不写文件
    pub file_output: Option<PathBuf>,
    /// 文件轮转周期
    pub rotation: RotationStrategy,
    /// 追加的 EnvFilter 指令，如 `chips_registry::module=debug`
    pub directives: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            console_output: true,
            file_output: None,
            rotation: RotationStrategy::Daily,
            directives: Vec::new(),
        }
    }
}

impl LoggerConfig {
    /// 创建构建器
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::default()
    }

    /// 由注册表配置的日志段与级别得到日志配置
    pub fn from_log_config(log_config: &LogConfig, level: LogLevel) -> Self {
        let file_output = log_config
            .log_dir
            .clone()
            .filter(|_| log_config.file_output);
        Self {
            level,
            json_format: log_config.json_format,
            file_output,
            rotation: RotationStrategy::parse(&log_config.rotation),
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let base = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()));
        self.directives
            .iter()
            .filter_map(|d| d.trim().parse().ok())
            .fold(base, EnvFilter::add_directive)
    }
}

/// [`LoggerConfig`] 构建器
#[derive(Debug, Default)]
pub struct LoggerConfigBuilder {
    config: LoggerConfig,
}

impl LoggerConfigBuilder {
    /// 日志级别
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// 是否输出 JSON 行
    pub fn json_format(mut self, enable: bool) -> Self {
        self.config.json_format = enable;
        self
    }

    /// 是否写控制台
    pub fn console_output(mut self, enable: bool) -> Self {
        self.config.console_output = enable;
        self
    }

    /// 同时写入该目录下的滚动日志文件
    pub fn file_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.file_output = Some(dir.into());
        self
    }

    /// 文件轮转周期
    pub fn rotation(mut self, strategy: RotationStrategy) -> Self {
        self.config.rotation = strategy;
        self
    }

    /// 追加一条过滤指令
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.config.directives.push(directive.into());
        self
    }

    /// 完成构建
    pub fn build(self) -> LoggerConfig {
        self.config
    }
}

/// 日志守卫
///
/// 丢弃时刷新非阻塞写入器中尚未落盘的日志，需要在进程退出前一直持有。
#[derive(Default)]
pub struct LogGuard {
    workers: Vec<WorkerGuard>,
}

impl LogGuard {
    /// 是否没有持有任何写入器
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn output_layer<W>(writer: W, json: bool, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true);
    if json {
        layer.json().with_ansi(false).boxed()
    } else {
        layer.with_ansi(ansi).boxed()
    }
}

static INSTALLED: OnceLock<()> = OnceLock::new();

/// 日志系统
pub struct Logger;

impl Logger {
    /// 安装全局订阅者
    ///
    /// # Errors
    ///
    /// 本进程已经安装过订阅者时返回 `InitFailed`
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if INSTALLED.get().is_some() {
            return Err(RegistryError::InitFailed("日志系统已经安装".to_string()));
        }

        let mut guard = LogGuard::default();
        let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

        if config.console_output {
            let (writer, worker) = tracing_appender::non_blocking(io::stdout());
            guard.workers.push(worker);
            layers.push(output_layer(writer, config.json_format, true));
        }

        if let Some(dir) = &config.file_output {
            let appender =
                RollingFileAppender::new(config.rotation.appender_rotation(), dir, LOG_FILE_PREFIX);
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guard.workers.push(worker);
            layers.push(output_layer(writer, config.json_format, false));
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(config.env_filter())
            .try_init()
            .map_err(|e| RegistryError::InitFailed(format!("无法安装日志订阅者: {e}")))?;
        let _ = INSTALLED.set(());

        Ok(guard)
    }

    /// 安装全局订阅者，已经安装过时返回空守卫
    pub fn try_init(config: LoggerConfig) -> LogGuard {
        Self::init(config).unwrap_or_default()
    }
}

/// 注册表日志中使用的结构化字段名
pub mod fields {
    /// 模块 ID
    pub const MODULE_ID: &str = "module_id";
    /// 加载操作 ID
    pub const OPERATION_ID: &str = "operation_id";
    /// 耗时（毫秒）
    pub const DURATION_MS: &str = "duration_ms";
    /// 模块状态
    pub const STATUS: &str = "status";
    /// 是否强制重载
    pub const FORCE_RELOAD: &str = "force_reload";
}
