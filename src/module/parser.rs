//! 模块清单解析器
//!
//! 从 YAML 或 JSON 清单解析模块声明。清单可以是 `{ modules: [...] }`
//! 形式的文档，也可以直接是声明列表：
//!
//! ```yaml
//! modules:
//!   - id: sales
//!     name: 销售
//!     location: ./modules/sales
//!     dependencies: [stock]
//!   - id: stock
//!     location: ./modules/stock
//!     lazy: true
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::module::metadata::ModuleConfig;
use crate::utils::{is_valid_module_id, RegistryError, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestDocument {
    Wrapped { modules: Vec<ModuleConfig> },
    List(Vec<ModuleConfig>),
}

impl ManifestDocument {
    fn into_modules(self) -> Vec<ModuleConfig> {
        match self {
            ManifestDocument::Wrapped { modules } | ManifestDocument::List(modules) => modules,
        }
    }
}

/// 模块清单解析器
#[derive(Debug, Clone, Default)]
pub struct ManifestParser;

impl ManifestParser {
    /// 从文件解析清单
    ///
    /// `.json` 扩展名按 JSON 解析，其余按 YAML 解析。
    ///
    /// # Errors
    ///
    /// - 文件无法读取时返回 IO 错误
    /// - 内容格式错误时返回 `Json` / `Yaml` 错误
    /// - 校验失败时返回 `InvalidConfig` 错误
    pub async fn parse_file(path: &Path) -> Result<Vec<ModuleConfig>> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_with_format(&content, is_json(path))
    }

    /// 从文件同步解析清单
    pub fn parse_file_sync(path: &Path) -> Result<Vec<ModuleConfig>> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_with_format(&content, is_json(path))
    }

    /// 从 YAML 字符串解析清单
    pub fn parse_string(content: &str) -> Result<Vec<ModuleConfig>> {
        Self::parse_with_format(content, false)
    }

    /// 按指定格式解析清单
    pub fn parse_with_format(content: &str, json: bool) -> Result<Vec<ModuleConfig>> {
        let document: ManifestDocument = if json {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };
        let modules = document.into_modules();
        Self::validate(&modules)?;
        Ok(modules)
    }

    /// 校验模块声明
    ///
    /// 执行以下校验，所有问题汇总为一个 `InvalidConfig` 错误：
    /// - ID 非空且只包含字母、数字、`_`、`.`、`-`
    /// - 位置非空
    /// - 版本号（如果有）符合 semver
    /// - 同一清单内 ID 不重复
    /// - 依赖 ID 非空
    pub fn validate(modules: &[ModuleConfig]) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        for (index, module) in modules.iter().enumerate() {
            if module.id.is_empty() {
                errors.push(format!("第 {} 个模块的 ID 不能为空", index + 1));
            } else if !is_valid_module_id(&module.id) {
                errors.push(format!("模块 ID '{}' 格式无效", module.id));
            } else if !seen.insert(module.id.as_str()) {
                errors.push(format!("模块 ID '{}' 重复", module.id));
            }

            if module.location.trim().is_empty() {
                errors.push(format!("模块 '{}' 的位置不能为空", module.id));
            }

            if !module.version.is_empty() && semver::Version::parse(&module.version).is_err() {
                errors.push(format!(
                    "模块 '{}' 的版本号 '{}' 无效，请使用 semver 格式 (如 1.0.0)",
                    module.id, module.version
                ));
            }

            if module.dependencies.iter().any(|d| d.trim().is_empty()) {
                errors.push(format!("模块 '{}' 含有空的依赖 ID", module.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::InvalidConfig(errors.join("; ")))
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
