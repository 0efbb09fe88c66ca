//! 标识符工具
//!
//! 模块 ID 格式校验与加载操作 ID 生成。

use std::sync::OnceLock;

use regex::Regex;

/// 模块 ID 允许的最大长度
const MAX_MODULE_ID_LENGTH: usize = 128;

fn module_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("静态正则表达式"))
}

/// 验证模块 ID 格式是否有效
///
/// 只允许字母、数字、下划线、点和连字符，且不能以点或连字符开头。
///
/// # Example
///
/// ```
/// use chips_registry::utils::id::is_valid_module_id;
///
/// assert!(is_valid_module_id("sales.orders"));
/// assert!(is_valid_module_id("hr-payroll_v2"));
/// assert!(!is_valid_module_id("-bad"));
/// assert!(!is_valid_module_id("with space"));
/// ```
pub fn is_valid_module_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_MODULE_ID_LENGTH && module_id_pattern().is_match(id)
}

/// 生成加载操作 ID
///
/// 用于在日志中关联同一次加载操作的所有事件
pub fn generate_operation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
