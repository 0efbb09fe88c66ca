//! 模块依赖关系图
//!
//! 由已注册的模块声明派生出邻接结构，用于循环依赖检测和加载顺序计算。
//! 依赖图不做持久化，注册表在声明变化后惰性重建。
//!
//! # 示例
//!
//! ```rust
//! use chips_registry::module::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_dependency("app", "service");
//! graph.add_dependency("service", "database");
//!
//! assert_eq!(graph.topological_order("app"), vec!["database", "service", "app"]);
//! assert!(graph.detect_cycles().is_empty());
//! ```

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::module::metadata::ModuleConfig;

/// 依赖图校验报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphReport {
    /// 检测到的所有循环，每条路径首尾相同（如 `a -> b -> a`）
    pub cycles: Vec<Vec<String>>,
    /// 悬空引用：(依赖方, 未注册的依赖 ID)
    pub missing: Vec<(String, String)>,
}

impl GraphReport {
    /// 是否没有任何问题
    pub fn is_clean(&self) -> bool {
        self.cycles.is_empty() && self.missing.is_empty()
    }
}

/// 模块依赖关系图
///
/// 节点按插入顺序保存，边按声明顺序保存，因此所有遍历结果都是确定的。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点插入顺序
    nodes: Vec<String>,
    /// 正向边：模块 ID -> 该模块依赖的模块列表
    edges: HashMap<String, Vec<String>>,
    /// 反向边：模块 ID -> 依赖该模块的模块列表
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// 创建一个空的依赖图
    pub fn new() -> Self {
        Self::default()
    }

    /// 从模块声明构建依赖图
    ///
    /// 每个声明的依赖产生一条边；指向未知 ID 的依赖在结构上是允许的，
    /// 会在加载时失败。
    pub fn build<'a>(configs: impl IntoIterator<Item = &'a ModuleConfig>) -> Self {
        let mut graph = Self::new();
        for config in configs {
            graph.add_module(&config.id);
            for dep in &config.dependencies {
                graph.add_dependency(&config.id, dep);
            }
        }
        graph
    }

    /// 添加模块节点，已存在时忽略
    pub fn add_module(&mut self, module_id: &str) {
        if !self.edges.contains_key(module_id) {
            self.nodes.push(module_id.to_string());
            self.edges.insert(module_id.to_string(), Vec::new());
        }
        self.reverse_edges.entry(module_id.to_string()).or_default();
    }

    /// 添加依赖关系：`module_id` 依赖 `dependency_id`
    ///
    /// 被依赖方不会成为图中的节点，只记录反向边。
    pub fn add_dependency(&mut self, module_id: &str, dependency_id: &str) {
        self.add_module(module_id);

        let deps = self.edges.entry(module_id.to_string()).or_default();
        if !deps.iter().any(|d| d == dependency_id) {
            deps.push(dependency_id.to_string());
        }

        let rev_deps = self
            .reverse_edges
            .entry(dependency_id.to_string())
            .or_default();
        if !rev_deps.iter().any(|d| d == module_id) {
            rev_deps.push(module_id.to_string());
        }
    }

    /// 模块的直接依赖（声明顺序）
    pub fn dependencies(&self, module_id: &str) -> Vec<String> {
        self.edges.get(module_id).cloned().unwrap_or_default()
    }

    /// 直接依赖该模块的模块
    pub fn dependents(&self, module_id: &str) -> Vec<String> {
        self.reverse_edges.get(module_id).cloned().unwrap_or_default()
    }

    /// 模块的所有传递依赖，深层依赖在前
    pub fn transitive_dependencies(&self, module_id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(module_id.to_string());
        self.collect_dependencies(module_id, &mut result, &mut visited);
        result
    }

    fn collect_dependencies(
        &self,
        module_id: &str,
        result: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) {
        if let Some(deps) = self.edges.get(module_id) {
            for dep in deps {
                if visited.insert(dep.clone()) {
                    self.collect_dependencies(dep, result, visited);
                    result.push(dep.clone());
                }
            }
        }
    }

    /// `from` 是否（直接或间接）依赖 `to`，模块视为依赖自身
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        from == to || self.transitive_dependencies(from).iter().any(|d| d == to)
    }

    /// 检测所有循环依赖
    ///
    /// 深度优先遍历，递归栈上的节点被再次访问即构成一个环。
    /// 每个节点只展开一次，任何有限图（包括自环和全连通图）都会终止。
    /// 同一个环的不同旋转只报告一次。
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cycles = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node) {
                self.find_cycles_util(
                    node,
                    &mut visited,
                    &mut rec_stack,
                    &mut path,
                    &mut seen,
                    &mut cycles,
                );
            }
        }

        cycles
    }

    fn find_cycles_util(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
        seen: &mut HashSet<Vec<String>>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(neighbors) = self.edges.get(node) {
            for neighbor in neighbors {
                if rec_stack.contains(neighbor) {
                    if let Some(start) = path.iter().position(|n| n == neighbor) {
                        let members = path[start..].to_vec();
                        if seen.insert(canonical_rotation(&members)) {
                            let mut cycle = members;
                            cycle.push(neighbor.clone());
                            cycles.push(cycle);
                        }
                    }
                } else if !visited.contains(neighbor) {
                    self.find_cycles_util(neighbor, visited, rec_stack, path, seen, cycles);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
    }

    /// 是否存在循环依赖
    pub fn has_cycle(&self) -> bool {
        !self.detect_cycles().is_empty()
    }

    /// 计算 `root` 的加载顺序：依赖在前，依赖方在后，`root` 在最后
    ///
    /// 遇到包含在当前递归栈中的依赖（即环）时跳过该边，
    /// 环内模块因此按声明顺序排列，不会无限递归。
    /// `root` 未注册时返回空列表。
    pub fn topological_order(&self, root: &str) -> Vec<String> {
        if !self.edges.contains_key(root) {
            return Vec::new();
        }
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        self.visit_post_order(root, &mut order, &mut visited, &mut on_stack);
        order
    }

    /// 整张图的加载顺序（按节点插入顺序展开，环按声明顺序降级）
    pub fn load_order(&self) -> Vec<String> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        for node in &self.nodes {
            self.visit_post_order(node, &mut order, &mut visited, &mut on_stack);
        }
        order
    }

    /// 将给定的模块按依赖顺序排列，不在图中的 ID 排在最后并保持原顺序
    pub fn sort_by_load_order(&self, ids: &[String]) -> Vec<String> {
        let wanted: HashSet<&String> = ids.iter().collect();
        let mut sorted: Vec<String> = self
            .load_order()
            .into_iter()
            .filter(|id| wanted.contains(id))
            .collect();
        for id in ids {
            if !sorted.contains(id) {
                sorted.push(id.clone());
            }
        }
        sorted
    }

    fn visit_post_order(
        &self,
        node: &str,
        order: &mut Vec<String>,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
    ) {
        if visited.contains(node) {
            return;
        }
        visited.insert(node.to_string());
        on_stack.insert(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if on_stack.contains(dep) {
                    continue;
                }
                self.visit_post_order(dep, order, visited, on_stack);
            }
        }

        on_stack.remove(node);
        order.push(node.to_string());
    }

    /// 校验依赖图：列出所有环和所有悬空依赖
    pub fn validate(&self, known_ids: &HashSet<String>) -> GraphReport {
        let mut missing = Vec::new();
        for node in &self.nodes {
            for dep in self.edges.get(node).into_iter().flatten() {
                if !known_ids.contains(dep) {
                    missing.push((node.clone(), dep.clone()));
                }
            }
        }

        GraphReport {
            cycles: self.detect_cycles(),
            missing,
        }
    }

    /// 图中模块节点数量
    pub fn module_count(&self) -> usize {
        self.nodes.len()
    }

    /// 图中边的数量
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// 图是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 是否包含指定模块
    pub fn contains_module(&self, module_id: &str) -> bool {
        self.edges.contains_key(module_id)
    }
}

/// 将环旋转到字典序最小的成员开头，用于去重
fn canonical_rotation(members: &[String]) -> Vec<String> {
    let start = members
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    members[start..]
        .iter()
        .chain(members[..start].iter())
        .cloned()
        .collect()
}
