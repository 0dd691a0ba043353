//! 查询优化器模块
//!
//! 提供基于代价的规划器以及规则驱动改写所需的公共部分
//!
//! ## 模块结构
//!
//! - `core` - 代价、代价模型、统计信息、物理属性与优化阶段
//! - `pattern` - 操作数模式与匹配算法
//! - `rule_traits` - 规则与规则调用协议
//! - `rule_registry` - 规则注册表
//! - `plan` - 备忘录：等价集、成员、并查集与元数据缓存
//! - `engine` - 基于代价的规划器与最优计划提取
//! - `rules` - 转换规则、实现规则与逻辑改写规则
//!
//! ## 使用示例
//!
//! ```rust
//! use relopt::core::schema::{DataType, RowType};
//! use relopt::query::optimizer::core::{DefaultCostFactory, TraitSet};
//! use relopt::query::optimizer::rules::ConventionRule;
//! use relopt::query::optimizer::{optimize, RuleRegistry};
//! use relopt::query::planner::plan::{OperatorKind, PlanNode};
//! use std::sync::Arc;
//!
//! let mut rules = RuleRegistry::new();
//! rules.register(Arc::new(ConventionRule::new("ScanRule", OperatorKind::TableScan, "ENUMERABLE")));
//!
//! let scan = PlanNode::table_scan("emp", RowType::of(&[("id", DataType::Int)]));
//! let plan = optimize(scan, TraitSet::of_convention("ENUMERABLE"), &rules, Arc::new(DefaultCostFactory))
//!     .expect("规划失败");
//! assert_eq!(plan.digest(), "TableScan[emp].ENUMERABLE");
//! ```

pub mod core;
pub mod engine;
pub mod pattern;
pub mod plan;
pub mod rule_registry;
pub mod rule_traits;
pub mod rules;

pub use engine::{optimize, PlannerStats, VolcanoPlanner};
pub use pattern::{match_all, match_first, match_tree, ChildPolicy, InputResolver, KindTest, Operand};
pub use rule_registry::RuleRegistry;
pub use rule_traits::{fire_rule, PlannerView, Rule, RuleCall, RuleRef};
