//! RelOpt - 规则驱动的关系查询优化器
//!
//! 提供两种规划器：
//!
//! - 代价规划器（`VolcanoPlanner`）：把所有等价的计划登记在备忘录中，按代价模型
//!   选出满足要求物理属性的最优计划
//! - 启发式规划器（`PlanRewriter`）：按程序顺序应用规则，每次匹配立即替换原节点
//!
//! 两者共用同一套计划节点、操作数模式与规则接口。

pub mod config;
pub mod core;
pub mod query;
pub mod utils;

pub use crate::core::error::{PlanningError, PlanningResult};
pub use crate::query::optimizer::optimize;
pub use crate::query::planner::rewrite::optimize_heuristic;
