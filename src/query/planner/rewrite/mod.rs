//! 启发式重写
//!
//! 不做代价比较的顺序规划器：按程序指令把规则应用到计划上，规则提出的第一个
//! 等价节点立即替换原节点，直到规则不再匹配（或达到变换次数上限）。
//!
//! # 组成
//!
//! - `program`: 程序与构造器，指定规则、遍历顺序、匹配上限与规则组
//! - `graph`: 重写图，计划树按顶点存放，可以按摘要共享相同子树
//! - `plan_rewriter`: 执行程序的重写器
//!
//! # 使用示例
//!
//! ```
//! use std::sync::Arc;
//! use relopt::core::schema::{DataType, RowType};
//! use relopt::query::optimizer::rules::FilterMergeRule;
//! use relopt::query::planner::plan::PlanNode;
//! use relopt::query::planner::rewrite::{PlanRewriter, Program};
//!
//! let scan = PlanNode::table_scan("emp", RowType::of(&[("id", DataType::Int)]));
//! let plan = PlanNode::filter(PlanNode::filter(scan, "$0 > 1"), "$0 < 9");
//! let program = Program::of_rules(vec![Arc::new(FilterMergeRule::new())]);
//! let outcome = PlanRewriter::new(program).rewrite(&plan).unwrap();
//! assert_eq!(outcome.plan.tree_size(), 2);
//! ```

pub mod graph;
pub mod plan_rewriter;
pub mod program;
pub mod result;

pub use graph::PlanGraph;
pub use plan_rewriter::{optimize_heuristic, PlanRewriter};
pub use program::{Instruction, MatchOrder, Program, ProgramBuilder};
pub use result::RewriteOutcome;
