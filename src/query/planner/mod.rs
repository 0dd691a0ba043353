//! 计划表示与启发式重写

pub mod plan;
pub mod rewrite;

pub use plan::{PlanNode, PlanRef};
pub use rewrite::{optimize_heuristic, PlanRewriter, Program, RewriteOutcome};
