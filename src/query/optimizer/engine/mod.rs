//! 优化引擎模块
//! 基于代价的规划器、规则队列与最优计划提取

pub mod extract;
pub mod optimizer;
pub mod rule_queue;

use std::sync::Arc;

pub use extract::extract;
pub use optimizer::{PlannerStats, VolcanoPlanner};
pub use rule_queue::{RuleMatch, RuleQueue};

use crate::core::error::PlanningResult;
use crate::query::optimizer::core::{CostFactory, TraitDefRegistry, TraitSet};
use crate::query::optimizer::rule_registry::RuleRegistry;
use crate::query::planner::plan::PlanRef;

/// 在默认代价模型下为 `root` 求满足 `required_traits` 的最优物理计划
///
/// 属性定义注册表由 `required_traits` 推断；需要自定义代价模型、属性定义或预算时
/// 直接使用 `VolcanoPlanner`。返回的计划与规划会话脱离。
pub fn optimize(
    root: PlanRef,
    required_traits: TraitSet,
    rules: &RuleRegistry,
    cost_factory: Arc<dyn CostFactory>,
) -> PlanningResult<PlanRef> {
    let mut planner = VolcanoPlanner::new(rules.clone(), cost_factory)
        .with_trait_defs(TraitDefRegistry::infer_from(&required_traits));
    planner.set_root(&root, required_traits)?;
    planner.find_best_exp()
}
