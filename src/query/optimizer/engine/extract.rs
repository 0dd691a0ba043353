//! 最优计划提取
//!
//! 从根子集出发沿各子集的最优指针递归展开，把句柄输入替换为提取出的子计划，
//! 得到与备忘录脱离的独立计划树。

use crate::core::error::{PlanningError, PlanningResult};
use crate::query::optimizer::core::TraitSet;
use crate::query::optimizer::plan::Memo;
use crate::query::planner::plan::{PlanRef, SetId};

/// 提取 `(set, traits)` 子集的最优计划
///
/// 子集没有有限代价的最优成员时返回 `NoPhysicalPlan`，标明无法满足的等价集与属性集。
pub fn extract(memo: &Memo, set: SetId, traits: &TraitSet) -> PlanningResult<PlanRef> {
    let mut path = Vec::new();
    extract_subset(memo, set, traits, &mut path)
}

fn extract_subset(
    memo: &Memo,
    set: SetId,
    traits: &TraitSet,
    path: &mut Vec<(SetId, TraitSet)>,
) -> PlanningResult<PlanRef> {
    let set = memo.canonical_const(set);
    if path.iter().any(|(s, t)| *s == set && t == traits) {
        return Err(PlanningError::internal(format!(
            "最优计划指针存在环: 等价集 {} 属性 {}",
            set, traits
        )));
    }

    let best = memo
        .group(set)
        .subset(traits)
        .and_then(|subset| subset.best.filter(|_| !subset.best_cost.is_infinite()));
    let Some(best) = best else {
        return Err(PlanningError::no_physical_plan(set.index(), traits.clone()));
    };

    let node = memo.member(best).node.clone();
    if node.inputs().is_empty() {
        return Ok(node);
    }

    path.push((set, traits.clone()));
    let mut inputs = Vec::with_capacity(node.inputs().len());
    for input in node.inputs() {
        let resolved = match input.set_id() {
            Some(input_set) => extract_subset(memo, input_set, input.traits(), path)?,
            None => input.clone(),
        };
        inputs.push(resolved);
    }
    path.pop();
    Ok(node.with_inputs(inputs))
}
