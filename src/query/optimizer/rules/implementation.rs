//! 实现规则
//!
//! 把逻辑算子（`NONE` 约定）实现为某个调用约定下的物理算子。

use crate::core::error::RuleError;
use crate::query::optimizer::core::{Convention, Trait, TraitSet};
use crate::query::optimizer::pattern::Operand;
use crate::query::optimizer::rule_traits::{Rule, RuleCall};
use crate::query::planner::plan::{NodeKind, OperatorKind, PlanNode, PlanRef};

/// 节点种类映射，例如 `Join` → `HashJoin`
pub type KindMapping = fn(&NodeKind) -> NodeKind;

/// 通用实现规则
///
/// 匹配指定种类的逻辑节点，提出同种类（或经映射后的种类）的物理节点：
/// 节点自身与所有句柄输入的约定都替换为目标约定。
///
/// # 转换示例
///
/// Before:
/// ```text
///   Join[inner, $0 = $1].NONE(Subset#0.NONE, Subset#1.NONE)
/// ```
///
/// After（映射为哈希连接）:
/// ```text
///   HashJoin[inner, $0 = $1].ENUMERABLE(Subset#0.ENUMERABLE, Subset#1.ENUMERABLE)
/// ```
#[derive(Debug)]
pub struct ConventionRule {
    name: String,
    operand: Operand,
    convention: Convention,
    mapping: Option<KindMapping>,
}

impl ConventionRule {
    pub fn new(name: impl Into<String>, kind: OperatorKind, convention: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operand: Operand::of(kind).with_traits(TraitSet::logical()).any(),
            convention: Convention::physical(convention),
            mapping: None,
        }
    }

    pub fn with_mapping(mut self, mapping: KindMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    fn convert_input(&self, input: &PlanRef) -> PlanRef {
        match input.set_id() {
            Some(set) => {
                let traits = input
                    .traits()
                    .replace(Trait::Convention(self.convention.clone()));
                PlanNode::subset(set, traits, input.row_type().clone())
            }
            None => input.clone(),
        }
    }
}

impl Rule for ConventionRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        let node = call.root().clone();
        let kind = match self.mapping {
            Some(mapping) => mapping(node.kind()),
            None => node.kind().clone(),
        };
        let traits = node
            .traits()
            .replace(Trait::Convention(self.convention.clone()));
        let inputs = node
            .inputs()
            .iter()
            .map(|input| self.convert_input(input))
            .collect();
        call.transform_to(PlanNode::new(kind, traits, node.row_type().clone(), inputs))
    }
}

/// 逻辑连接映射为哈希连接
pub fn to_hash_join(kind: &NodeKind) -> NodeKind {
    match kind {
        NodeKind::Join {
            join_type,
            condition,
        } => NodeKind::HashJoin {
            join_type: *join_type,
            condition: condition.clone(),
        },
        other => other.clone(),
    }
}

/// 逻辑连接映射为嵌套循环连接
pub fn to_nested_loop_join(kind: &NodeKind) -> NodeKind {
    match kind {
        NodeKind::Join {
            join_type,
            condition,
        } => NodeKind::NestedLoopJoin {
            join_type: *join_type,
            condition: condition.clone(),
        },
        other => other.clone(),
    }
}

/// 逻辑聚合映射为哈希聚合
pub fn to_hash_aggregate(kind: &NodeKind) -> NodeKind {
    match kind {
        NodeKind::Aggregate { group_keys, aggs } => NodeKind::HashAggregate {
            group_keys: group_keys.clone(),
            aggs: aggs.clone(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DataType, RowType};
    use crate::query::optimizer::core::TraitDefRegistry;
    use crate::query::optimizer::rule_traits::{fire_rule, PlannerView};
    use crate::query::planner::plan::{JoinType, SetId};
    use std::sync::Arc;

    struct View(TraitDefRegistry);

    impl PlannerView for View {
        fn members(&self, input: &PlanRef) -> Vec<PlanRef> {
            vec![input.clone()]
        }

        fn row_count(&self, _node: &PlanNode) -> f64 {
            1.0
        }

        fn trait_defs(&self) -> &TraitDefRegistry {
            &self.0
        }

        fn metadata_epoch(&self) -> u64 {
            0
        }
    }

    fn handle(set: usize) -> PlanRef {
        PlanNode::subset(
            SetId(set),
            TraitSet::logical(),
            Arc::new(RowType::of(&[("id", DataType::Int)])),
        )
    }

    #[test]
    fn test_join_is_mapped_and_inputs_converted() {
        let view = View(TraitDefRegistry::with_convention());
        let rule = ConventionRule::new("HashJoinRule", OperatorKind::Join, "ENUMERABLE")
            .with_mapping(to_hash_join);
        let join = PlanNode::join(handle(0), handle(1), JoinType::Inner, "$0 = $1");
        let results = fire_rule(&rule, vec![join], &view).unwrap();
        assert_eq!(
            results[0].digest(),
            "HashJoin[inner, $0 = $1].ENUMERABLE(Subset#0.ENUMERABLE, Subset#1.ENUMERABLE)"
        );
    }

    #[test]
    fn test_only_logical_nodes_are_accepted() {
        let rule = ConventionRule::new("ScanRule", OperatorKind::TableScan, "ENUMERABLE");
        let scan = PlanNode::table_scan("emp", RowType::of(&[("id", DataType::Int)]));
        assert!(rule.operand().accepts(&scan));
        let physical = scan.with_traits(TraitSet::of_convention("ENUMERABLE"));
        assert!(!rule.operand().accepts(&physical));
        assert_eq!(rule.convention(), &Convention::physical("ENUMERABLE"));
    }
}
