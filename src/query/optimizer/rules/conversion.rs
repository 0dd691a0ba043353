//! 物理属性转换规则
//!
//! 备忘录为无人满足的子集创建"需要转换"占位成员，占位成员的输入是同一等价集的
//! 通配句柄。这里的规则以占位成员为根，逐个查看等价集里的已有成员，为可以转换的
//! 成员提出具体的转换节点。

use crate::core::error::RuleError;
use crate::query::optimizer::core::{Trait, COLLATION_DEF};
use crate::query::optimizer::pattern::Operand;
use crate::query::optimizer::rule_traits::{Rule, RuleCall};
use crate::query::planner::plan::{NodeKind, OperatorKind, PlanNode, PlanRef, SetId};

fn placeholder_operand() -> Operand {
    Operand::of(OperatorKind::AbstractConverter).exact(vec![Operand::any_node()])
}

/// 占位成员所在的等价集（由它的通配输入句柄给出）
fn placeholder_set(placeholder: &PlanRef) -> Result<SetId, RuleError> {
    placeholder
        .input(0)
        .and_then(|input| input.set_id())
        .ok_or_else(|| RuleError::new(format!("占位节点 {} 缺少等价集输入", placeholder.digest())))
}

/// 把占位成员展开为通用转换节点
///
/// # 转换示例
///
/// Before:
/// ```text
///   AbstractConverter.BINDABLE(Subset#3.ANY)
///       Subset#3 中的成员 Scan.ENUMERABLE
/// ```
///
/// After:
/// ```text
///   Converter.BINDABLE(Subset#3.ENUMERABLE)
/// ```
///
/// # 适用条件
///
/// - 成员尚未满足占位成员要求的属性集
/// - 每个不满足的属性都能由属性定义转换得到
#[derive(Debug)]
pub struct ExpandConversionRule {
    operand: Operand,
}

impl ExpandConversionRule {
    pub fn new() -> Self {
        Self {
            operand: placeholder_operand(),
        }
    }
}

impl Default for ExpandConversionRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ExpandConversionRule {
    fn name(&self) -> &str {
        "ExpandConversionRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn matches(&self, call: &RuleCall<'_>) -> bool {
        !call.rel(1).traits().satisfies(call.rel(0).traits())
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        let placeholder = call.rel(0).clone();
        let member = call.rel(1).clone();
        let required = placeholder.traits();

        let mut traits = member.traits().clone();
        for target in member.traits().unsatisfied(required) {
            let convertible = member
                .traits()
                .get(target.def_name())
                .map(|from| call.planner().trait_defs().can_convert(from, target))
                .unwrap_or(false);
            if !convertible {
                return Ok(());
            }
            traits = traits.replace(target.clone());
        }

        let set = placeholder_set(&placeholder)?;
        let input = PlanNode::subset(set, member.traits().clone(), member.row_type().clone());
        let converter = PlanNode::new(
            NodeKind::Converter,
            traits,
            member.row_type().clone(),
            vec![input],
        );
        call.transform_to(converter)
    }
}

/// 为排序要求插入排序节点
///
/// 占位成员要求的属性集中只有排序不满足时，在成员之上加一个排序。
///
/// # 转换示例
///
/// Before:
/// ```text
///   AbstractConverter.ENUMERABLE.[0](Subset#3.ANY)
///       Subset#3 中的成员 Scan.ENUMERABLE
/// ```
///
/// After:
/// ```text
///   Sort[0].ENUMERABLE.[0](Subset#3.ENUMERABLE)
/// ```
#[derive(Debug)]
pub struct SortEnforcerRule {
    operand: Operand,
}

impl SortEnforcerRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(OperatorKind::AbstractConverter)
                .with_predicate(|node| {
                    node.traits()
                        .collation()
                        .map(|c| !c.is_empty())
                        .unwrap_or(false)
                })
                .exact(vec![Operand::any_node()]),
        }
    }
}

impl Default for SortEnforcerRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for SortEnforcerRule {
    fn name(&self) -> &str {
        "SortEnforcerRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn matches(&self, call: &RuleCall<'_>) -> bool {
        let member = call.rel(1).traits();
        if member.is_logical() {
            return false;
        }
        let unsatisfied = member.unsatisfied(call.rel(0).traits());
        !unsatisfied.is_empty() && unsatisfied.iter().all(|t| t.def_name() == COLLATION_DEF)
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        let placeholder = call.rel(0).clone();
        let member = call.rel(1).clone();
        let Some(collation) = placeholder.traits().collation().cloned() else {
            return Ok(());
        };

        let set = placeholder_set(&placeholder)?;
        let input = PlanNode::subset(set, member.traits().clone(), member.row_type().clone());
        let traits = member.traits().replace(Trait::Collation(collation.clone()));
        let sort = PlanNode::new(
            NodeKind::Sort { collation },
            traits,
            member.row_type().clone(),
            vec![input],
        );
        call.transform_to(sort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DataType, RowType};
    use crate::query::optimizer::core::{
        Collation, CollationTraitDef, Convention, ConventionTraitDef, FieldCollation,
        TraitDefRegistry, TraitSet,
    };
    use crate::query::optimizer::rule_traits::{fire_rule, PlannerView};
    use crate::query::planner::plan::PlanNode;
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

    fn view() -> View {
        View(
            TraitDefRegistry::new()
                .with_def(Arc::new(ConventionTraitDef::new().with_conversion(
                    Convention::physical("ENUMERABLE"),
                    Convention::physical("BINDABLE"),
                )))
                .with_def(Arc::new(CollationTraitDef)),
        )
    }

    fn row_type() -> RowType {
        RowType::of(&[("id", DataType::Int)])
    }

    fn placeholder(traits: TraitSet) -> PlanRef {
        let input = PlanNode::subset(SetId(3), TraitSet::new(vec![Trait::Convention(Convention::Any)]), Arc::new(row_type()));
        PlanNode::new(NodeKind::AbstractConverter, traits, Arc::new(row_type()), vec![input])
    }

    fn member(convention: &str) -> PlanRef {
        PlanNode::table_scan("emp", row_type()).with_traits(TraitSet::of_convention(convention))
    }

    #[test]
    fn test_expand_conversion_proposes_converter() {
        let view = view();
        let rule = ExpandConversionRule::new();
        let rels = vec![placeholder(TraitSet::of_convention("BINDABLE")), member("ENUMERABLE")];
        let results = fire_rule(&rule, rels, &view).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].digest(), "Converter.BINDABLE(Subset#3.ENUMERABLE)");
    }

    #[test]
    fn test_expand_conversion_declines_unconvertible() {
        let view = view();
        let rule = ExpandConversionRule::new();
        let rels = vec![placeholder(TraitSet::of_convention("ENUMERABLE")), member("BINDABLE")];
        assert!(fire_rule(&rule, rels, &view).unwrap().is_empty());

        // 已经满足的成员不需要转换
        let rels = vec![placeholder(TraitSet::of_convention("BINDABLE")), member("BINDABLE")];
        assert!(fire_rule(&rule, rels, &view).unwrap().is_empty());
    }

    #[test]
    fn test_sort_enforcer() {
        let view = view();
        let rule = SortEnforcerRule::new();
        let sorted = TraitSet::of_convention("ENUMERABLE")
            .replace(Trait::Collation(Collation::new(vec![FieldCollation::asc(0)])));
        let rels = vec![placeholder(sorted.clone()), member("ENUMERABLE")];
        let results = fire_rule(&rule, rels, &view).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].traits(), &sorted);
        assert_eq!(
            results[0].digest(),
            "Sort[0].ENUMERABLE.[0](Subset#3.ENUMERABLE)"
        );

        // 约定也不满足时交给其他规则
        let rels = vec![placeholder(sorted), member("BINDABLE")];
        assert!(fire_rule(&rule, rels, &view).unwrap().is_empty());
    }
}
