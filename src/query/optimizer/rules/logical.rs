//! 逻辑改写规则

use crate::core::error::RuleError;
use crate::query::optimizer::pattern::Operand;
use crate::query::optimizer::rule_traits::{Rule, RuleCall};
use crate::query::planner::plan::{NodeKind, OperatorKind, PlanNode};

/// 合并相邻的两个过滤节点
///
/// # 转换示例
///
/// Before:
/// ```text
///   Filter($1 > 200)
///       |
///   Filter($0 > 100)
///       |
///   TableScan
/// ```
///
/// After:
/// ```text
///   Filter($0 > 100 AND $1 > 200)
///       |
///   TableScan
/// ```
///
/// # 适用条件
///
/// - 两个过滤节点的物理属性集相同
#[derive(Debug)]
pub struct FilterMergeRule {
    operand: Operand,
}

impl FilterMergeRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(OperatorKind::Filter).exact(vec![Operand::of(OperatorKind::Filter)]),
        }
    }
}

impl Default for FilterMergeRule {
    fn default() -> Self {
        Self::new()
    }
}

fn condition(node: &PlanNode) -> Option<&str> {
    match node.kind() {
        NodeKind::Filter { condition } => Some(condition),
        _ => None,
    }
}

impl Rule for FilterMergeRule {
    fn name(&self) -> &str {
        "FilterMergeRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn matches(&self, call: &RuleCall<'_>) -> bool {
        call.rel(0).traits() == call.rel(1).traits()
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        let outer = call.rel(0).clone();
        let inner = call.rel(1).clone();
        let (Some(outer_condition), Some(inner_condition)) = (condition(&outer), condition(&inner))
        else {
            return Ok(());
        };
        let merged = PlanNode::new(
            NodeKind::Filter {
                condition: format!("{} AND {}", inner_condition, outer_condition),
            },
            outer.traits().clone(),
            outer.row_type().clone(),
            inner.inputs().to_vec(),
        );
        call.transform_to(merged)
    }
}

/// 移除原样输出输入各列的投影
///
/// # 转换示例
///
/// Before:
/// ```text
///   Project($0, $1)
///       |
///   TableScan (输出两列)
/// ```
///
/// After:
/// ```text
///   TableScan
/// ```
///
/// # 适用条件
///
/// - 投影表达式依次为 `$0` .. `$n-1`，n 等于输入的列数
/// - 投影的行类型与输入的行类型一致
#[derive(Debug)]
pub struct RemoveTrivialProjectRule {
    operand: Operand,
}

impl RemoveTrivialProjectRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::of(OperatorKind::Project).with_predicate(is_trivial_project),
        }
    }
}

impl Default for RemoveTrivialProjectRule {
    fn default() -> Self {
        Self::new()
    }
}

fn is_trivial_project(node: &PlanNode) -> bool {
    let (NodeKind::Project { exprs }, Some(input)) = (node.kind(), node.input(0)) else {
        return false;
    };
    exprs.len() == input.row_type().field_count()
        && exprs
            .iter()
            .enumerate()
            .all(|(i, expr)| *expr == format!("${}", i))
        && node.row_type().is_equivalent(input.row_type())
}

impl Rule for RemoveTrivialProjectRule {
    fn name(&self) -> &str {
        "RemoveTrivialProjectRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        let Some(input) = call.root().input(0).cloned() else {
            return Ok(());
        };
        call.transform_to(input)
    }
}
