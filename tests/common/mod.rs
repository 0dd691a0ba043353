//! 集成测试共享工具模块
//!
//! 提供测试用的计划构造、带标签的代价模型以及几条简单的规则

#![allow(dead_code)]

use std::sync::Arc;

use relopt::core::error::RuleError;
use relopt::core::schema::{DataType, RowType};
use relopt::query::optimizer::core::{Cost, CostFactory, CostModel, TraitSet};
use relopt::query::optimizer::pattern::Operand;
use relopt::query::optimizer::rule_traits::{Rule, RuleCall, RuleRef};
use relopt::query::planner::plan::{NodeKind, OperatorKind, PlanNode, PlanRef};

pub const ENUMERABLE: &str = "ENUMERABLE";

pub fn emp_row_type() -> RowType {
    RowType::of(&[("id", DataType::Int), ("name", DataType::Varchar)])
}

pub fn scan(table: &str) -> PlanRef {
    PlanNode::table_scan(table, emp_row_type())
}

/// 从节点属性中读出标签代价：`IndexScan` 取索引名，`Filter` 取 `#` 之后的部分
fn label_cost(node: &PlanNode) -> Option<f64> {
    match node.kind() {
        NodeKind::IndexScan { index, .. } => index.parse().ok(),
        NodeKind::Filter { condition } => condition.rsplit_once('#').and_then(|(_, c)| c.parse().ok()),
        _ => None,
    }
}

/// 代价由节点标签直接给出，没有标签的节点代价为 1
#[derive(Debug, Default)]
pub struct LabelCostModel;

impl CostModel for LabelCostModel {
    fn row_count(&self, _node: &PlanNode, _input_rows: &[f64]) -> f64 {
        1.0
    }

    fn self_cost(&self, node: &PlanNode, rows: f64, _input_rows: &[f64], factory: &dyn CostFactory) -> Cost {
        match node.kind() {
            NodeKind::Subset(_) | NodeKind::Vertex(_) => factory.make_zero_cost(),
            NodeKind::AbstractConverter => factory.make_infinite_cost(),
            _ => factory.make_cost(rows, label_cost(node).unwrap_or(1.0), 0.0),
        }
    }
}

/// 把逻辑表扫描实现为指定索引名的索引扫描
pub struct IndexScanRule {
    name: String,
    index: String,
    operand: Operand,
}

impl IndexScanRule {
    pub fn new(index: &str) -> Self {
        Self {
            name: format!("IndexScanRule({})", index),
            index: index.to_string(),
            operand: Operand::of(OperatorKind::TableScan)
                .with_traits(TraitSet::logical())
                .leaf(),
        }
    }

    pub fn rule(index: &str) -> RuleRef {
        Arc::new(Self::new(index))
    }
}

impl Rule for IndexScanRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        let node = call.root().clone();
        let NodeKind::TableScan { table } = node.kind() else {
            return Ok(());
        };
        let kind = NodeKind::IndexScan {
            table: table.clone(),
            index: self.index.clone(),
        };
        call.transform_to(node.with_kind(kind, TraitSet::of_convention(ENUMERABLE)))
    }
}

/// 把逻辑过滤实现为带代价标签的物理过滤，输入改为物理子集
pub struct LabeledFilterRule {
    name: String,
    label: String,
    operand: Operand,
}

impl LabeledFilterRule {
    pub fn rule(label: &str) -> RuleRef {
        Arc::new(Self {
            name: format!("LabeledFilterRule({})", label),
            label: label.to_string(),
            operand: Operand::of(OperatorKind::Filter)
                .with_traits(TraitSet::logical())
                .any(),
        })
    }
}

impl Rule for LabeledFilterRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        let node = call.root().clone();
        let (NodeKind::Filter { condition }, Some(input)) = (node.kind(), node.input(0)) else {
            return Ok(());
        };
        let Some(set) = input.set_id() else {
            return Err(RuleError::new("过滤节点的输入不是等价集句柄"));
        };
        let physical_input =
            PlanNode::subset(set, TraitSet::of_convention(ENUMERABLE), input.row_type().clone());
        let kind = NodeKind::Filter {
            condition: format!("{}#{}", condition, self.label),
        };
        call.transform_to(PlanNode::new(
            kind,
            TraitSet::of_convention(ENUMERABLE),
            node.row_type().clone(),
            vec![physical_input],
        ))
    }
}
