//! 计划输出
//!
//! 文本格式：每个节点一行，按深度缩进，包含节点种类、属性和物理属性集，可选附带代价。
//! JSON 格式：与节点树同构的 `PlanNodeDescription`。

use serde::{Deserialize, Serialize};

use crate::query::optimizer::core::Cost;
use crate::query::planner::plan::node::PlanNode;

/// 计划节点描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNodeDescription {
    pub name: String,
    pub attributes: String,
    pub traits: String,
    pub row_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<Cost>,
    pub inputs: Vec<PlanNodeDescription>,
}

impl PlanNodeDescription {
    pub fn from_plan(plan: &PlanNode) -> Self {
        Self::from_plan_with(plan, &|_| None)
    }

    pub fn from_plan_with(plan: &PlanNode, cost_of: &dyn Fn(&PlanNode) -> Option<Cost>) -> Self {
        Self {
            name: plan.operator().name().to_string(),
            attributes: plan.kind().attributes(),
            traits: plan.traits().to_string(),
            row_type: plan.row_type().to_string(),
            cost: cost_of(plan),
            inputs: plan
                .inputs()
                .iter()
                .map(|input| Self::from_plan_with(input, cost_of))
                .collect(),
        }
    }
}

/// 文本格式输出
pub fn explain(plan: &PlanNode) -> String {
    explain_with_costs(plan, &|_| None)
}

/// 文本格式输出，每个节点附带 `cost_of` 返回的代价
pub fn explain_with_costs(plan: &PlanNode, cost_of: &dyn Fn(&PlanNode) -> Option<Cost>) -> String {
    let mut out = String::new();
    let mut stack: Vec<(&PlanNode, usize)> = vec![(plan, 0)];
    while let Some((node, depth)) = stack.pop() {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!(
            "{}{}.{}",
            node.operator(),
            node.kind().attributes(),
            node.traits()
        ));
        if let Some(cost) = cost_of(node) {
            out.push_str(&format!(": cost = {}", cost));
        }
        out.push('\n');
        for input in node.inputs().iter().rev() {
            stack.push((input.as_ref(), depth + 1));
        }
    }
    out
}

/// JSON 格式输出
pub fn explain_json(plan: &PlanNode) -> serde_json::Value {
    serde_json::to_value(PlanNodeDescription::from_plan(plan)).unwrap_or(serde_json::Value::Null)
}
