//! 规则与规则调用
//!
//! 规则 = 根操作数 + 变换过程。规则从不修改匹配到的节点，只通过
//! `RuleCall::transform_to` 提出与根节点逻辑等价的新节点；提出的节点在
//! `on_match` 返回后才由规划器统一处理，因此规则不会重入规划器。

use std::sync::Arc;

use crate::core::error::{PlanningResult, RuleError};
use crate::query::optimizer::core::TraitDefRegistry;
use crate::query::optimizer::pattern::Operand;
use crate::query::planner::plan::{PlanNode, PlanRef};

/// 规则在匹配过程中可见的只读规划器视图
pub trait PlannerView {
    /// 句柄输入当前的全部候选节点（普通节点返回自身）
    fn members(&self, input: &PlanRef) -> Vec<PlanRef>;

    /// 节点的估算输出行数
    fn row_count(&self, node: &PlanNode) -> f64;

    fn trait_defs(&self) -> &TraitDefRegistry;

    /// 元数据纪元：每次新注册都会递增，外部缓存可据此失效
    fn metadata_epoch(&self) -> u64;
}

/// 优化规则
pub trait Rule: Send + Sync {
    /// 规则名称，在一个注册表中唯一
    fn name(&self) -> &str;

    /// 根操作数
    fn operand(&self) -> &Operand;

    /// 附加的匹配条件，在模式匹配成功后、`on_match` 之前调用
    fn matches(&self, _call: &RuleCall<'_>) -> bool {
        true
    }

    /// 变换过程：可以不做任何事（放弃），也可以多次调用 `transform_to`
    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError>;
}

pub type RuleRef = Arc<dyn Rule>;

/// 规则调用：一次匹配的绑定上下文
pub struct RuleCall<'a> {
    rule_name: &'a str,
    rels: Vec<PlanRef>,
    planner: &'a dyn PlannerView,
    results: Vec<PlanRef>,
}

impl<'a> RuleCall<'a> {
    pub fn new(rule_name: &'a str, rels: Vec<PlanRef>, planner: &'a dyn PlannerView) -> Self {
        Self {
            rule_name,
            rels,
            planner,
            results: Vec::new(),
        }
    }

    pub fn rule_name(&self) -> &str {
        self.rule_name
    }

    /// 第 `ordinal` 个操作数绑定的节点（模式先序）
    ///
    /// 下标由规则自己的操作数树决定，越界属于规则实现错误。
    pub fn rel(&self, ordinal: usize) -> &PlanRef {
        &self.rels[ordinal]
    }

    pub fn rels(&self) -> &[PlanRef] {
        &self.rels
    }

    /// 匹配到的根节点
    pub fn root(&self) -> &PlanRef {
        &self.rels[0]
    }

    pub fn planner(&self) -> &dyn PlannerView {
        self.planner
    }

    /// 声明 `node` 与根节点逻辑等价
    ///
    /// 行类型必须与根节点一致（字段个数与类型），否则返回错误并终止规划。
    pub fn transform_to(&mut self, node: PlanRef) -> Result<(), RuleError> {
        let expected = self.root().row_type();
        if !expected.is_equivalent(node.row_type()) {
            return Err(RuleError::new(format!(
                "变换结果的行类型 {} 与原节点的行类型 {} 不一致",
                node.row_type(),
                expected
            )));
        }
        self.results.push(node);
        Ok(())
    }

    pub fn results(&self) -> &[PlanRef] {
        &self.results
    }

    pub fn into_results(self) -> Vec<PlanRef> {
        self.results
    }
}

/// 调用规则：检查附加条件并执行变换，返回规则提出的等价节点
///
/// 规则返回的错误附上规则名称后向上传播。
pub fn fire_rule(
    rule: &dyn Rule,
    rels: Vec<PlanRef>,
    planner: &dyn PlannerView,
) -> PlanningResult<Vec<PlanRef>> {
    let mut call = RuleCall::new(rule.name(), rels, planner);
    if !rule.matches(&call) {
        return Ok(Vec::new());
    }
    rule.on_match(&mut call)
        .map_err(|e| e.into_planning_error(rule.name()))?;
    Ok(call.into_results())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PlanningError;
    use crate::core::schema::{DataType, RowType};
    use crate::query::planner::plan::OperatorKind;

    struct TreeView {
        defs: TraitDefRegistry,
    }

    impl PlannerView for TreeView {
        fn members(&self, input: &PlanRef) -> Vec<PlanRef> {
            vec![input.clone()]
        }

        fn row_count(&self, _node: &PlanNode) -> f64 {
            1.0
        }

        fn trait_defs(&self) -> &TraitDefRegistry {
            &self.defs
        }

        fn metadata_epoch(&self) -> u64 {
            0
        }
    }

    struct WidenRule {
        operand: Operand,
    }

    impl Rule for WidenRule {
        fn name(&self) -> &str {
            "WidenRule"
        }

        fn operand(&self) -> &Operand {
            &self.operand
        }

        fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
            let wider = PlanNode::table_scan(
                "emp",
                RowType::of(&[("id", DataType::Int), ("extra", DataType::Int)]),
            );
            call.transform_to(wider)
        }
    }

    #[test]
    fn test_transform_to_rejects_row_type_change() {
        let view = TreeView {
            defs: TraitDefRegistry::with_convention(),
        };
        let rule = WidenRule {
            operand: Operand::of(OperatorKind::TableScan),
        };
        let scan = PlanNode::table_scan("emp", RowType::of(&[("id", DataType::Int)]));
        let err = fire_rule(&rule, vec![scan], &view).unwrap_err();
        match err {
            PlanningError::RuleExecution { rule, .. } => assert_eq!(rule, "WidenRule"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_transform_to_collects_results() {
        let view = TreeView {
            defs: TraitDefRegistry::with_convention(),
        };
        let scan = PlanNode::table_scan("emp", RowType::of(&[("id", DataType::Int)]));
        let mut call = RuleCall::new("Manual", vec![scan.clone()], &view);
        let renamed = PlanNode::table_scan("emp2", RowType::of(&[("key", DataType::Int)]));
        call.transform_to(renamed).unwrap();
        call.transform_to(scan.clone()).unwrap();
        assert_eq!(call.results().len(), 2);
        assert_eq!(call.rule_name(), "Manual");
        assert_eq!(call.root().digest(), scan.digest());
    }
}
