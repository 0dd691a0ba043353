//! 启发式重写集成测试
//!
//! 测试范围:
//! - 遍历顺序（自底向上时最深的节点先被改写）
//! - 规则组与子程序
//! - 共享子树的重写
//! - 收敛与变换次数上限

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use common::scan;
use relopt::config::HeuristicConfig;
use relopt::core::error::{PlanningError, RuleError};
use relopt::query::optimizer::core::TraitSet;
use relopt::query::optimizer::pattern::Operand;
use relopt::query::optimizer::rule_traits::{Rule, RuleCall, RuleRef};
use relopt::query::optimizer::rules::{FilterMergeRule, RemoveTrivialProjectRule};
use relopt::query::optimizer::RuleRegistry;
use relopt::query::planner::plan::{JoinType, NodeKind, OperatorKind, PlanNode};
use relopt::query::planner::rewrite::{optimize_heuristic, MatchOrder, PlanRewriter, Program};

/// 把过滤改写为不限行数的 Limit，并记录被改写的过滤条件
struct FilterToLimitRule {
    operand: Operand,
    rewritten: Mutex<Vec<String>>,
}

impl FilterToLimitRule {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            operand: Operand::of(OperatorKind::Filter),
            rewritten: Mutex::new(Vec::new()),
        })
    }
}

impl Rule for FilterToLimitRule {
    fn name(&self) -> &str {
        "FilterToLimitRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        let node = call.root().clone();
        let NodeKind::Filter { condition } = node.kind() else {
            return Ok(());
        };
        self.rewritten.lock().push(condition.clone());
        let limit = NodeKind::Limit {
            offset: 0,
            fetch: None,
        };
        call.transform_to(node.with_kind(limit, node.traits().clone()))
    }
}

fn nested_filters() -> relopt::query::planner::plan::PlanRef {
    PlanNode::filter(
        PlanNode::filter(PlanNode::filter(scan("emp"), "depth3"), "depth2"),
        "depth1",
    )
}

#[test]
fn test_bottom_up_rewrites_deepest_first() {
    let rule = FilterToLimitRule::new();
    let program = Program::builder()
        .add_match_order(MatchOrder::BottomUp)
        .add_rule_instance(rule.clone())
        .build()
        .unwrap();
    let outcome = PlanRewriter::new(program).rewrite(&nested_filters()).unwrap();

    assert_eq!(outcome.transformations, 3);
    assert_eq!(
        *rule.rewritten.lock(),
        vec!["depth3".to_string(), "depth2".to_string(), "depth1".to_string()]
    );
    assert_eq!(
        outcome.plan.digest(),
        "Limit[0].NONE(Limit[0].NONE(Limit[0].NONE(TableScan[emp].NONE)))"
    );
}

#[test]
fn test_top_down_rewrites_root_first() {
    let rule = FilterToLimitRule::new();
    let program = Program::builder()
        .add_match_order(MatchOrder::TopDown)
        .add_rule_instance(rule.clone())
        .build()
        .unwrap();
    PlanRewriter::new(program).rewrite(&nested_filters()).unwrap();
    assert_eq!(rule.rewritten.lock().first().map(String::as_str), Some("depth1"));
}

#[test]
fn test_group_and_subprogram() {
    let row_type = common::emp_row_type();
    let plan = PlanNode::filter(
        PlanNode::project(
            PlanNode::filter(scan("emp"), "$0 > 1"),
            vec!["$0".into(), "$1".into()],
            row_type,
        ),
        "$1 = 'x'",
    );
    let rules: Vec<RuleRef> = vec![
        Arc::new(FilterMergeRule::new()),
        Arc::new(RemoveTrivialProjectRule::new()),
    ];
    let grouped = Program::builder()
        .add_group_begin()
        .add_rule_collection(rules.clone())
        .add_group_end()
        .build()
        .unwrap();
    let nested = Program::builder()
        .add_subprogram(Program::of_rules(rules))
        .build()
        .unwrap();

    for program in [grouped, nested] {
        let outcome = PlanRewriter::new(program).rewrite(&plan).unwrap();
        assert!(outcome.converged);
        assert_eq!(
            outcome.plan.digest(),
            "Filter[$0 > 1 AND $1 = 'x'].NONE(TableScan[emp].NONE)"
        );
    }
}

#[test]
fn test_rules_matching_pattern() {
    let registry = RuleRegistry::from_rules(vec![
        Arc::new(FilterMergeRule::new()),
        Arc::new(RemoveTrivialProjectRule::new()),
    ]);
    let program = Program::builder()
        .add_rules_matching("^Filter")
        .build()
        .unwrap();
    let plan = PlanNode::filter(PlanNode::filter(scan("emp"), "$0 > 1"), "$0 < 9");
    let outcome = PlanRewriter::new(program)
        .with_registry(registry)
        .rewrite(&plan)
        .unwrap();
    assert_eq!(outcome.transformations, 1);
}

#[test]
fn test_shared_subtree_is_rewritten_once() {
    let shared = PlanNode::filter(PlanNode::filter(scan("emp"), "$0 > 1"), "$0 < 9");
    let plan = PlanNode::join(shared.clone(), shared, JoinType::Inner, "$0 = $2");
    let program = Program::of_rules(vec![Arc::new(FilterMergeRule::new())]);

    let dag = PlanRewriter::new(program.clone()).rewrite(&plan).unwrap();
    assert_eq!(dag.transformations, 1);

    let tree_config = HeuristicConfig {
        allow_dag: false,
        ..HeuristicConfig::default()
    };
    let tree = PlanRewriter::new(program)
        .with_config(tree_config)
        .rewrite(&plan)
        .unwrap();
    assert_eq!(tree.transformations, 2);
    assert_eq!(dag.plan.digest(), tree.plan.digest());
}

#[test]
fn test_second_run_changes_nothing() {
    let program = Program::of_rules(vec![Arc::new(FilterMergeRule::new())]);
    let first = optimize_heuristic(
        &nested_filters(),
        &TraitSet::logical(),
        program.clone(),
        HeuristicConfig::default(),
    )
    .unwrap();
    assert!(first.changed());

    let second = optimize_heuristic(
        &first.plan,
        &TraitSet::logical(),
        program,
        HeuristicConfig::default(),
    )
    .unwrap();
    assert!(!second.changed());
    assert_eq!(second.plan.digest(), first.plan.digest());
}

/// 两条规则互相抵消，永远不会收敛
struct SwapRule {
    from: &'static str,
    to: &'static str,
    operand: Operand,
}

impl SwapRule {
    fn rule(from: &'static str, to: &'static str) -> RuleRef {
        Arc::new(Self {
            from,
            to,
            operand: Operand::of(OperatorKind::Filter),
        })
    }
}

impl Rule for SwapRule {
    fn name(&self) -> &str {
        self.from
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        let node = call.root().clone();
        match node.kind() {
            NodeKind::Filter { condition } if condition == self.from => {
                let kind = NodeKind::Filter {
                    condition: self.to.to_string(),
                };
                call.transform_to(node.with_kind(kind, node.traits().clone()))
            }
            _ => Ok(()),
        }
    }
}

#[test]
fn test_oscillating_rules_hit_ceiling() {
    let program = Program::of_rules(vec![SwapRule::rule("x", "y"), SwapRule::rule("y", "x")]);
    let plan = PlanNode::filter(scan("emp"), "x");
    let config = HeuristicConfig {
        max_iterations: 50,
        ..HeuristicConfig::default()
    };

    let outcome = optimize_heuristic(&plan, &TraitSet::logical(), program.clone(), config.clone())
        .unwrap();
    assert!(!outcome.converged);
    assert_eq!(outcome.transformations, 50);

    let strict = HeuristicConfig {
        fail_on_non_convergence: true,
        ..config
    };
    let err = optimize_heuristic(&plan, &TraitSet::logical(), program, strict).unwrap_err();
    assert!(err.is_warning());
    assert!(matches!(err, PlanningError::ConvergenceFailure { .. }));
}
