//! 代价规划器集成测试
//!
//! 测试范围:
//! - 多个实现之间按累计代价选优
//! - 任意子节点策略的操作数不展开输入
//! - 无法满足的物理属性在有限步内报告 NoPhysicalPlan
//! - 转换规则（约定转换与排序）
//! - 代价比较违反单调性时报告 CostModelViolation

mod common;

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use common::{scan, IndexScanRule, LabelCostModel, LabeledFilterRule, ENUMERABLE};
use relopt::config::VolcanoConfig;
use relopt::core::error::{PlanningError, RuleError};
use relopt::core::schema::{DataType, RowType};
use relopt::query::optimizer::core::{
    Collation, CollationTraitDef, Convention, ConventionTraitDef, Cost, CostFactory,
    DefaultCostFactory, FieldCollation, OptimizationPhase, Trait, TraitDefRegistry, TraitSet,
};
use relopt::query::optimizer::pattern::{match_first, InputResolver, Operand};
use relopt::query::optimizer::rule_traits::{Rule, RuleCall};
use relopt::query::optimizer::rules::{ConventionRule, ExpandConversionRule, SortEnforcerRule};
use relopt::query::optimizer::{optimize, RuleRegistry, VolcanoPlanner};
use relopt::query::planner::plan::{OperatorKind, PlanNode, PlanRef};

fn planner(rules: RuleRegistry) -> VolcanoPlanner {
    VolcanoPlanner::new(rules, Arc::new(DefaultCostFactory)).with_cost_model(Arc::new(LabelCostModel))
}

/// 叶子 A 代价 10，B 有代价 5 与 7 的两个实现，提取出代价 5 的实现
#[test]
fn test_cheapest_implementation_is_extracted() {
    let rules = RuleRegistry::from_rules(vec![
        IndexScanRule::rule("10"),
        LabeledFilterRule::rule("7"),
        LabeledFilterRule::rule("5"),
    ]);
    let mut planner = planner(rules);
    let b = PlanNode::filter(scan("a"), "b");
    planner
        .set_root(&b, TraitSet::of_convention(ENUMERABLE))
        .unwrap();

    let best = planner.find_best_exp().unwrap();
    assert_eq!(
        best.digest(),
        "Filter[b#5].ENUMERABLE(IndexScan[a, 10].ENUMERABLE)"
    );
    let cost = planner.best_cost().unwrap();
    assert_eq!(cost.value(), 15.0);
}

/// 提取结果与规则注册顺序无关
#[test]
fn test_result_is_independent_of_rule_order() {
    let forward = RuleRegistry::from_rules(vec![
        IndexScanRule::rule("10"),
        IndexScanRule::rule("3"),
        LabeledFilterRule::rule("5"),
        LabeledFilterRule::rule("7"),
    ]);
    let backward = RuleRegistry::from_rules(forward.rules().into_iter().rev().collect());

    let plan = PlanNode::filter(scan("a"), "b");
    let mut digests = Vec::new();
    for rules in [forward, backward] {
        let mut planner = planner(rules);
        planner
            .set_root(&plan, TraitSet::of_convention(ENUMERABLE))
            .unwrap();
        digests.push(planner.find_best_exp().unwrap().digest().to_string());
    }
    assert_eq!(digests[0], "Filter[b#5].ENUMERABLE(IndexScan[a, 3].ENUMERABLE)");
    assert_eq!(digests[0], digests[1]);
}

/// 重复注册同一节点返回同一个等价集
#[test]
fn test_registration_is_idempotent() {
    let mut planner = planner(RuleRegistry::new());
    let plan = PlanNode::filter(scan("a"), "b");
    let first = planner.register(&plan, None).unwrap();
    let members = planner.memo().member_count();
    let second = planner.register(&PlanNode::filter(scan("a"), "b"), None).unwrap();
    assert_eq!(first, second);
    assert_eq!(planner.memo().member_count(), members);
    assert_eq!(planner.set_of(&plan), Some(first));
}

struct RecordingRule {
    operand: Operand,
    seen: Mutex<Vec<(String, usize)>>,
}

impl Rule for RecordingRule {
    fn name(&self) -> &str {
        "RecordingRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
        self.seen
            .lock()
            .push((call.root().operator().to_string(), call.rels().len()));
        Ok(())
    }
}

/// 统计输入展开次数的解析器
#[derive(Default)]
struct CountingResolver {
    calls: AtomicUsize,
}

impl InputResolver for CountingResolver {
    fn candidates(&self, input: &PlanRef) -> Vec<PlanRef> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        vec![input.clone()]
    }
}

/// 任意子节点策略对 0、1、3 个输入的节点一视同仁，且从不查看输入
#[test]
fn test_any_children_operand_ignores_inputs() {
    let operand = Operand::any_node();
    let resolver = CountingResolver::default();
    let values = PlanNode::values(RowType::of(&[("id", DataType::Int)]), 3);
    let filter = PlanNode::filter(scan("a"), "b");
    let union = PlanNode::union(vec![scan("a"), scan("b"), scan("c")], true);

    for node in [&values, &filter, &union] {
        let binding = match_first(&operand, node, &resolver).unwrap();
        assert_eq!(binding.len(), 1);
        assert_eq!(binding[0].digest(), node.digest());
    }
    assert_eq!(resolver.calls.load(AtomicOrdering::SeqCst), 0);

    let rule = Arc::new(RecordingRule {
        operand: Operand::of(OperatorKind::Union),
        seen: Mutex::new(Vec::new()),
    });
    let mut planner = planner(RuleRegistry::from_rules(vec![rule.clone()]));
    planner
        .set_root(&union, TraitSet::of_convention(ENUMERABLE))
        .unwrap();
    assert!(planner.find_best_exp().is_err());
    let seen = rule.seen.lock().clone();
    assert_eq!(seen, vec![("Union".to_string(), 1)]);
}

/// 没有成员满足且没有转换规则时报告 NoPhysicalPlan，队列弹出次数有限
#[test]
fn test_unsatisfiable_traits_fail_in_bounded_steps() {
    let rules = RuleRegistry::from_rules(vec![IndexScanRule::rule("10")]);
    let mut planner = planner(rules);
    planner
        .set_root(&scan("a"), TraitSet::of_convention("BINDABLE"))
        .unwrap();

    let err = planner.find_best_exp().unwrap_err();
    match err {
        PlanningError::NoPhysicalPlan { traits, .. } => {
            assert_eq!(traits, TraitSet::of_convention("BINDABLE"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(planner.stats().queue_pops <= 10, "{:?}", planner.stats());
}

fn conversion_defs() -> TraitDefRegistry {
    TraitDefRegistry::new()
        .with_def(Arc::new(ConventionTraitDef::new().with_conversion(
            Convention::physical(ENUMERABLE),
            Convention::physical("BINDABLE"),
        )))
        .with_def(Arc::new(CollationTraitDef))
}

#[test]
fn test_convention_conversion() {
    let rules = RuleRegistry::from_rules(vec![
        Arc::new(ConventionRule::new("EnumerableScanRule", OperatorKind::TableScan, ENUMERABLE)),
        Arc::new(ExpandConversionRule::new()),
    ]);
    let mut planner = planner(rules).with_trait_defs(conversion_defs());
    planner
        .set_root(&scan("emp"), TraitSet::of_convention("BINDABLE"))
        .unwrap();
    let best = planner.find_best_exp().unwrap();
    assert_eq!(
        best.digest(),
        "Converter.BINDABLE(TableScan[emp].ENUMERABLE)"
    );
}

#[test]
fn test_sort_enforcer_satisfies_collation() {
    let rules = RuleRegistry::from_rules(vec![
        Arc::new(ConventionRule::new("EnumerableScanRule", OperatorKind::TableScan, ENUMERABLE)),
        Arc::new(SortEnforcerRule::new()),
    ]);
    let mut planner = planner(rules).with_trait_defs(conversion_defs());
    let required = TraitSet::of_convention(ENUMERABLE)
        .replace(Trait::Collation(Collation::new(vec![FieldCollation::asc(0)])));
    planner.set_root(&scan("emp"), required.clone()).unwrap();

    let best = planner.find_best_exp().unwrap();
    assert_eq!(best.traits(), &required);
    assert_eq!(
        best.digest(),
        "Sort[0].ENUMERABLE.[0](TableScan[emp].ENUMERABLE)"
    );
}

#[test]
fn test_optimize_entry_point() {
    let rules = RuleRegistry::from_rules(vec![
        Arc::new(ConventionRule::new("EnumerableScanRule", OperatorKind::TableScan, ENUMERABLE)),
        Arc::new(ConventionRule::new("EnumerableFilterRule", OperatorKind::Filter, ENUMERABLE)),
    ]);
    let plan = PlanNode::filter(scan("emp"), "$0 > 1");
    let best = optimize(
        plan,
        TraitSet::of_convention(ENUMERABLE),
        &rules,
        Arc::new(DefaultCostFactory),
    )
    .unwrap();
    assert_eq!(
        best.digest(),
        "Filter[$0 > 1].ENUMERABLE(TableScan[emp].ENUMERABLE)"
    );
}

/// 只比较个位数的代价工厂：加法后顺序可能反转
struct ModuloCostFactory;

impl CostFactory for ModuloCostFactory {
    fn make_cost(&self, rows: f64, cpu: f64, io: f64) -> Cost {
        Cost::new(rows, cpu, io)
    }

    fn make_zero_cost(&self) -> Cost {
        Cost::zero()
    }

    fn make_infinite_cost(&self) -> Cost {
        Cost::infinite()
    }

    fn make_tiny_cost(&self) -> Cost {
        Cost::tiny()
    }

    fn make_huge_cost(&self) -> Cost {
        Cost::huge()
    }

    fn compare(&self, a: &Cost, b: &Cost) -> Ordering {
        match (a.is_infinite(), b.is_infinite()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => (a.value() % 10.0)
                .partial_cmp(&(b.value() % 10.0))
                .unwrap_or(Ordering::Equal),
        }
    }
}

/// 输入变便宜后父成员反而变贵，报告 CostModelViolation
#[test]
fn test_non_monotonic_costs_are_reported() {
    let mut rules = RuleRegistry::new();
    rules.register_in_phase(IndexScanRule::rule("9"), OptimizationPhase::PreProcess);
    rules.register_in_phase(LabeledFilterRule::rule("5"), OptimizationPhase::PreProcess);
    rules.register_in_phase(IndexScanRule::rule("2"), OptimizationPhase::Cleanup);

    let mut planner = VolcanoPlanner::new(rules, Arc::new(ModuloCostFactory))
        .with_cost_model(Arc::new(LabelCostModel));
    planner
        .set_root(
            &PlanNode::filter(scan("a"), "b"),
            TraitSet::of_convention(ENUMERABLE),
        )
        .unwrap();
    let err = planner.find_best_exp().unwrap_err();
    assert!(matches!(err, PlanningError::CostModelViolation { .. }), "{:?}", err);
}

/// 预算耗尽时返回当前已知的最优计划
#[test]
fn test_budget_returns_best_so_far() {
    let rules = RuleRegistry::from_rules(vec![
        IndexScanRule::rule("10"),
        LabeledFilterRule::rule("5"),
    ]);
    let config = VolcanoConfig {
        max_iterations: 2,
        ..VolcanoConfig::default()
    };
    let mut planner = planner(rules).with_config(config);
    planner
        .set_root(
            &PlanNode::filter(scan("a"), "b"),
            TraitSet::of_convention(ENUMERABLE),
        )
        .unwrap();
    let best = planner.find_best_exp().unwrap();
    assert_eq!(
        best.digest(),
        "Filter[b#5].ENUMERABLE(IndexScan[a, 10].ENUMERABLE)"
    );
    assert!(planner.stats().queue_pops <= 2);
}
