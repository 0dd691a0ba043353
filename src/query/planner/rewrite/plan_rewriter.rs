//! 计划重写器实现
//!
//! 按程序指令把规则应用到重写图上：每个顶点依次尝试当前规则组中的规则，
//! 规则提出的第一个节点立即替换该顶点，然后在新顶点处继续匹配。

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::HeuristicConfig;
use crate::core::error::{PlanningError, PlanningResult};
use crate::query::optimizer::core::{CostModel, DefaultCostModel, TraitDefRegistry, TraitSet};
use crate::query::optimizer::pattern::match_first;
use crate::query::optimizer::rule_registry::RuleRegistry;
use crate::query::optimizer::rule_traits::{fire_rule, PlannerView, Rule, RuleRef};
use crate::query::planner::plan::{PlanNode, PlanRef, VertexId};

use super::graph::PlanGraph;
use super::program::{Instruction, MatchOrder, Program};
use super::result::RewriteOutcome;

/// 计划重写器
///
/// 持有程序与配置，可以重复用于多个计划；每次重写使用独立的重写图。
pub struct PlanRewriter {
    program: Program,
    config: HeuristicConfig,
    registry: RuleRegistry,
    cost_model: Arc<dyn CostModel>,
    trait_defs: TraitDefRegistry,
}

impl std::fmt::Debug for PlanRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanRewriter")
            .field("program", &self.program)
            .field("config", &self.config)
            .field("rules", &self.registry.len())
            .finish()
    }
}

impl PlanRewriter {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            config: HeuristicConfig::default(),
            registry: RuleRegistry::new(),
            cost_model: Arc::new(DefaultCostModel::default()),
            trait_defs: TraitDefRegistry::with_convention(),
        }
    }

    pub fn with_config(mut self, config: HeuristicConfig) -> Self {
        self.config = config;
        self
    }

    /// 按名称或模式选择规则的指令在这个注册表中查找
    pub fn with_registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cost_model(mut self, cost_model: Arc<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn with_trait_defs(mut self, trait_defs: TraitDefRegistry) -> Self {
        self.trait_defs = trait_defs;
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// 重写计划，不检查根节点的物理属性
    pub fn rewrite(&self, plan: &PlanRef) -> PlanningResult<RewriteOutcome> {
        self.run(plan, None)
    }

    /// 重写计划，并要求结果的根节点满足 `required`
    pub fn rewrite_to(&self, plan: &PlanRef, required: &TraitSet) -> PlanningResult<RewriteOutcome> {
        self.trait_defs.validate(required)?;
        self.run(plan, Some(required))
    }

    fn run(&self, plan: &PlanRef, required: Option<&TraitSet>) -> PlanningResult<RewriteOutcome> {
        let mut session = RewriteSession {
            rewriter: self,
            graph: PlanGraph::build(plan, self.config.allow_dag),
            transformations: 0,
            passes: 0,
            exhausted: false,
        };
        session.execute(&self.program)?;

        if session.exhausted {
            if self.config.fail_on_non_convergence {
                return Err(PlanningError::ConvergenceFailure {
                    iterations: session.passes,
                    transformations: session.transformations,
                });
            }
            warn!(
                "启发式重写在 {} 次变换后仍未收敛，返回当前计划",
                session.transformations
            );
        }

        let result = session.graph.to_plan()?;
        if let Some(required) = required {
            if !result.traits().satisfies(required) {
                return Err(PlanningError::no_physical_plan(
                    session.graph.root().index(),
                    required.clone(),
                ));
            }
        }
        debug!(
            "启发式重写完成: {} 次变换, {} 轮遍历",
            session.transformations, session.passes
        );
        Ok(RewriteOutcome {
            plan: result,
            transformations: session.transformations,
            passes: session.passes,
            converged: !session.exhausted,
        })
    }
}

/// 程序执行中的可变状态：遍历顺序、匹配上限与正在收集的规则组
struct ProgramState {
    order: MatchOrder,
    limit: Option<usize>,
    group: Option<Vec<RuleRef>>,
}

struct RewriteSession<'a> {
    rewriter: &'a PlanRewriter,
    graph: PlanGraph,
    transformations: usize,
    passes: usize,
    /// 达到变换次数上限后不再执行任何指令
    exhausted: bool,
}

impl RewriteSession<'_> {
    fn execute(&mut self, program: &Program) -> PlanningResult<()> {
        let mut state = ProgramState {
            order: self.rewriter.config.match_order,
            limit: self.rewriter.config.match_limit,
            group: None,
        };
        for instruction in program.instructions() {
            if self.exhausted {
                break;
            }
            match instruction {
                Instruction::MatchOrder(order) => state.order = *order,
                Instruction::MatchLimit(limit) => state.limit = Some(*limit),
                Instruction::BeginGroup => state.group = Some(Vec::new()),
                Instruction::EndGroup => {
                    let rules = state.group.take().unwrap_or_default();
                    self.apply_rules(&rules, &state)?;
                }
                Instruction::Subprogram(subprogram) => loop {
                    let before = self.transformations;
                    self.execute(subprogram)?;
                    if self.exhausted || self.transformations == before {
                        break;
                    }
                },
                selection => {
                    let rules = self.select_rules(selection);
                    match state.group.as_mut() {
                        Some(group) => group.extend(rules),
                        None => self.apply_rules(&rules, &state)?,
                    }
                }
            }
        }
        Ok(())
    }

    fn select_rules(&self, instruction: &Instruction) -> Vec<RuleRef> {
        match instruction {
            Instruction::RuleInstance(rule) => vec![rule.clone()],
            Instruction::RuleCollection(rules) => rules.clone(),
            Instruction::RuleByName(name) => match self.rewriter.registry.get(name) {
                Some(rule) => vec![rule],
                None => {
                    warn!("规则 {} 未注册，跳过", name);
                    Vec::new()
                }
            },
            Instruction::RulesMatching(pattern) => self.rewriter.registry.rules_matching(pattern),
            _ => Vec::new(),
        }
    }

    /// 反复遍历重写图应用一组规则，直到一整轮没有变化
    fn apply_rules(&mut self, rules: &[RuleRef], state: &ProgramState) -> PlanningResult<()> {
        if rules.is_empty() {
            return Ok(());
        }
        let rewriter = self.rewriter;
        let config = &rewriter.config;
        let mut matches = 0;
        let mut passes = 0;
        loop {
            passes += 1;
            self.passes += 1;
            let mut changed = false;
            let mut pending: VecDeque<VertexId> = self.graph.order(state.order).into();

            'vertices: while let Some(vertex) = pending.pop_front() {
                if !self.graph.is_alive(vertex) {
                    continue;
                }
                for rule in rules {
                    let applied = self.apply_rule(rule.as_ref(), vertex)?;
                    if self.exhausted {
                        return Ok(());
                    }
                    let Some(replacement) = applied else {
                        continue;
                    };
                    changed = true;
                    matches += 1;
                    if state.limit.is_some_and(|limit| matches >= limit) {
                        return Ok(());
                    }
                    if state.order == MatchOrder::DepthFirst {
                        let subtree = self.graph.order_from(replacement, MatchOrder::DepthFirst);
                        for v in subtree.into_iter().rev() {
                            pending.push_front(v);
                        }
                    } else {
                        pending.push_front(replacement);
                    }
                    continue 'vertices;
                }
            }

            if !changed || config.max_passes.is_some_and(|max| passes >= max) {
                return Ok(());
            }
        }
    }

    /// 在顶点上尝试一条规则，成功时返回替换后的顶点
    fn apply_rule(&mut self, rule: &dyn Rule, vertex: VertexId) -> PlanningResult<Option<VertexId>> {
        let node = self.graph.node(vertex).clone();
        let Some(binding) = match_first(rule.operand(), &node, &self.graph) else {
            return Ok(None);
        };
        let results = fire_rule(rule, binding, &*self)?;
        if results.len() > 1 {
            debug!(
                "规则 {} 提出了 {} 个节点，只采用第一个",
                rule.name(),
                results.len()
            );
        }
        let Some(proposed) = results.into_iter().next() else {
            return Ok(None);
        };
        if proposed.digest() == node.digest() || proposed.vertex_id() == Some(vertex) {
            return Ok(None);
        }
        // 上限之内的变换已用完，仍有规则可以改写说明尚未收敛
        if self.transformations >= self.rewriter.config.max_iterations {
            self.exhausted = true;
            return Ok(None);
        }

        let replacement = self.graph.add_node(&proposed);
        if replacement == vertex {
            return Ok(None);
        }
        if self
            .graph
            .order_from(replacement, MatchOrder::Arbitrary)
            .contains(&vertex)
        {
            debug!("规则 {} 的结果引用了被替换的节点，忽略", rule.name());
            return Ok(None);
        }

        debug!(
            "规则 {} 改写顶点 {}: {} => {}",
            rule.name(),
            vertex,
            node.digest(),
            self.graph.node(replacement).digest()
        );
        self.graph.replace(vertex, replacement);
        self.transformations += 1;
        Ok(Some(replacement))
    }

    fn rows(&self, node: &PlanNode, visiting: &mut Vec<VertexId>) -> f64 {
        let mut input_rows = Vec::with_capacity(node.inputs().len());
        for input in node.inputs() {
            let rows = match input.vertex_id() {
                Some(id) if visiting.contains(&id) => 1.0,
                Some(id) => {
                    visiting.push(id);
                    let rows = self.rows(self.graph.node(id), visiting);
                    visiting.pop();
                    rows
                }
                None => self.rows(input, visiting),
            };
            input_rows.push(rows);
        }
        self.rewriter.cost_model.row_count(node, &input_rows)
    }
}

impl PlannerView for RewriteSession<'_> {
    fn members(&self, input: &PlanRef) -> Vec<PlanRef> {
        match input.vertex_id() {
            Some(id) => vec![self.graph.node(id).clone()],
            None => vec![input.clone()],
        }
    }

    fn row_count(&self, node: &PlanNode) -> f64 {
        match node.vertex_id() {
            Some(id) => self.rows(self.graph.node(id), &mut vec![id]),
            None => self.rows(node, &mut Vec::new()),
        }
    }

    fn trait_defs(&self) -> &TraitDefRegistry {
        &self.rewriter.trait_defs
    }

    fn metadata_epoch(&self) -> u64 {
        self.graph.epoch()
    }
}

/// 按配置重写计划树，要求结果满足 `required_traits`
pub fn optimize_heuristic(
    root: &PlanRef,
    required_traits: &TraitSet,
    program: Program,
    config: HeuristicConfig,
) -> PlanningResult<RewriteOutcome> {
    PlanRewriter::new(program)
        .with_config(config)
        .rewrite_to(root, required_traits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RuleError;
    use crate::core::schema::{DataType, RowType};
    use crate::query::optimizer::pattern::Operand;
    use crate::query::optimizer::rule_traits::RuleCall;
    use crate::query::optimizer::rules::{FilterMergeRule, RemoveTrivialProjectRule};
    use crate::query::planner::plan::{NodeKind, OperatorKind};

    fn scan() -> PlanRef {
        PlanNode::table_scan(
            "emp",
            RowType::of(&[("id", DataType::Int), ("name", DataType::Varchar)]),
        )
    }

    /// 把过滤条件 `a` 与 `b` 互相改写，永不收敛
    struct FlipRule(Operand);

    impl Rule for FlipRule {
        fn name(&self) -> &str {
            "FlipRule"
        }

        fn operand(&self) -> &Operand {
            &self.0
        }

        fn on_match(&self, call: &mut RuleCall<'_>) -> Result<(), RuleError> {
            let node = call.root().clone();
            let NodeKind::Filter { condition } = node.kind() else {
                return Ok(());
            };
            let flipped = if condition == "a" { "b" } else { "a" };
            let kind = NodeKind::Filter {
                condition: flipped.to_string(),
            };
            call.transform_to(node.with_kind(kind, node.traits().clone()))
        }
    }

    #[test]
    fn test_filter_merge_to_fixed_point() {
        let plan = PlanNode::filter(
            PlanNode::filter(PlanNode::filter(scan(), "$0 > 1"), "$1 = 'a'"),
            "$0 < 9",
        );
        let program = Program::of_rules(vec![Arc::new(FilterMergeRule::new())]);
        let outcome = PlanRewriter::new(program).rewrite(&plan).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.transformations, 2);
        assert_eq!(
            outcome.plan.digest(),
            "Filter[$0 > 1 AND $1 = 'a' AND $0 < 9].NONE(TableScan[emp].NONE)"
        );
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let row_type = RowType::of(&[("id", DataType::Int), ("name", DataType::Varchar)]);
        let plan = PlanNode::filter(
            PlanNode::project(scan(), vec!["$0".into(), "$1".into()], row_type),
            "$0 > 1",
        );
        let program = Program::of_rules(vec![
            Arc::new(FilterMergeRule::new()),
            Arc::new(RemoveTrivialProjectRule::new()),
        ]);
        let rewriter = PlanRewriter::new(program);
        let first = rewriter.rewrite(&plan).unwrap();
        assert_eq!(first.transformations, 1);
        assert_eq!(first.plan.digest(), "Filter[$0 > 1].NONE(TableScan[emp].NONE)");

        let second = rewriter.rewrite(&first.plan).unwrap();
        assert_eq!(second.transformations, 0);
        assert_eq!(second.plan.digest(), first.plan.digest());
    }

    #[test]
    fn test_non_convergence_is_reported() {
        let plan = PlanNode::filter(scan(), "a");
        let program = Program::of_rules(vec![Arc::new(FlipRule(Operand::of(OperatorKind::Filter)))]);
        let config = HeuristicConfig {
            max_iterations: 5,
            ..HeuristicConfig::default()
        };

        let outcome = PlanRewriter::new(program.clone())
            .with_config(config.clone())
            .rewrite(&plan)
            .unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.transformations, 5);

        let strict = HeuristicConfig {
            fail_on_non_convergence: true,
            ..config
        };
        let err = PlanRewriter::new(program)
            .with_config(strict)
            .rewrite(&plan)
            .unwrap_err();
        assert!(matches!(
            err,
            PlanningError::ConvergenceFailure {
                transformations: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_converging_on_last_allowed_transformation() {
        let plan = PlanNode::filter(
            PlanNode::filter(PlanNode::filter(scan(), "$0 > 1"), "$0 > 2"),
            "$0 > 3",
        );
        let program = Program::of_rules(vec![Arc::new(FilterMergeRule::new())]);
        let config = HeuristicConfig {
            max_iterations: 2,
            fail_on_non_convergence: true,
            ..HeuristicConfig::default()
        };
        let outcome = PlanRewriter::new(program)
            .with_config(config)
            .rewrite(&plan)
            .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.transformations, 2);
        assert_eq!(
            outcome.plan.digest(),
            "Filter[$0 > 1 AND $0 > 2 AND $0 > 3].NONE(TableScan[emp].NONE)"
        );
    }

    #[test]
    fn test_match_limit_stops_group() {
        let plan = PlanNode::filter(
            PlanNode::filter(PlanNode::filter(scan(), "$0 > 1"), "$0 > 2"),
            "$0 > 3",
        );
        let program = Program::builder()
            .add_match_limit(1)
            .add_rule_instance(Arc::new(FilterMergeRule::new()))
            .build()
            .unwrap();
        let outcome = PlanRewriter::new(program).rewrite(&plan).unwrap();
        assert_eq!(outcome.transformations, 1);
        assert_eq!(outcome.plan.tree_size(), 3);
    }

    #[test]
    fn test_rule_by_name_uses_registry() {
        let plan = PlanNode::filter(PlanNode::filter(scan(), "$0 > 1"), "$0 > 2");
        let registry = RuleRegistry::from_rules(vec![Arc::new(FilterMergeRule::new())]);
        let program = Program::builder()
            .add_rule_by_name("FilterMergeRule")
            .add_rule_by_name("MissingRule")
            .build()
            .unwrap();
        let outcome = PlanRewriter::new(program)
            .with_registry(registry)
            .rewrite(&plan)
            .unwrap();
        assert_eq!(outcome.transformations, 1);
    }

    #[test]
    fn test_required_traits_are_checked() {
        let plan = PlanNode::filter(scan(), "$0 > 1");
        let program = Program::of_rules(vec![Arc::new(FilterMergeRule::new())]);
        let err = optimize_heuristic(
            &plan,
            &TraitSet::of_convention("ENUMERABLE"),
            program.clone(),
            HeuristicConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PlanningError::NoPhysicalPlan { .. }));

        let outcome =
            optimize_heuristic(&plan, &TraitSet::logical(), program, HeuristicConfig::default())
                .unwrap();
        assert!(outcome.converged);
    }
}
