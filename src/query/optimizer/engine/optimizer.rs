//! 基于代价的规划器
//!
//! `VolcanoPlanner` 在备忘录上穷举规则：
//! 1. 注册根节点，为每个新成员把根操作数能接受它的规则放入队列
//! 2. 反复出队，在当前备忘录上展开绑定并调用规则，规则提出的节点注册到匹配根所在的等价集
//! 3. 每次注册之后增量更新各子集的最优成员与代价
//! 4. 队列清空或预算耗尽后，从根子集沿最优指针提取计划
//!
//! 一个规划器实例就是一次规划会话，不在线程之间共享。

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use serde::Serialize;

use super::extract::extract;
use super::rule_queue::{RuleMatch, RuleQueue};
use crate::config::VolcanoConfig;
use crate::core::error::{PlanningError, PlanningResult};
use crate::query::optimizer::core::{
    Cost, CostFactory, CostModel, DefaultCostModel, TraitDefRegistry, TraitSet,
};
use crate::query::optimizer::pattern::{match_all, InputResolver};
use crate::query::optimizer::plan::{Memo, MemoEvents, MemberId, RowCountCache};
use crate::query::optimizer::rule_registry::RuleRegistry;
use crate::query::optimizer::rule_traits::{fire_rule, PlannerView};
use crate::query::planner::plan::{PlanNode, PlanRef, SetId};

/// 规划统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlannerStats {
    /// 规则队列出队次数
    pub queue_pops: usize,
    /// 实际调用规则的次数
    pub rule_firings: usize,
    /// 新建成员的次数
    pub registrations: usize,
    pub merges: usize,
    pub members: usize,
    pub sets: usize,
}

/// 代价传播的工作表：同一成员只排队一次，"是否只因输入变好而入队"取合取
#[derive(Debug, Default)]
struct CostWork {
    queue: VecDeque<MemberId>,
    improved: HashMap<MemberId, bool>,
}

impl CostWork {
    fn push(&mut self, member: MemberId, improved: bool) {
        match self.improved.entry(member) {
            Entry::Occupied(mut e) => {
                *e.get_mut() &= improved;
            }
            Entry::Vacant(e) => {
                e.insert(improved);
                self.queue.push_back(member);
            }
        }
    }

    fn pop(&mut self) -> Option<(MemberId, bool)> {
        let member = self.queue.pop_front()?;
        let improved = self.improved.remove(&member).unwrap_or(false);
        Some((member, improved))
    }
}

pub struct VolcanoPlanner {
    memo: Memo,
    rules: RuleRegistry,
    queue: RuleQueue,
    cost_model: Arc<dyn CostModel>,
    cost_factory: Arc<dyn CostFactory>,
    trait_defs: TraitDefRegistry,
    config: VolcanoConfig,
    root: Option<(SetId, TraitSet)>,
    row_counts: RowCountCache,
    stats: PlannerStats,
}

impl std::fmt::Debug for VolcanoPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolcanoPlanner")
            .field("rules", &self.rules)
            .field("root", &self.root)
            .field("stats", &self.stats)
            .finish()
    }
}

impl VolcanoPlanner {
    pub fn new(rules: RuleRegistry, cost_factory: Arc<dyn CostFactory>) -> Self {
        let trait_defs = TraitDefRegistry::with_convention();
        Self {
            memo: Memo::new(trait_defs.any_trait_set()),
            rules,
            queue: RuleQueue::new(),
            cost_model: Arc::new(DefaultCostModel::default()),
            cost_factory,
            trait_defs,
            config: VolcanoConfig::default(),
            root: None,
            row_counts: RowCountCache::default(),
            stats: PlannerStats::default(),
        }
    }

    pub fn with_cost_model(mut self, cost_model: Arc<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    /// 替换属性定义注册表；必须在第一次注册之前调用
    pub fn with_trait_defs(mut self, trait_defs: TraitDefRegistry) -> Self {
        self.memo = Memo::new(trait_defs.any_trait_set());
        self.trait_defs = trait_defs;
        self
    }

    pub fn with_config(mut self, config: VolcanoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    pub fn stats(&self) -> PlannerStats {
        self.stats
    }

    pub fn dump(&self) -> String {
        self.memo.dump()
    }

    // ==================== 注册 ====================

    /// 注册节点；`equiv` 为已知与之等价的等价集。返回节点所在的代表等价集。
    pub fn register(&mut self, node: &PlanRef, equiv: Option<SetId>) -> PlanningResult<SetId> {
        let mut events = MemoEvents::default();
        let set = self.memo.register(node, equiv, &mut events)?;
        self.after_registration(events)?;
        Ok(self.memo.canonical(set))
    }

    /// 注册节点并返回它在备忘录中的句柄（等价集 + 节点自身的物理属性集）
    pub fn ensure_registered(
        &mut self,
        node: &PlanRef,
        equiv: Option<SetId>,
    ) -> PlanningResult<PlanRef> {
        let set = self.register(node, equiv)?;
        Ok(self.memo.handle(set, node.traits().clone()))
    }

    /// 请求节点所在等价集满足 `traits` 的子集，返回该子集的句柄
    ///
    /// 没有成员满足时会创建"需要转换"占位成员，交给转换规则处理。
    pub fn change_traits(&mut self, node: &PlanRef, traits: TraitSet) -> PlanningResult<PlanRef> {
        self.trait_defs.validate(&traits)?;
        let set = self.register(node, None)?;
        let mut events = MemoEvents::default();
        self.memo.ensure_subset(set, traits.clone(), &mut events)?;
        self.after_registration(events)?;
        Ok(self.memo.handle(set, traits))
    }

    /// 设置根节点及其要求的物理属性集
    pub fn set_root(&mut self, node: &PlanRef, required: TraitSet) -> PlanningResult<()> {
        self.trait_defs.validate(&required)?;
        let set = self.register(node, None)?;
        let mut events = MemoEvents::default();
        self.memo.ensure_subset(set, required.clone(), &mut events)?;
        self.after_registration(events)?;
        debug!("设置根节点: 等价集 {} 要求 {}", set, required);
        self.root = Some((set, required));
        Ok(())
    }

    /// 节点所在的代表等价集（只读，不注册）
    pub fn set_of(&self, node: &PlanRef) -> Option<SetId> {
        match node.set_id() {
            Some(set) => Some(self.memo.canonical_const(set)),
            None => {
                let canonical = self.canonical_node(node)?;
                self.memo
                    .lookup(canonical.digest())
                    .map(|id| self.memo.set_of_member(id))
            }
        }
    }

    fn canonical_node(&self, node: &PlanRef) -> Option<PlanRef> {
        if node.inputs().is_empty() {
            return Some(node.clone());
        }
        let inputs = node
            .inputs()
            .iter()
            .map(|input| {
                let set = self.set_of(input)?;
                Some(self.memo.handle(set, input.traits().clone()))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(node.with_inputs(inputs))
    }

    fn after_registration(&mut self, events: MemoEvents) -> PlanningResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.stats.registrations += events.new_members.len();

        let max_distance = self.rules.max_operand_depth().saturating_sub(1);
        for &member in &events.new_members {
            self.enqueue_member(member);
            let set = self.memo.set_of_member(member);
            self.enqueue_ancestors(set, max_distance);
        }
        for &set in &events.merged_sets {
            self.enqueue_ancestors(set, max_distance);
        }

        self.update_costs(&events)?;

        self.stats.merges = self.memo.merge_count();
        self.stats.members = self.memo.member_count();
        self.stats.sets = self.memo.set_count();
        Ok(())
    }

    fn enqueue_member(&mut self, member: MemberId) {
        let node = self.memo.member(member).node.clone();
        for (rule, phase) in self.rules.rules_for_root(&node) {
            self.queue.add(rule, phase, member);
        }
    }

    /// 等价集新增成员后，重新匹配距离不超过 `max_distance` 的祖先
    ///
    /// 距离为 d 的祖先只需要重新匹配深度大于 d 的规则，更浅的规则看不到这个等价集。
    fn enqueue_ancestors(&mut self, set: SetId, max_distance: usize) {
        let mut visited: HashSet<SetId> = HashSet::new();
        visited.insert(self.memo.canonical(set));
        let mut frontier = vec![self.memo.canonical(set)];
        for distance in 1..=max_distance {
            let mut next = Vec::new();
            for current in frontier {
                for parent in self.memo.group(current).parents.clone() {
                    let member = self.memo.member(parent);
                    if !member.alive {
                        continue;
                    }
                    let node = member.node.clone();
                    for (rule, phase) in self.rules.rules_for_root(&node) {
                        if rule.operand().depth() > distance {
                            self.queue.add(rule, phase, parent);
                        }
                    }
                    let parent_set = self.memo.set_of_member(parent);
                    if visited.insert(parent_set) {
                        next.push(parent_set);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
    }

    // ==================== 探索 ====================

    /// 探索到队列清空或预算耗尽，然后提取根子集的最优计划
    pub fn find_best_exp(&mut self) -> PlanningResult<PlanRef> {
        let (root, required) = self
            .root
            .clone()
            .ok_or_else(|| PlanningError::internal("尚未设置根节点"))?;
        self.explore()?;
        debug!(
            "探索结束: 出队 {} 次, 触发规则 {} 次, 成员 {} 个, 等价集 {} 个, 合并 {} 次",
            self.stats.queue_pops,
            self.stats.rule_firings,
            self.stats.members,
            self.stats.sets,
            self.stats.merges
        );
        trace!("备忘录:\n{}", self.memo.dump());
        extract(&self.memo, root, &required)
    }

    /// 根子集当前的最优代价
    pub fn best_cost(&self) -> Option<Cost> {
        let (root, required) = self.root.as_ref()?;
        self.memo
            .group(*root)
            .subset(required)
            .map(|subset| subset.best_cost)
    }

    fn explore(&mut self) -> PlanningResult<()> {
        let started = Instant::now();
        let budget = self.config.time_budget_ms.map(Duration::from_millis);
        let mut pops = 0;
        loop {
            if pops >= self.config.max_iterations {
                warn!(
                    "规则队列出队次数达到上限 {}，在当前状态上提取计划（剩余 {} 个任务）",
                    self.config.max_iterations,
                    self.queue.len()
                );
                break;
            }
            if let Some(budget) = budget {
                if started.elapsed() >= budget {
                    warn!(
                        "探索超出时间预算 {:?}，在当前状态上提取计划（剩余 {} 个任务）",
                        budget,
                        self.queue.len()
                    );
                    break;
                }
            }
            let Some(task) = self.queue.pop() else {
                break;
            };
            pops += 1;
            self.stats.queue_pops += 1;
            self.fire(task)?;
        }
        Ok(())
    }

    fn fire(&mut self, task: RuleMatch) -> PlanningResult<()> {
        let member = self.memo.member(task.member);
        if !member.alive {
            return Ok(());
        }
        let node = member.node.clone();
        let bindings = match_all(task.rule.operand(), &node, &*self);

        for binding in bindings {
            let ids: Vec<MemberId> = binding
                .iter()
                .filter_map(|rel| self.memo.lookup(rel.digest()))
                .collect();
            if ids.len() != binding.len() || ids.iter().any(|&id| !self.memo.member(id).alive) {
                continue;
            }
            if !self.queue.mark_fired(task.rule.name(), ids.clone()) {
                continue;
            }
            self.stats.rule_firings += 1;
            trace!("触发规则 {} 于 {:?}", task.rule.name(), ids);

            let results = fire_rule(task.rule.as_ref(), binding, &*self)?;
            for result in results {
                let target = self.memo.set_of_member(task.member);
                trace!("规则 {} 提出 {}", task.rule.name(), result.digest());
                self.register(&result, Some(target))?;
            }
        }
        Ok(())
    }

    // ==================== 行数 ====================

    /// 等价集的估算行数：取第一个不构成环的候选成员估算，按元数据纪元缓存
    fn set_rows(&self, set: SetId, visiting: &mut Vec<SetId>) -> f64 {
        let set = self.memo.canonical_const(set);
        let epoch = self.memo.epoch();
        if let Some(rows) = self.row_counts.get(set, epoch) {
            return rows;
        }
        if visiting.contains(&set) {
            return 1.0;
        }
        visiting.push(set);
        let mut rows = None;
        for id in self.memo.members_of(set) {
            let member = self.memo.member(id);
            if !member.is_candidate() {
                continue;
            }
            let cyclic = member
                .input_handles()
                .any(|(s, _)| visiting.contains(&self.memo.canonical_const(s)));
            if cyclic {
                continue;
            }
            rows = Some(self.node_rows(&member.node, visiting));
            break;
        }
        visiting.pop();
        let rows = rows.unwrap_or(1.0);
        self.row_counts.put(set, epoch, rows);
        rows
    }

    fn input_rows(&self, input: &PlanNode, visiting: &mut Vec<SetId>) -> f64 {
        match input.set_id() {
            Some(set) => self.set_rows(set, visiting),
            None => self.node_rows(input, visiting),
        }
    }

    fn node_rows(&self, node: &PlanNode, visiting: &mut Vec<SetId>) -> f64 {
        let input_rows: Vec<f64> = node
            .inputs()
            .iter()
            .map(|input| self.input_rows(input, visiting))
            .collect();
        self.cost_model.row_count(node, &input_rows)
    }

    // ==================== 代价 ====================

    /// 按会话的容差与代价工厂比较两个代价
    fn compare_costs(&self, a: &Cost, b: &Cost) -> Ordering {
        if !a.is_infinite()
            && !b.is_infinite()
            && (a.value() - b.value()).abs() < self.config.cost_epsilon
        {
            return Ordering::Equal;
        }
        self.cost_factory.compare(a, b)
    }

    /// `(代价, 成员编号)` 序：代价相等时先注册的成员优先
    fn is_better(&self, cost: &Cost, id: MemberId, best_cost: &Cost, best: Option<MemberId>) -> bool {
        match best {
            None => !cost.is_infinite(),
            Some(current) => match self.compare_costs(cost, best_cost) {
                Ordering::Less => true,
                Ordering::Equal => id < current,
                Ordering::Greater => false,
            },
        }
    }

    /// 成员的输入引用了它自己要竞选的子集，这样的成员不可能出现在无环计划中
    fn refers_to_own_subset(&self, id: MemberId, set: SetId, traits: &TraitSet) -> bool {
        self.memo
            .member(id)
            .input_handles()
            .any(|(s, t)| self.memo.canonical_const(s) == set && t == traits)
    }

    fn compute_self_cost(&self, id: MemberId) -> Cost {
        let node = &self.memo.member(id).node;
        let mut visiting = Vec::new();
        let input_rows: Vec<f64> = node
            .inputs()
            .iter()
            .map(|input| self.input_rows(input, &mut visiting))
            .collect();
        let rows = self.cost_model.row_count(node, &input_rows);
        self.cost_model
            .self_cost(node, rows, &input_rows, self.cost_factory.as_ref())
    }

    /// 成员的累计代价 = 自身代价 + 各输入子集的最优代价
    ///
    /// 失效成员、占位成员与逻辑成员的代价为无穷。
    fn member_cost(&mut self, id: MemberId) -> Cost {
        let infinite = self.cost_factory.make_infinite_cost();
        let cached = {
            let member = self.memo.member(id);
            if !member.is_candidate() || member.node.traits().is_logical() {
                return infinite;
            }
            member.self_cost
        };
        let own = match cached {
            Some(cost) => cost,
            None => {
                let cost = self.compute_self_cost(id);
                self.memo.member_mut(id).self_cost = Some(cost);
                cost
            }
        };
        if own.is_infinite() {
            return infinite;
        }
        let mut total = own;
        for (set, traits) in self.memo.member(id).input_handles() {
            let best = self
                .memo
                .group(set)
                .subset(traits)
                .map(|subset| subset.best_cost)
                .unwrap_or(infinite);
            if best.is_infinite() {
                return infinite;
            }
            total = total.plus(&best);
        }
        total
    }

    /// 重新选出子集的最优成员，返回最优成员或最优代价是否变化
    fn recompute_subset(&mut self, set: SetId, traits: &TraitSet) -> bool {
        let set = self.memo.canonical(set);
        let mut best: Option<(MemberId, Cost)> = None;
        for id in self.memo.members_of(set) {
            let member = self.memo.member(id);
            if !member.is_candidate()
                || member.cost.is_infinite()
                || !member.node.traits().satisfies(traits)
                || self.refers_to_own_subset(id, set, traits)
            {
                continue;
            }
            let better = match &best {
                None => true,
                Some((current, current_cost)) => {
                    self.is_better(&member.cost, id, current_cost, Some(*current))
                }
            };
            if better {
                best = Some((id, member.cost));
            }
        }

        let (new_best, new_cost) = match best {
            Some((id, cost)) => (Some(id), cost),
            None => (None, self.cost_factory.make_infinite_cost()),
        };
        let Some(subset) = self.memo.group_mut(set).subset_mut(traits) else {
            return false;
        };
        let changed = subset.best != new_best || !subset.best_cost.equals(&new_cost);
        subset.best = new_best;
        subset.best_cost = new_cost;
        changed
    }

    /// 把输入句柄指向 `(set, traits)` 子集的存活父成员放入工作表
    fn push_dependents(&self, work: &mut CostWork, set: SetId, traits: &TraitSet, improved: bool) {
        let set = self.memo.canonical_const(set);
        for &parent in &self.memo.group(set).parents {
            let member = self.memo.member(parent);
            if !member.alive {
                continue;
            }
            let depends = member
                .input_handles()
                .any(|(s, t)| self.memo.canonical_const(s) == set && t == traits);
            if depends {
                work.push(parent, improved);
            }
        }
    }

    fn update_costs(&mut self, events: &MemoEvents) -> PlanningResult<()> {
        let mut work = CostWork::default();

        for (set, traits) in &events.new_subsets {
            if self.recompute_subset(*set, traits) {
                self.push_dependents(&mut work, *set, traits, false);
            }
        }
        for &set in events.merged_sets.iter().chain(&events.dirty_sets) {
            let set = self.memo.canonical(set);
            let subsets: Vec<TraitSet> = self
                .memo
                .group(set)
                .subsets
                .iter()
                .map(|s| s.traits.clone())
                .collect();
            for traits in &subsets {
                if self.recompute_subset(set, traits) {
                    self.push_dependents(&mut work, set, traits, false);
                }
            }
            for &parent in &self.memo.group(set).parents {
                if self.memo.member(parent).alive {
                    work.push(parent, false);
                }
            }
        }
        for &member in &events.new_members {
            work.push(member, false);
        }

        self.propagate(&mut work)
    }

    fn propagate(&mut self, work: &mut CostWork) -> PlanningResult<()> {
        while let Some((id, improved)) = work.pop() {
            let old = self.memo.member(id).cost;
            let new = self.member_cost(id);
            if improved
                && !old.is_infinite()
                && self.compare_costs(&new, &old) == Ordering::Greater
            {
                return Err(PlanningError::cost_model_violation(format!(
                    "输入代价降低后成员 rel#{} 的代价由 {} 升高到 {}",
                    id, old, new
                )));
            }
            self.memo.member_mut(id).cost = new;

            let set = self.memo.set_of_member(id);
            let traits = self.memo.member(id).node.traits().clone();
            let subsets: Vec<TraitSet> = self
                .memo
                .group(set)
                .subsets
                .iter()
                .filter(|s| traits.satisfies(&s.traits))
                .map(|s| s.traits.clone())
                .collect();

            for subset_traits in subsets {
                if self.refers_to_own_subset(id, set, &subset_traits) {
                    continue;
                }
                let Some((best, best_cost)) = self
                    .memo
                    .group(set)
                    .subset(&subset_traits)
                    .map(|s| (s.best, s.best_cost))
                else {
                    continue;
                };

                let improved_subset = if best == Some(id) {
                    match self.compare_costs(&new, &best_cost) {
                        Ordering::Greater => {
                            if !self.recompute_subset(set, &subset_traits) {
                                continue;
                            }
                            false
                        }
                        ordering => {
                            if let Some(subset) =
                                self.memo.group_mut(set).subset_mut(&subset_traits)
                            {
                                subset.best_cost = new;
                            }
                            if ordering == Ordering::Equal {
                                continue;
                            }
                            true
                        }
                    }
                } else if self.is_better(&new, id, &best_cost, best) {
                    if let Some(subset) = self.memo.group_mut(set).subset_mut(&subset_traits) {
                        subset.best = Some(id);
                        subset.best_cost = new;
                    }
                    trace!("子集 {}.{} 的最优成员变为 rel#{}: {}", set, subset_traits, id, new);
                    true
                } else {
                    continue;
                };

                self.push_dependents(work, set, &subset_traits, improved_subset);
            }
        }
        Ok(())
    }
}

impl InputResolver for VolcanoPlanner {
    fn candidates(&self, input: &PlanRef) -> Vec<PlanRef> {
        self.members(input)
    }
}

impl PlannerView for VolcanoPlanner {
    fn members(&self, input: &PlanRef) -> Vec<PlanRef> {
        match input.set_id() {
            Some(set) => self.memo.candidates(set, input.traits()),
            None => vec![input.clone()],
        }
    }

    fn row_count(&self, node: &PlanNode) -> f64 {
        let mut visiting = Vec::new();
        self.input_rows(node, &mut visiting)
    }

    fn trait_defs(&self) -> &TraitDefRegistry {
        &self.trait_defs
    }

    fn metadata_epoch(&self) -> u64 {
        self.memo.epoch()
    }
}
