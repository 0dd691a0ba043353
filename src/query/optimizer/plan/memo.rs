//! 备忘录
//!
//! 摘要 → 成员的内容寻址表，加上以并查集管理的等价集数组。
//!
//! 注册一个节点时先递归注册它的输入，再把输入替换为 `Subset` 句柄得到规范节点：
//! - 摘要已存在：返回已有成员所在的等价集，若调用方声明了等价集则合并两者
//! - 摘要不存在：在声明的等价集（或新建的等价集）中创建成员
//!
//! 合并后，引用了被吸收等价集的父成员会重新计算摘要；重新计算后与其他成员
//! 摘要冲突的父成员被标记为失效，并继续合并两者所在的等价集。
//!
//! 备忘录本身不计算代价，也不调度规则：每次操作把发生的变化记录在
//! `MemoEvents` 中，由规划器据此更新代价与规则队列。

use std::collections::HashMap;
use std::fmt::Write as _;

use log::trace;

use super::group::OptGroup;
use super::node::{MemberId, OptGroupNode};
use super::union_find::UnionFind;
use crate::core::error::{PlanningError, PlanningResult};
use crate::core::schema::RowTypeRef;
use crate::query::optimizer::core::TraitSet;
use crate::query::planner::plan::{NodeKind, PlanNode, PlanRef, SetId};

/// 一次备忘录操作引起的变化
#[derive(Debug, Default)]
pub struct MemoEvents {
    /// 新建的成员
    pub new_members: Vec<MemberId>,
    /// 新建的子集
    pub new_subsets: Vec<(SetId, TraitSet)>,
    /// 合并后的代表等价集
    pub merged_sets: Vec<SetId>,
    /// 有成员失效的等价集
    pub dirty_sets: Vec<SetId>,
}

impl MemoEvents {
    pub fn is_empty(&self) -> bool {
        self.new_members.is_empty()
            && self.new_subsets.is_empty()
            && self.merged_sets.is_empty()
            && self.dirty_sets.is_empty()
    }
}

#[derive(Debug)]
pub struct Memo {
    groups: Vec<OptGroup>,
    members: Vec<OptGroupNode>,
    digests: HashMap<String, MemberId>,
    sets: UnionFind,
    epoch: u64,
    merges: usize,
    any_traits: TraitSet,
}

impl Memo {
    /// `any_traits` 是占位节点输入使用的通配属性集
    pub fn new(any_traits: TraitSet) -> Self {
        Self {
            groups: Vec::new(),
            members: Vec::new(),
            digests: HashMap::new(),
            sets: UnionFind::new(),
            epoch: 0,
            merges: 0,
            any_traits,
        }
    }

    // ==================== 查询 ====================

    pub fn canonical(&mut self, set: SetId) -> SetId {
        SetId(self.sets.find(set.0))
    }

    pub fn canonical_const(&self, set: SetId) -> SetId {
        SetId(self.sets.find_const(set.0))
    }

    pub fn group(&self, set: SetId) -> &OptGroup {
        &self.groups[self.canonical_const(set).0]
    }

    pub(crate) fn group_mut(&mut self, set: SetId) -> &mut OptGroup {
        let set = self.canonical(set);
        &mut self.groups[set.0]
    }

    pub fn member(&self, id: MemberId) -> &OptGroupNode {
        &self.members[id]
    }

    pub(crate) fn member_mut(&mut self, id: MemberId) -> &mut OptGroupNode {
        &mut self.members[id]
    }

    /// 成员当前所在的代表等价集
    pub fn set_of_member(&self, id: MemberId) -> SetId {
        self.canonical_const(self.members[id].group)
    }

    pub fn lookup(&self, digest: &str) -> Option<MemberId> {
        self.digests.get(digest).copied()
    }

    /// 等价集的成员编号（注册顺序）
    pub fn members_of(&self, set: SetId) -> Vec<MemberId> {
        let mut members = self.group(set).members.clone();
        members.sort_unstable();
        members
    }

    /// 等价集中满足 `traits` 的候选成员节点（注册顺序，不含失效成员与占位成员）
    pub fn candidates(&self, set: SetId, traits: &TraitSet) -> Vec<PlanRef> {
        self.members_of(set)
            .into_iter()
            .map(|id| &self.members[id])
            .filter(|m| m.is_candidate() && m.node.traits().satisfies(traits))
            .map(|m| m.node.clone())
            .collect()
    }

    /// 等价集句柄节点
    pub fn handle(&self, set: SetId, traits: TraitSet) -> PlanRef {
        let set = self.canonical_const(set);
        PlanNode::subset(set, traits, self.groups[set.0].row_type.clone())
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn merge_count(&self) -> usize {
        self.merges
    }

    /// 存活的成员数
    pub fn member_count(&self) -> usize {
        self.members.iter().filter(|m| m.alive).count()
    }

    /// 未被合并的等价集数
    pub fn set_count(&self) -> usize {
        self.groups.iter().filter(|g| !g.is_merged()).count()
    }

    /// 所有未被合并的等价集
    pub fn canonical_sets(&self) -> Vec<SetId> {
        self.groups
            .iter()
            .filter(|g| !g.is_merged())
            .map(|g| g.id)
            .collect()
    }

    // ==================== 注册 ====================

    fn new_group(&mut self, row_type: RowTypeRef) -> SetId {
        let id = SetId(self.sets.make_set());
        self.groups.push(OptGroup::new(id, row_type));
        id
    }

    /// 注册节点，返回其所在的代表等价集
    pub fn register(
        &mut self,
        node: &PlanRef,
        equiv: Option<SetId>,
        events: &mut MemoEvents,
    ) -> PlanningResult<SetId> {
        if let Some(set) = node.set_id() {
            let set = self.canonical(set);
            self.ensure_subset(set, node.traits().clone(), events)?;
            return match equiv {
                Some(target) => self.merge(target, set, events),
                None => Ok(set),
            };
        }

        let mut input_sets = Vec::with_capacity(node.inputs().len());
        for input in node.inputs() {
            let set = self.register(input, None, events)?;
            self.ensure_subset(set, input.traits().clone(), events)?;
            input_sets.push(set);
        }
        // 输入注册过程中可能发生合并，统一再解析一次
        let handles: Vec<PlanRef> = input_sets
            .iter()
            .zip(node.inputs())
            .map(|(set, input)| {
                let set = self.canonical(*set);
                self.handle(set, input.traits().clone())
            })
            .collect();
        let unchanged = handles
            .iter()
            .zip(node.inputs())
            .all(|(h, i)| h.digest() == i.digest());
        let canonical_node = if unchanged {
            node.clone()
        } else {
            node.with_inputs(handles)
        };

        if let Some(existing) = self.lookup(canonical_node.digest()) {
            let set = self.canonical(self.members[existing].group);
            trace!("重复注册 {}，已在等价集 {}", canonical_node.digest(), set);
            return match equiv {
                Some(target) => self.merge(target, set, events),
                None => Ok(set),
            };
        }

        let set = match equiv {
            Some(target) => {
                let target = self.canonical(target);
                let expected = &self.groups[target.0].row_type;
                if !expected.is_equivalent(canonical_node.row_type()) {
                    return Err(PlanningError::RowTypeMismatch {
                        expected: expected.as_ref().clone(),
                        actual: canonical_node.row_type().as_ref().clone(),
                    });
                }
                target
            }
            None => self.new_group(canonical_node.row_type().clone()),
        };

        let id = self.members.len();
        let member = OptGroupNode::new(id, canonical_node.clone(), set);
        let input_sets: Vec<SetId> = member.input_handles().map(|(s, _)| s).collect();
        self.members.push(member);
        self.digests.insert(canonical_node.digest().to_string(), id);
        self.groups[set.0].add_member(id);
        for input_set in input_sets {
            self.group_mut(input_set).add_parent(id);
        }
        self.epoch += 1;
        events.new_members.push(id);
        trace!("注册成员 {} 到等价集 {}: {}", id, set, canonical_node.digest());

        self.ensure_subset(set, canonical_node.traits().clone(), events)?;
        Ok(self.canonical(set))
    }

    /// 确保等价集存在 `traits` 子集
    ///
    /// 新建的子集若没有任何成员满足（且不是全通配要求），创建一个"需要转换"
    /// 占位成员，由转换规则把它替换为具体的转换节点。
    pub fn ensure_subset(
        &mut self,
        set: SetId,
        traits: TraitSet,
        events: &mut MemoEvents,
    ) -> PlanningResult<()> {
        let set = self.canonical(set);
        if !self.groups[set.0].add_subset(traits.clone()) {
            return Ok(());
        }
        events.new_subsets.push((set, traits.clone()));
        if traits.iter().all(|t| t.is_wildcard()) {
            return Ok(());
        }
        let satisfied = self.groups[set.0].members.iter().any(|&id| {
            let member = &self.members[id];
            member.is_candidate() && member.node.traits().satisfies(&traits)
        });
        if satisfied {
            return Ok(());
        }

        let row_type = self.groups[set.0].row_type.clone();
        let input = PlanNode::subset(set, self.any_traits.clone(), row_type.clone());
        let placeholder = PlanNode::new(NodeKind::AbstractConverter, traits, row_type, vec![input]);
        trace!("等价集 {} 缺少满足 {} 的成员，创建转换占位", set, placeholder.traits());
        self.register(&placeholder, Some(set), events)?;
        Ok(())
    }

    // ==================== 合并 ====================

    /// 合并两个等价集，返回合并后的代表等价集
    pub fn merge(&mut self, a: SetId, b: SetId, events: &mut MemoEvents) -> PlanningResult<SetId> {
        let mut pending = vec![(a, b)];
        while let Some((x, y)) = pending.pop() {
            let (keep, absorbed) = {
                let rx = self.canonical(x);
                let ry = self.canonical(y);
                if rx == ry {
                    continue;
                }
                if !self.groups[rx.0]
                    .row_type
                    .is_equivalent(&self.groups[ry.0].row_type)
                {
                    return Err(PlanningError::RowTypeMismatch {
                        expected: self.groups[rx.0].row_type.as_ref().clone(),
                        actual: self.groups[ry.0].row_type.as_ref().clone(),
                    });
                }
                match self.sets.union(rx.0, ry.0) {
                    Some((keep, absorbed)) => (SetId(keep), SetId(absorbed)),
                    None => continue,
                }
            };
            self.merges += 1;
            self.epoch += 1;
            trace!("合并等价集 {} 到 {}", absorbed, keep);

            let absorbed_group = &mut self.groups[absorbed.0];
            absorbed_group.merged_into = Some(keep);
            let members = std::mem::take(&mut absorbed_group.members);
            let parents = std::mem::take(&mut absorbed_group.parents);
            let subsets = std::mem::take(&mut absorbed_group.subsets);

            let keep_group = &mut self.groups[keep.0];
            for member in members {
                keep_group.add_member(member);
            }
            for parent in parents {
                keep_group.add_parent(parent);
            }
            for subset in subsets {
                if keep_group.add_subset(subset.traits.clone()) {
                    events.new_subsets.push((keep, subset.traits));
                }
            }
            events.merged_sets.push(keep);

            self.redigest_parents(keep, absorbed, &mut pending, events);
        }
        Ok(self.canonical(a))
    }

    /// 重新计算引用了 `absorbed` 的父成员的摘要
    fn redigest_parents(
        &mut self,
        keep: SetId,
        absorbed: SetId,
        pending: &mut Vec<(SetId, SetId)>,
        events: &mut MemoEvents,
    ) {
        let parents = self.groups[keep.0].parents.clone();
        for parent in parents {
            if !self.members[parent].alive {
                continue;
            }
            let node = self.members[parent].node.clone();
            if !node.inputs().iter().any(|i| i.set_id() == Some(absorbed)) {
                continue;
            }
            let inputs: Vec<PlanRef> = node
                .inputs()
                .iter()
                .map(|input| match input.set_id() {
                    Some(set) => self.handle(set, input.traits().clone()),
                    None => input.clone(),
                })
                .collect();
            let renamed = node.with_inputs(inputs);
            if self.digests.get(node.digest()) == Some(&parent) {
                self.digests.remove(node.digest());
            }
            match self.lookup(renamed.digest()) {
                Some(other) if other != parent => {
                    let parent_set = self.canonical(self.members[parent].group);
                    let other_set = self.canonical(self.members[other].group);
                    trace!(
                        "成员 {} 与成员 {} 摘要相同，标记为失效: {}",
                        parent,
                        other,
                        renamed.digest()
                    );
                    self.members[parent].alive = false;
                    self.members[parent].node = renamed;
                    events.dirty_sets.push(parent_set);
                    if parent_set != other_set {
                        pending.push((parent_set, other_set));
                    }
                }
                _ => {
                    self.digests.insert(renamed.digest().to_string(), parent);
                    self.members[parent].node = renamed;
                }
            }
        }
    }

    // ==================== 输出 ====================

    /// 备忘录的文本转储
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for set in self.canonical_sets() {
            let group = &self.groups[set.0];
            let _ = writeln!(out, "Set{} {}", set, group.row_type);
            for id in self.members_of(set) {
                let member = &self.members[id];
                let _ = writeln!(
                    out,
                    "  {}{} rel#{} {}: cost = {}",
                    if member.alive { "" } else { "(dead) " },
                    if member.is_placeholder() { "(placeholder) " } else { "" },
                    id,
                    member.node.digest(),
                    member.cost
                );
            }
            for subset in &group.subsets {
                let best = subset
                    .best
                    .map(|b| format!("rel#{}", b))
                    .unwrap_or_else(|| "none".to_string());
                let _ = writeln!(
                    out,
                    "  Subset{}.{}: best = {}, cost = {}",
                    set, subset.traits, best, subset.best_cost
                );
            }
        }
        out
    }
}
