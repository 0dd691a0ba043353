//! 等价集定义
//! 定义 OptGroup 结构体，管理一组逻辑等价、结构不同的表达式
//!
//! OptGroup 是备忘录的核心数据结构之一：
//! - 成员列表：按注册顺序保存的成员编号
//! - 父成员：输入引用了本集合的成员，用于代价传播与祖先重新匹配
//! - 子集：每个被请求过的物理属性集对应一个子集，记录当前最优成员及其代价

use std::fmt;

use super::node::MemberId;
use crate::core::schema::RowTypeRef;
use crate::query::optimizer::core::{Cost, TraitSet};
use crate::query::planner::plan::SetId;

/// 等价集在某个物理属性集下的视图
#[derive(Debug, Clone)]
pub struct SubsetState {
    pub traits: TraitSet,
    pub best: Option<MemberId>,
    pub best_cost: Cost,
}

impl SubsetState {
    pub fn new(traits: TraitSet) -> Self {
        Self {
            traits,
            best: None,
            best_cost: Cost::infinite(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptGroup {
    pub id: SetId,
    pub row_type: RowTypeRef,
    pub members: Vec<MemberId>,
    pub parents: Vec<MemberId>,
    pub subsets: Vec<SubsetState>,
    /// 被合并后指向吸收它的等价集
    pub merged_into: Option<SetId>,
}

impl OptGroup {
    pub fn new(id: SetId, row_type: RowTypeRef) -> Self {
        Self {
            id,
            row_type,
            members: Vec::new(),
            parents: Vec::new(),
            subsets: Vec::new(),
            merged_into: None,
        }
    }

    pub fn add_member(&mut self, member: MemberId) {
        if !self.members.contains(&member) {
            self.members.push(member);
        }
    }

    pub fn add_parent(&mut self, member: MemberId) {
        if !self.parents.contains(&member) {
            self.parents.push(member);
        }
    }

    pub fn subset(&self, traits: &TraitSet) -> Option<&SubsetState> {
        self.subsets.iter().find(|s| &s.traits == traits)
    }

    pub fn subset_mut(&mut self, traits: &TraitSet) -> Option<&mut SubsetState> {
        self.subsets.iter_mut().find(|s| &s.traits == traits)
    }

    /// 添加子集，已存在时返回 false
    pub fn add_subset(&mut self, traits: TraitSet) -> bool {
        if self.subset(&traits).is_some() {
            return false;
        }
        self.subsets.push(SubsetState::new(traits));
        true
    }

    pub fn is_merged(&self) -> bool {
        self.merged_into.is_some()
    }
}

impl fmt::Display for OptGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Set{} {} ({} members, {} subsets)",
            self.id,
            self.row_type,
            self.members.len(),
            self.subsets.len()
        )
    }
}
