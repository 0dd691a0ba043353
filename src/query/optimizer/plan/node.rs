//! 备忘录成员
//!
//! `OptGroupNode` 是等价集中的一个成员表达式：
//! - 规范化后的节点（输入全部替换为等价集句柄）
//! - 注册时所属的等价集（需要经并查集解析为当前代表元）
//! - 自身代价与累计代价
//! - 存活标记：合并后摘要冲突的重复成员被标记为失效

use crate::query::optimizer::core::{Cost, TraitSet};
use crate::query::planner::plan::{OperatorKind, PlanRef, SetId};

pub type MemberId = usize;

#[derive(Debug, Clone)]
pub struct OptGroupNode {
    pub id: MemberId,
    pub node: PlanRef,
    pub group: SetId,
    pub alive: bool,
    pub self_cost: Option<Cost>,
    pub cost: Cost,
}

impl OptGroupNode {
    pub fn new(id: MemberId, node: PlanRef, group: SetId) -> Self {
        Self {
            id,
            node,
            group,
            alive: true,
            self_cost: None,
            cost: Cost::infinite(),
        }
    }

    /// "需要转换"占位成员
    pub fn is_placeholder(&self) -> bool {
        self.node.operator() == OperatorKind::AbstractConverter
    }

    /// 只有存活且非占位的成员才参与匹配与选择
    pub fn is_candidate(&self) -> bool {
        self.alive && !self.is_placeholder()
    }

    /// 输入句柄：(等价集, 物理属性集)
    pub fn input_handles(&self) -> impl Iterator<Item = (SetId, &TraitSet)> {
        self.node
            .inputs()
            .iter()
            .filter_map(|input| input.set_id().map(|set| (set, input.traits())))
    }
}
