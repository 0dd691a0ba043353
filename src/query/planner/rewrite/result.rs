//! 重写结果定义

use crate::query::planner::plan::PlanRef;

/// 一次启发式重写的结果
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// 重写后的计划树
    pub plan: PlanRef,
    /// 实际发生的变换次数
    pub transformations: usize,
    /// 遍历重写图的总轮数
    pub passes: usize,
    /// 为 false 表示达到变换次数上限后提前停止
    pub converged: bool,
}

impl RewriteOutcome {
    /// 是否改变了输入计划
    pub fn changed(&self) -> bool {
        self.transformations > 0
    }
}
