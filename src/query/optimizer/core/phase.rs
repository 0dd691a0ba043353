//! 优化阶段定义
//! 代价规划器的规则队列按阶段依次消费，阶段结束后新产生的该阶段匹配不再执行

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptimizationPhase {
    PreProcess,
    Optimize,
    Cleanup,
}

impl OptimizationPhase {
    pub const ALL: [OptimizationPhase; 3] = [
        OptimizationPhase::PreProcess,
        OptimizationPhase::Optimize,
        OptimizationPhase::Cleanup,
    ];

    pub fn index(&self) -> usize {
        match self {
            OptimizationPhase::PreProcess => 0,
            OptimizationPhase::Optimize => 1,
            OptimizationPhase::Cleanup => 2,
        }
    }
}

impl Default for OptimizationPhase {
    fn default() -> Self {
        Self::Optimize
    }
}

impl fmt::Display for OptimizationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptimizationPhase::PreProcess => "PRE_PROCESS",
            OptimizationPhase::Optimize => "OPTIMIZE",
            OptimizationPhase::Cleanup => "CLEANUP",
        };
        write!(f, "{}", name)
    }
}
