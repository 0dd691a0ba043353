// 查询优化
//
// - planner: 计划节点与启发式重写规划器
// - optimizer: 代价模型、模式匹配、规则以及基于备忘录的代价规划器

pub mod optimizer;
pub mod planner;
