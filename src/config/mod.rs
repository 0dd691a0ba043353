use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::error::PlanningResult;
use crate::query::optimizer::core::COST_EPSILON;
use crate::query::planner::rewrite::MatchOrder;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub planner: PlannerConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    pub volcano: VolcanoConfig,
    pub heuristic: HeuristicConfig,
}

/// 代价规划器配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct VolcanoConfig {
    /// 规则队列最多出队次数，耗尽后直接在当前状态上提取计划
    pub max_iterations: usize,
    /// 探索阶段的时间预算（毫秒）
    pub time_budget_ms: Option<u64>,
    /// 代价相等判断的容差
    pub cost_epsilon: f64,
}

impl Default for VolcanoConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            time_budget_ms: None,
            cost_epsilon: COST_EPSILON,
        }
    }
}

/// 启发式规划器配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HeuristicConfig {
    /// 变换次数上限，达到后报告未收敛
    pub max_iterations: usize,
    /// 每组规则最多遍历的轮数，None 表示直到不再变化
    pub max_passes: Option<usize>,
    pub match_order: MatchOrder,
    /// 每组规则最多应用的次数
    pub match_limit: Option<usize>,
    /// 以摘要合并相同的子树（有向无环图模式）
    pub allow_dag: bool,
    /// 未收敛时返回错误而不是警告
    pub fail_on_non_convergence: bool,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1_000,
            max_passes: None,
            match_order: MatchOrder::Arbitrary,
            match_limit: None,
            allow_dag: true,
            fail_on_non_convergence: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: "relopt".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_files: 5,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> PlanningResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> PlanningResult<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> PlanningResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
