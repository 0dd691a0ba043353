//! 代价模型
//!
//! `CostModel` 为单个节点估算输出行数和自身代价（不含输入）；
//! 子树的累计代价由规划器把各输入的最优代价相加得到。

use super::cost::{Cost, CostFactory};
use super::stats::Statistics;
use crate::query::planner::plan::{NodeKind, PlanNode};

/// 可插拔的代价模型
pub trait CostModel: Send + Sync {
    /// 估算节点的输出行数，`input_rows` 与节点输入一一对应
    fn row_count(&self, node: &PlanNode, input_rows: &[f64]) -> f64;

    /// 估算节点自身的代价
    fn self_cost(
        &self,
        node: &PlanNode,
        rows: f64,
        input_rows: &[f64],
        factory: &dyn CostFactory,
    ) -> Cost;
}

/// 代价参数
#[derive(Debug, Clone, Copy)]
pub struct CostModelConfig {
    /// 处理每行数据的 CPU 代价
    pub cpu_tuple_cost: f64,
    /// 顺序读取每行的 IO 代价
    pub io_tuple_cost: f64,
    /// 索引扫描相对顺序扫描的 IO 比例
    pub index_io_ratio: f64,
    /// 哈希表构建的每行附加代价
    pub hash_build_cost: f64,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            cpu_tuple_cost: 1.0,
            io_tuple_cost: 1.0,
            index_io_ratio: 0.25,
            hash_build_cost: 0.5,
        }
    }
}

/// 默认代价模型
#[derive(Debug, Clone, Default)]
pub struct DefaultCostModel {
    pub config: CostModelConfig,
    pub stats: Statistics,
}

impl DefaultCostModel {
    pub fn new(stats: Statistics) -> Self {
        Self {
            config: CostModelConfig::default(),
            stats,
        }
    }

    pub fn with_config(mut self, config: CostModelConfig) -> Self {
        self.config = config;
        self
    }
}

fn first(input_rows: &[f64]) -> f64 {
    input_rows.first().copied().unwrap_or(0.0)
}

fn sum(input_rows: &[f64]) -> f64 {
    input_rows.iter().sum()
}

impl CostModel for DefaultCostModel {
    fn row_count(&self, node: &PlanNode, input_rows: &[f64]) -> f64 {
        match node.kind() {
            NodeKind::Values { row_count } => *row_count as f64,
            NodeKind::TableScan { table } | NodeKind::IndexScan { table, .. } => {
                self.stats.table_rows(table)
            }
            NodeKind::Filter { .. } => first(input_rows) * self.stats.filter_selectivity,
            NodeKind::Join { .. }
            | NodeKind::HashJoin { .. }
            | NodeKind::MergeJoin { .. }
            | NodeKind::NestedLoopJoin { .. } => {
                let left = first(input_rows);
                let right = input_rows.get(1).copied().unwrap_or(0.0);
                (left * right * self.stats.join_selectivity).max(1.0)
            }
            NodeKind::Aggregate { group_keys, .. }
            | NodeKind::HashAggregate { group_keys, .. }
            | NodeKind::SortAggregate { group_keys, .. } => {
                if group_keys.is_empty() {
                    1.0
                } else {
                    (first(input_rows) * self.stats.group_ratio).max(1.0)
                }
            }
            NodeKind::Limit { offset, fetch } => {
                let remaining = (first(input_rows) - *offset as f64).max(0.0);
                match fetch {
                    Some(fetch) => remaining.min(*fetch as f64),
                    None => remaining,
                }
            }
            NodeKind::Union { .. } => sum(input_rows),
            NodeKind::Project { .. }
            | NodeKind::Sort { .. }
            | NodeKind::Converter
            | NodeKind::AbstractConverter
            | NodeKind::Subset(_)
            | NodeKind::Vertex(_) => first(input_rows),
        }
    }

    fn self_cost(
        &self,
        node: &PlanNode,
        rows: f64,
        input_rows: &[f64],
        factory: &dyn CostFactory,
    ) -> Cost {
        let cpu = self.config.cpu_tuple_cost;
        let io = self.config.io_tuple_cost;
        match node.kind() {
            NodeKind::Subset(_) | NodeKind::Vertex(_) => factory.make_zero_cost(),
            NodeKind::AbstractConverter => factory.make_infinite_cost(),
            NodeKind::TableScan { .. } => factory.make_cost(rows, rows * cpu, rows * io),
            NodeKind::IndexScan { .. } => {
                factory.make_cost(rows, rows * cpu, rows * io * self.config.index_io_ratio)
            }
            NodeKind::Values { .. } => factory.make_cost(rows, rows * cpu, 0.0),
            NodeKind::NestedLoopJoin { .. } => {
                let left = first(input_rows);
                let right = input_rows.get(1).copied().unwrap_or(0.0);
                factory.make_cost(rows, left * right * cpu, 0.0)
            }
            NodeKind::Join { .. } | NodeKind::HashJoin { .. } => {
                let build = input_rows.get(1).copied().unwrap_or(0.0);
                factory.make_cost(
                    rows,
                    sum(input_rows) * cpu + build * self.config.hash_build_cost,
                    0.0,
                )
            }
            NodeKind::MergeJoin { .. } => factory.make_cost(rows, sum(input_rows) * cpu, 0.0),
            NodeKind::Aggregate { .. } | NodeKind::HashAggregate { .. } => factory.make_cost(
                rows,
                first(input_rows) * (cpu + self.config.hash_build_cost),
                0.0,
            ),
            NodeKind::SortAggregate { .. } => {
                factory.make_cost(rows, first(input_rows) * cpu, 0.0)
            }
            NodeKind::Sort { .. } => {
                let n = first(input_rows).max(1.0);
                factory.make_cost(rows, n * n.log2().max(1.0) * cpu, 0.0)
            }
            NodeKind::Filter { .. }
            | NodeKind::Project { .. }
            | NodeKind::Converter
            | NodeKind::Union { .. } => factory.make_cost(rows, sum(input_rows) * cpu, 0.0),
            NodeKind::Limit { .. } => factory.make_cost(rows, rows * cpu, 0.0),
        }
    }
}
