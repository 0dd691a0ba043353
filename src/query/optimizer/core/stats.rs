//! 统计信息
//!
//! 默认代价模型使用的最小统计集合：表行数和几个默认选择率。
//! 真实系统由外部元数据组件提供更完整的估算。

use std::collections::HashMap;

/// 表级统计信息
#[derive(Debug, Clone)]
pub struct Statistics {
    table_rows: HashMap<String, f64>,
    /// 未登记的表使用的默认行数
    pub default_table_rows: f64,
    /// 过滤条件的默认选择率
    pub filter_selectivity: f64,
    /// 连接条件的默认选择率
    pub join_selectivity: f64,
    /// 分组后行数与输入行数之比
    pub group_ratio: f64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            table_rows: HashMap::new(),
            default_table_rows: 100.0,
            filter_selectivity: 0.25,
            join_selectivity: 0.1,
            group_ratio: 0.1,
        }
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>, rows: f64) -> Self {
        self.set_table_rows(table, rows);
        self
    }

    pub fn set_table_rows(&mut self, table: impl Into<String>, rows: f64) {
        self.table_rows.insert(table.into(), rows);
    }

    pub fn table_rows(&self, table: &str) -> f64 {
        self.table_rows
            .get(table)
            .copied()
            .unwrap_or(self.default_table_rows)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.table_rows.contains_key(table)
    }
}
