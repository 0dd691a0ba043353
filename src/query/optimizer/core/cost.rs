//! 代价模型核心类型
//! 定义 Cost 以及产生代价值的 CostFactory

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// 代价相等判断的容差
pub const COST_EPSILON: f64 = 1.0e-5;

/// 代价值
///
/// 三个维度：估算行数、CPU 开销、IO 开销。比较时使用 `value()`（CPU + IO），
/// 行数只参与展示和派生计算。所有维度均为无穷大时表示"无穷代价"，它大于任何有限代价。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub rows: f64,
    pub cpu: f64,
    pub io: f64,
}

impl Default for Cost {
    fn default() -> Self {
        Self::zero()
    }
}

impl Cost {
    pub fn new(rows: f64, cpu: f64, io: f64) -> Self {
        Self { rows, cpu, io }
    }

    pub fn zero() -> Self {
        Self {
            rows: 0.0,
            cpu: 0.0,
            io: 0.0,
        }
    }

    pub fn infinite() -> Self {
        Self {
            rows: f64::INFINITY,
            cpu: f64::INFINITY,
            io: f64::INFINITY,
        }
    }

    pub fn tiny() -> Self {
        Self {
            rows: 1.0,
            cpu: 1.0,
            io: 0.0,
        }
    }

    pub fn huge() -> Self {
        Self {
            rows: f64::MAX,
            cpu: f64::MAX,
            io: f64::MAX,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.rows.is_infinite() || self.cpu.is_infinite() || self.io.is_infinite()
    }

    /// 用于比较的标量：CPU + IO，不含行数
    ///
    /// 需要让行数参与选优的嵌入方可以在自己的 `CostFactory::compare` 中使用 `rows`。
    pub fn value(&self) -> f64 {
        if self.is_infinite() {
            f64::INFINITY
        } else {
            self.cpu + self.io
        }
    }

    pub fn plus(&self, other: &Cost) -> Cost {
        if self.is_infinite() || other.is_infinite() {
            return Cost::infinite();
        }
        Cost::new(
            self.rows + other.rows,
            self.cpu + other.cpu,
            self.io + other.io,
        )
    }

    /// 无穷代价减去任何值仍为无穷
    pub fn minus(&self, other: &Cost) -> Cost {
        if self.is_infinite() {
            return Cost::infinite();
        }
        Cost::new(
            self.rows - other.rows,
            self.cpu - other.cpu,
            self.io - other.io,
        )
    }

    pub fn multiply_by(&self, factor: f64) -> Cost {
        if self.is_infinite() {
            return Cost::infinite();
        }
        Cost::new(self.rows * factor, self.cpu * factor, self.io * factor)
    }

    /// 两个代价的比值（按 `value()` 计算），除数为零时返回 1
    pub fn divide_by(&self, other: &Cost) -> f64 {
        let denominator = other.value();
        if denominator == 0.0 || denominator.is_infinite() {
            return 1.0;
        }
        self.value() / denominator
    }

    pub fn is_le(&self, other: &Cost) -> bool {
        self.equals(other) || self.value() <= other.value()
    }

    pub fn is_lt(&self, other: &Cost) -> bool {
        !self.equals(other) && self.value() < other.value()
    }

    /// 容差相等：两个无穷代价相等；有限代价的差值小于 `COST_EPSILON` 时相等
    pub fn equals(&self, other: &Cost) -> bool {
        match (self.is_infinite(), other.is_infinite()) {
            (true, true) => true,
            (false, false) => (self.value() - other.value()).abs() < COST_EPSILON,
            _ => false,
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            return write!(f, "{{inf}}");
        }
        write!(
            f,
            "{{{:.1} rows, {:.1} cpu, {:.1} io}}",
            self.rows, self.cpu, self.io
        )
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.equals(other) {
            Some(Ordering::Equal)
        } else {
            self.value().partial_cmp(&other.value())
        }
    }
}

/// 代价工厂
///
/// 由嵌入方提供，决定会话使用的零代价、无穷代价以及比较策略。
pub trait CostFactory: Send + Sync {
    fn make_cost(&self, rows: f64, cpu: f64, io: f64) -> Cost;

    fn make_zero_cost(&self) -> Cost;

    fn make_infinite_cost(&self) -> Cost;

    fn make_tiny_cost(&self) -> Cost;

    fn make_huge_cost(&self) -> Cost;

    /// 比较两个代价；必须是全序且满足加法单调性
    fn compare(&self, a: &Cost, b: &Cost) -> Ordering {
        if a.equals(b) {
            Ordering::Equal
        } else if a.is_lt(b) {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

/// 默认代价工厂
#[derive(Debug, Clone, Default)]
pub struct DefaultCostFactory;

impl CostFactory for DefaultCostFactory {
    fn make_cost(&self, rows: f64, cpu: f64, io: f64) -> Cost {
        Cost::new(rows, cpu, io)
    }

    fn make_zero_cost(&self) -> Cost {
        Cost::zero()
    }

    fn make_infinite_cost(&self) -> Cost {
        Cost::infinite()
    }

    fn make_tiny_cost(&self) -> Cost {
        Cost::tiny()
    }

    fn make_huge_cost(&self) -> Cost {
        Cost::huge()
    }
}
