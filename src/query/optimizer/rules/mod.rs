//! 优化规则模块
//!
//! 规划引擎本身不依赖任何具体规则，这里提供引擎运行所需的转换规则，
//! 以及几个常用的实现规则与逻辑改写规则。
//!
//! # 规则分类
//!
//! ## 转换规则 (conversion)
//! 以"需要转换"占位成员为根：
//! - `ExpandConversionRule` - 按属性定义提出通用转换节点
//! - `SortEnforcerRule` - 为排序要求插入排序节点
//!
//! ## 实现规则 (implementation)
//! - `ConventionRule` - 逻辑算子到物理约定的通用实现规则
//!
//! ## 逻辑改写规则 (logical)
//! - `FilterMergeRule` - 合并相邻过滤
//! - `RemoveTrivialProjectRule` - 移除原样投影

pub mod conversion;
pub mod implementation;
pub mod logical;

pub use conversion::{ExpandConversionRule, SortEnforcerRule};
pub use implementation::{
    to_hash_aggregate, to_hash_join, to_nested_loop_join, ConventionRule, KindMapping,
};
pub use logical::{FilterMergeRule, RemoveTrivialProjectRule};
