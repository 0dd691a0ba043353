//! 统一错误处理
//!
//! ## 设计理念
//!
//! 1. 规划过程中的所有失败都汇总到 `PlanningError`，调用方只需处理一个带标签的结果
//! 2. 规则内部的失败使用 `RuleError`，由规划器补充规则名称后转换为 `PlanningError::RuleExecution`
//! 3. 重复注册（摘要相同）通过合并等价集静默恢复，从不作为错误上报
//! 4. 模式不匹配是正常的否定结果（`None`），不属于错误

use thiserror::Error;

use crate::core::schema::RowType;
use crate::query::optimizer::core::TraitSet;

/// 规划错误
#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("规则执行失败 [{rule}]: {message}")]
    RuleExecution { rule: String, message: String },

    #[error("没有满足物理属性的计划: 等价集 #{set} 要求 {traits}")]
    NoPhysicalPlan { set: usize, traits: TraitSet },

    #[error("代价模型违反单调性: {message}")]
    CostModelViolation { message: String },

    #[error("启发式规划未收敛: 迭代 {iterations} 次, 变换 {transformations} 次")]
    ConvergenceFailure {
        iterations: usize,
        transformations: usize,
    },

    #[error("无效的物理属性集: {0}")]
    InvalidTraitSet(String),

    #[error("行类型不一致: 期望 {expected}, 实际 {actual}")]
    RowTypeMismatch { expected: RowType, actual: RowType },

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl PlanningError {
    pub fn rule_execution(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleExecution {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn no_physical_plan(set: usize, traits: TraitSet) -> Self {
        Self::NoPhysicalPlan { set, traits }
    }

    pub fn cost_model_violation(message: impl Into<String>) -> Self {
        Self::CostModelViolation {
            message: message.into(),
        }
    }

    pub fn invalid_trait_set(message: impl Into<String>) -> Self {
        Self::InvalidTraitSet(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// 是否属于警告级别（调用方可自行决定是否忽略）
    pub fn is_warning(&self) -> bool {
        matches!(self, PlanningError::ConvergenceFailure { .. })
    }
}

impl From<toml::de::Error> for PlanningError {
    fn from(e: toml::de::Error) -> Self {
        PlanningError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for PlanningError {
    fn from(e: toml::ser::Error) -> Self {
        PlanningError::Config(e.to_string())
    }
}

/// 规划结果类型
pub type PlanningResult<T> = Result<T, PlanningError>;

/// 规则执行错误
///
/// 规则的 `on_match` 返回此错误时，整个规划会话立即终止，不做重试。
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct RuleError {
    pub message: String,
}

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// 附加规则名称，转换为规划错误
    pub fn into_planning_error(self, rule: &str) -> PlanningError {
        PlanningError::rule_execution(rule, self.message)
    }
}
