//! 核心模块：错误类型与行类型

pub mod error;
pub mod schema;

pub use error::{PlanningError, PlanningResult, RuleError};
pub use schema::{DataType, Field, RowType, RowTypeRef};
