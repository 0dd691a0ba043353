//! 核心类型模块
//! 提供优化器所需的核心数据类型：代价、代价模型、统计信息和物理属性

pub mod cost;
pub mod cost_model;
pub mod phase;
pub mod stats;
pub mod traits;

pub use cost::{Cost, CostFactory, DefaultCostFactory, COST_EPSILON};
pub use cost_model::{CostModel, CostModelConfig, DefaultCostModel};
pub use phase::OptimizationPhase;
pub use stats::Statistics;
pub use traits::{
    Collation, CollationTraitDef, Convention, ConventionTraitDef, Direction, Distribution,
    DistributionTraitDef, FieldCollation, NamedTraitDef, Trait, TraitDef, TraitDefRegistry,
    TraitSet, COLLATION_DEF, CONVENTION_DEF, DISTRIBUTION_DEF,
};
