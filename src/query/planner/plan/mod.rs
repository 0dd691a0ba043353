pub mod explain;
pub mod node;

pub use explain::{explain, explain_json, explain_with_costs, PlanNodeDescription};
pub use node::{JoinType, NodeKind, OperatorKind, PlanNode, PlanRef, SetId, VertexId};
