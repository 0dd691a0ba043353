//! 计划节点定义
//!
//! `PlanNode` 是关系代数树的一个顶点：
//! - 有序的输入列表（子节点本身或规划器内部的句柄）
//! - 行类型（创建后固定）
//! - 物理属性集
//! - 摘要：只由节点种类、属性、物理属性集和输入摘要决定的结构指纹
//!
//! 节点发布后不可变，所有修改操作都返回新节点（写时复制）。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::schema::{RowType, RowTypeRef};
use crate::query::optimizer::core::{Collation, TraitSet};

/// 共享的节点引用
pub type PlanRef = Arc<PlanNode>;

/// 等价集句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetId(pub usize);

impl SetId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 启发式规划器中的顶点句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub usize);

impl VertexId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Full => "full",
            JoinType::Semi => "semi",
            JoinType::Anti => "anti",
        };
        write!(f, "{}", name)
    }
}

/// 节点种类（带属性）
///
/// 封闭的和类型：逻辑算子、物理算子以及规划器内部使用的句柄与转换节点。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // 逻辑算子
    Values {
        row_count: u64,
    },
    TableScan {
        table: String,
    },
    Filter {
        condition: String,
    },
    Project {
        exprs: Vec<String>,
    },
    Join {
        join_type: JoinType,
        condition: String,
    },
    Aggregate {
        group_keys: Vec<usize>,
        aggs: Vec<String>,
    },
    Sort {
        collation: Collation,
    },
    Limit {
        offset: u64,
        fetch: Option<u64>,
    },
    Union {
        all: bool,
    },

    // 物理算子
    IndexScan {
        table: String,
        index: String,
    },
    HashJoin {
        join_type: JoinType,
        condition: String,
    },
    MergeJoin {
        join_type: JoinType,
        condition: String,
    },
    NestedLoopJoin {
        join_type: JoinType,
        condition: String,
    },
    HashAggregate {
        group_keys: Vec<usize>,
        aggs: Vec<String>,
    },
    SortAggregate {
        group_keys: Vec<usize>,
        aggs: Vec<String>,
    },

    // 规划器内部节点
    /// 具体的物理属性转换节点
    Converter,
    /// "需要转换"占位节点，由转换规则替换为具体节点
    AbstractConverter,
    /// 等价集句柄（等价集 + 物理属性集）
    Subset(SetId),
    /// 启发式规划图中的顶点句柄
    Vertex(VertexId),
}

/// 不带属性的节点种类，用于操作数的种类判断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorKind {
    Values,
    TableScan,
    Filter,
    Project,
    Join,
    Aggregate,
    Sort,
    Limit,
    Union,
    IndexScan,
    HashJoin,
    MergeJoin,
    NestedLoopJoin,
    HashAggregate,
    SortAggregate,
    Converter,
    AbstractConverter,
    Subset,
    Vertex,
}

impl OperatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Values => "Values",
            OperatorKind::TableScan => "TableScan",
            OperatorKind::Filter => "Filter",
            OperatorKind::Project => "Project",
            OperatorKind::Join => "Join",
            OperatorKind::Aggregate => "Aggregate",
            OperatorKind::Sort => "Sort",
            OperatorKind::Limit => "Limit",
            OperatorKind::Union => "Union",
            OperatorKind::IndexScan => "IndexScan",
            OperatorKind::HashJoin => "HashJoin",
            OperatorKind::MergeJoin => "MergeJoin",
            OperatorKind::NestedLoopJoin => "NestedLoopJoin",
            OperatorKind::HashAggregate => "HashAggregate",
            OperatorKind::SortAggregate => "SortAggregate",
            OperatorKind::Converter => "Converter",
            OperatorKind::AbstractConverter => "AbstractConverter",
            OperatorKind::Subset => "Subset",
            OperatorKind::Vertex => "Vertex",
        }
    }

    /// 规划器内部的句柄种类
    pub fn is_handle(&self) -> bool {
        matches!(self, OperatorKind::Subset | OperatorKind::Vertex)
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl NodeKind {
    pub fn operator(&self) -> OperatorKind {
        match self {
            NodeKind::Values { .. } => OperatorKind::Values,
            NodeKind::TableScan { .. } => OperatorKind::TableScan,
            NodeKind::Filter { .. } => OperatorKind::Filter,
            NodeKind::Project { .. } => OperatorKind::Project,
            NodeKind::Join { .. } => OperatorKind::Join,
            NodeKind::Aggregate { .. } => OperatorKind::Aggregate,
            NodeKind::Sort { .. } => OperatorKind::Sort,
            NodeKind::Limit { .. } => OperatorKind::Limit,
            NodeKind::Union { .. } => OperatorKind::Union,
            NodeKind::IndexScan { .. } => OperatorKind::IndexScan,
            NodeKind::HashJoin { .. } => OperatorKind::HashJoin,
            NodeKind::MergeJoin { .. } => OperatorKind::MergeJoin,
            NodeKind::NestedLoopJoin { .. } => OperatorKind::NestedLoopJoin,
            NodeKind::HashAggregate { .. } => OperatorKind::HashAggregate,
            NodeKind::SortAggregate { .. } => OperatorKind::SortAggregate,
            NodeKind::Converter => OperatorKind::Converter,
            NodeKind::AbstractConverter => OperatorKind::AbstractConverter,
            NodeKind::Subset(_) => OperatorKind::Subset,
            NodeKind::Vertex(_) => OperatorKind::Vertex,
        }
    }

    /// 属性部分的文本，参与摘要计算
    pub fn attributes(&self) -> String {
        match self {
            NodeKind::Values { row_count } => format!("[{}]", row_count),
            NodeKind::TableScan { table } => format!("[{}]", table),
            NodeKind::IndexScan { table, index } => format!("[{}, {}]", table, index),
            NodeKind::Filter { condition } => format!("[{}]", condition),
            NodeKind::Project { exprs } => format!("[{}]", exprs.join(", ")),
            NodeKind::Join {
                join_type,
                condition,
            }
            | NodeKind::HashJoin {
                join_type,
                condition,
            }
            | NodeKind::MergeJoin {
                join_type,
                condition,
            }
            | NodeKind::NestedLoopJoin {
                join_type,
                condition,
            } => format!("[{}, {}]", join_type, condition),
            NodeKind::Aggregate { group_keys, aggs }
            | NodeKind::HashAggregate { group_keys, aggs }
            | NodeKind::SortAggregate { group_keys, aggs } => {
                let keys: Vec<String> = group_keys.iter().map(|k| k.to_string()).collect();
                format!("[{{{}}}, {}]", keys.join(", "), aggs.join(", "))
            }
            NodeKind::Sort { collation } => format!("{}", collation),
            NodeKind::Limit { offset, fetch } => match fetch {
                Some(fetch) => format!("[{}, {}]", offset, fetch),
                None => format!("[{}]", offset),
            },
            NodeKind::Union { all } => {
                if *all {
                    "[all]".to_string()
                } else {
                    "[distinct]".to_string()
                }
            }
            NodeKind::Subset(id) => id.to_string(),
            NodeKind::Vertex(id) => id.to_string(),
            NodeKind::Converter | NodeKind::AbstractConverter => String::new(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator(), self.attributes())
    }
}

/// 计划节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    kind: NodeKind,
    traits: TraitSet,
    row_type: RowTypeRef,
    inputs: Vec<PlanRef>,
    digest: String,
}

impl PlanNode {
    pub fn new(
        kind: NodeKind,
        traits: TraitSet,
        row_type: RowTypeRef,
        inputs: Vec<PlanRef>,
    ) -> PlanRef {
        let digest = Self::compute_digest(&kind, &traits, &inputs);
        Arc::new(Self {
            kind,
            traits,
            row_type,
            inputs,
            digest,
        })
    }

    /// 摘要：`种类[属性].物理属性(输入摘要, ...)`；顶点句柄只由编号决定
    fn compute_digest(kind: &NodeKind, traits: &TraitSet, inputs: &[PlanRef]) -> String {
        if let NodeKind::Vertex(id) = kind {
            return format!("Vertex{}", id);
        }
        let mut digest = format!("{}.{}", kind, traits);
        if !inputs.is_empty() {
            digest.push('(');
            for (i, input) in inputs.iter().enumerate() {
                if i > 0 {
                    digest.push_str(", ");
                }
                digest.push_str(&input.digest);
            }
            digest.push(')');
        }
        digest
    }

    // ==================== 逻辑节点构造 ====================

    pub fn values(row_type: RowType, row_count: u64) -> PlanRef {
        Self::new(
            NodeKind::Values { row_count },
            TraitSet::logical(),
            Arc::new(row_type),
            Vec::new(),
        )
    }

    pub fn table_scan(table: impl Into<String>, row_type: RowType) -> PlanRef {
        Self::new(
            NodeKind::TableScan {
                table: table.into(),
            },
            TraitSet::logical(),
            Arc::new(row_type),
            Vec::new(),
        )
    }

    pub fn filter(input: PlanRef, condition: impl Into<String>) -> PlanRef {
        let row_type = input.row_type.clone();
        Self::new(
            NodeKind::Filter {
                condition: condition.into(),
            },
            TraitSet::logical(),
            row_type,
            vec![input],
        )
    }

    pub fn project(input: PlanRef, exprs: Vec<String>, row_type: RowType) -> PlanRef {
        Self::new(
            NodeKind::Project { exprs },
            TraitSet::logical(),
            Arc::new(row_type),
            vec![input],
        )
    }

    /// 连接的行类型为左右输入行类型的拼接
    pub fn join(
        left: PlanRef,
        right: PlanRef,
        join_type: JoinType,
        condition: impl Into<String>,
    ) -> PlanRef {
        let row_type = match join_type {
            JoinType::Semi | JoinType::Anti => left.row_type.clone(),
            _ => Arc::new(left.row_type.concat(&right.row_type)),
        };
        Self::new(
            NodeKind::Join {
                join_type,
                condition: condition.into(),
            },
            TraitSet::logical(),
            row_type,
            vec![left, right],
        )
    }

    pub fn aggregate(
        input: PlanRef,
        group_keys: Vec<usize>,
        aggs: Vec<String>,
        row_type: RowType,
    ) -> PlanRef {
        Self::new(
            NodeKind::Aggregate { group_keys, aggs },
            TraitSet::logical(),
            Arc::new(row_type),
            vec![input],
        )
    }

    pub fn sort(input: PlanRef, collation: Collation) -> PlanRef {
        let row_type = input.row_type.clone();
        Self::new(
            NodeKind::Sort { collation },
            TraitSet::logical(),
            row_type,
            vec![input],
        )
    }

    pub fn limit(input: PlanRef, offset: u64, fetch: Option<u64>) -> PlanRef {
        let row_type = input.row_type.clone();
        Self::new(
            NodeKind::Limit { offset, fetch },
            TraitSet::logical(),
            row_type,
            vec![input],
        )
    }

    /// 并集的行类型取第一个输入的行类型
    pub fn union(inputs: Vec<PlanRef>, all: bool) -> PlanRef {
        let row_type = inputs
            .first()
            .map(|input| input.row_type.clone())
            .unwrap_or_else(|| Arc::new(RowType::empty()));
        Self::new(NodeKind::Union { all }, TraitSet::logical(), row_type, inputs)
    }

    // ==================== 句柄构造 ====================

    pub fn subset(set: SetId, traits: TraitSet, row_type: RowTypeRef) -> PlanRef {
        Self::new(NodeKind::Subset(set), traits, row_type, Vec::new())
    }

    pub fn vertex(id: VertexId, traits: TraitSet, row_type: RowTypeRef) -> PlanRef {
        Self::new(NodeKind::Vertex(id), traits, row_type, Vec::new())
    }

    // ==================== 访问器 ====================

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn operator(&self) -> OperatorKind {
        self.kind.operator()
    }

    pub fn traits(&self) -> &TraitSet {
        &self.traits
    }

    pub fn row_type(&self) -> &RowTypeRef {
        &self.row_type
    }

    pub fn inputs(&self) -> &[PlanRef] {
        &self.inputs
    }

    pub fn input(&self, index: usize) -> Option<&PlanRef> {
        self.inputs.get(index)
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn is_leaf(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn set_id(&self) -> Option<SetId> {
        match self.kind {
            NodeKind::Subset(id) => Some(id),
            _ => None,
        }
    }

    pub fn vertex_id(&self) -> Option<VertexId> {
        match self.kind {
            NodeKind::Vertex(id) => Some(id),
            _ => None,
        }
    }

    // ==================== 写时复制 ====================

    /// 替换输入，返回新节点
    pub fn with_inputs(&self, inputs: Vec<PlanRef>) -> PlanRef {
        Self::new(
            self.kind.clone(),
            self.traits.clone(),
            self.row_type.clone(),
            inputs,
        )
    }

    /// 替换物理属性集，返回新节点
    pub fn with_traits(&self, traits: TraitSet) -> PlanRef {
        Self::new(
            self.kind.clone(),
            traits,
            self.row_type.clone(),
            self.inputs.clone(),
        )
    }

    /// 同时替换种类与物理属性集（常用于逻辑算子到物理算子的实现规则）
    pub fn with_kind(&self, kind: NodeKind, traits: TraitSet) -> PlanRef {
        Self::new(kind, traits, self.row_type.clone(), self.inputs.clone())
    }

    /// 节点数（含自身）
    pub fn tree_size(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&PlanNode> = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.inputs.iter().map(|i| i.as_ref()));
        }
        count
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest)
    }
}
