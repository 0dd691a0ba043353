//! 操作数模式与匹配
//!
//! 规则通过一棵操作数树描述它期望的计划形状：
//! - 种类判断（`KindTest`）：可组合的 Not / And / Or
//! - 可选的物理属性过滤与谓词
//! - 子节点策略：`Any` 不下降、`Leaf` 只匹配无输入节点、`Exact` 按位置逐个匹配、
//!   `Unordered` 每个子操作数匹配任意一个输入
//!
//! 匹配是深度优先的，结果按模式先序排列。输入如何展开为候选节点由 `InputResolver`
//! 决定：普通树上输入本身就是候选；备忘录中句柄展开为等价集里满足物理属性的所有成员；
//! 启发式规划图中顶点展开为顶点的当前节点。

use std::fmt;
use std::sync::Arc;

use crate::query::optimizer::core::TraitSet;
use crate::query::planner::plan::{OperatorKind, PlanNode, PlanRef};

/// 节点种类判断
#[derive(Debug, Clone, PartialEq)]
pub enum KindTest {
    Any,
    Kind(OperatorKind),
    OneOf(Vec<OperatorKind>),
    Not(Box<KindTest>),
    And(Vec<KindTest>),
    Or(Vec<KindTest>),
}

impl KindTest {
    pub fn accepts(&self, kind: OperatorKind) -> bool {
        match self {
            KindTest::Any => true,
            KindTest::Kind(k) => *k == kind,
            KindTest::OneOf(kinds) => kinds.contains(&kind),
            KindTest::Not(inner) => !inner.accepts(kind),
            KindTest::And(tests) => tests.iter().all(|t| t.accepts(kind)),
            KindTest::Or(tests) => tests.iter().any(|t| t.accepts(kind)),
        }
    }
}

/// 子节点策略
#[derive(Debug, Clone)]
pub enum ChildPolicy {
    /// 不关心子节点，不下降
    Any,
    /// 只匹配没有输入的节点
    Leaf,
    /// 输入个数必须等于子操作数个数，逐个匹配
    Exact(Vec<Operand>),
    /// 每个子操作数至少匹配一个输入
    Unordered(Vec<Operand>),
}

pub type NodePredicate = Arc<dyn Fn(&PlanNode) -> bool + Send + Sync>;

/// 操作数
#[derive(Clone)]
pub struct Operand {
    kind: KindTest,
    traits: Option<TraitSet>,
    predicate: Option<NodePredicate>,
    children: ChildPolicy,
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operand")
            .field("kind", &self.kind)
            .field("traits", &self.traits)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .field("children", &self.children)
            .finish()
    }
}

impl Operand {
    pub fn new(kind: KindTest) -> Self {
        Self {
            kind,
            traits: None,
            predicate: None,
            children: ChildPolicy::Any,
        }
    }

    /// 匹配指定种类的节点
    pub fn of(kind: OperatorKind) -> Self {
        Self::new(KindTest::Kind(kind))
    }

    /// 匹配多个种类中的任意一个
    pub fn one_of(kinds: Vec<OperatorKind>) -> Self {
        Self::new(KindTest::OneOf(kinds))
    }

    /// 匹配任意节点
    pub fn any_node() -> Self {
        Self::new(KindTest::Any)
    }

    pub fn any(mut self) -> Self {
        self.children = ChildPolicy::Any;
        self
    }

    pub fn leaf(mut self) -> Self {
        self.children = ChildPolicy::Leaf;
        self
    }

    pub fn exact(mut self, children: Vec<Operand>) -> Self {
        self.children = ChildPolicy::Exact(children);
        self
    }

    pub fn unordered(mut self, children: Vec<Operand>) -> Self {
        self.children = ChildPolicy::Unordered(children);
        self
    }

    /// 要求节点的物理属性集满足 `traits`
    pub fn with_traits(mut self, traits: TraitSet) -> Self {
        self.traits = Some(traits);
        self
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PlanNode) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn kind_test(&self) -> &KindTest {
        &self.kind
    }

    pub fn children(&self) -> &ChildPolicy {
        &self.children
    }

    /// 只检查当前节点（种类、物理属性、谓词），不看子节点
    pub fn accepts(&self, node: &PlanNode) -> bool {
        if !self.kind.accepts(node.operator()) {
            return false;
        }
        if let Some(ref traits) = self.traits {
            if !node.traits().satisfies(traits) {
                return false;
            }
        }
        if let Some(ref predicate) = self.predicate {
            if !predicate(node) {
                return false;
            }
        }
        true
    }

    /// 操作数树的深度（单个操作数为 1）
    pub fn depth(&self) -> usize {
        match &self.children {
            ChildPolicy::Any | ChildPolicy::Leaf => 1,
            ChildPolicy::Exact(children) | ChildPolicy::Unordered(children) => {
                1 + children.iter().map(|c| c.depth()).max().unwrap_or(0)
            }
        }
    }

    /// 操作数个数（等于每个绑定列表的长度）
    pub fn operand_count(&self) -> usize {
        match &self.children {
            ChildPolicy::Any | ChildPolicy::Leaf => 1,
            ChildPolicy::Exact(children) | ChildPolicy::Unordered(children) => {
                1 + children.iter().map(|c| c.operand_count()).sum::<usize>()
            }
        }
    }
}

/// 输入展开
pub trait InputResolver {
    /// 返回输入对应的候选节点，顺序必须确定
    fn candidates(&self, input: &PlanRef) -> Vec<PlanRef>;
}

/// 普通树：输入本身就是唯一候选
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeResolver;

impl InputResolver for TreeResolver {
    fn candidates(&self, input: &PlanRef) -> Vec<PlanRef> {
        vec![input.clone()]
    }
}

/// 计算以 `node` 为根的所有绑定
///
/// 每个绑定是按模式先序排列的节点列表；没有匹配时返回空列表。
pub fn match_all(operand: &Operand, node: &PlanRef, resolver: &dyn InputResolver) -> Vec<Vec<PlanRef>> {
    if !operand.accepts(node) {
        return Vec::new();
    }
    match &operand.children {
        ChildPolicy::Any => vec![vec![node.clone()]],
        ChildPolicy::Leaf => {
            if node.is_leaf() {
                vec![vec![node.clone()]]
            } else {
                Vec::new()
            }
        }
        ChildPolicy::Exact(children) => {
            if node.inputs().len() != children.len() {
                return Vec::new();
            }
            let mut partials = vec![vec![node.clone()]];
            for (child, input) in children.iter().zip(node.inputs()) {
                let child_bindings = match_input(child, std::slice::from_ref(input), resolver);
                if child_bindings.is_empty() {
                    return Vec::new();
                }
                partials = cartesian(partials, &child_bindings);
            }
            partials
        }
        ChildPolicy::Unordered(children) => {
            let mut partials = vec![vec![node.clone()]];
            for child in children {
                let child_bindings = match_input(child, node.inputs(), resolver);
                if child_bindings.is_empty() {
                    return Vec::new();
                }
                partials = cartesian(partials, &child_bindings);
            }
            partials
        }
    }
}

/// 返回第一个绑定
pub fn match_first(
    operand: &Operand,
    node: &PlanRef,
    resolver: &dyn InputResolver,
) -> Option<Vec<PlanRef>> {
    match_all(operand, node, resolver).into_iter().next()
}

/// 在普通树上匹配
pub fn match_tree(operand: &Operand, node: &PlanRef) -> Option<Vec<PlanRef>> {
    match_first(operand, node, &TreeResolver)
}

fn match_input(
    operand: &Operand,
    inputs: &[PlanRef],
    resolver: &dyn InputResolver,
) -> Vec<Vec<PlanRef>> {
    let mut bindings = Vec::new();
    for input in inputs {
        for candidate in resolver.candidates(input) {
            bindings.extend(match_all(operand, &candidate, resolver));
        }
    }
    bindings
}

fn cartesian(partials: Vec<Vec<PlanRef>>, suffixes: &[Vec<PlanRef>]) -> Vec<Vec<PlanRef>> {
    let mut out = Vec::with_capacity(partials.len() * suffixes.len());
    for prefix in &partials {
        for suffix in suffixes {
            let mut binding = prefix.clone();
            binding.extend(suffix.iter().cloned());
            out.push(binding);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DataType, RowType};
    use crate::query::planner::plan::JoinType;

    fn scan(name: &str) -> PlanRef {
        PlanNode::table_scan(name, RowType::of(&[("id", DataType::Int)]))
    }

    #[test]
    fn test_kind_test_composition() {
        let test = KindTest::And(vec![
            KindTest::Not(Box::new(KindTest::Kind(OperatorKind::Subset))),
            KindTest::Or(vec![
                KindTest::Kind(OperatorKind::Filter),
                KindTest::OneOf(vec![OperatorKind::Project, OperatorKind::Sort]),
            ]),
        ]);
        assert!(test.accepts(OperatorKind::Filter));
        assert!(test.accepts(OperatorKind::Sort));
        assert!(!test.accepts(OperatorKind::Subset));
        assert!(!test.accepts(OperatorKind::Join));
    }

    #[test]
    fn test_exact_binding_in_preorder() {
        let join = PlanNode::join(
            PlanNode::filter(scan("emp"), "$0 > 1"),
            scan("dept"),
            JoinType::Inner,
            "$0 = $1",
        );
        let operand = Operand::of(OperatorKind::Join).exact(vec![
            Operand::of(OperatorKind::Filter).exact(vec![Operand::of(OperatorKind::TableScan).leaf()]),
            Operand::of(OperatorKind::TableScan).leaf(),
        ]);
        let binding = match_tree(&operand, &join).expect("should match");
        let kinds: Vec<OperatorKind> = binding.iter().map(|n| n.operator()).collect();
        assert_eq!(
            kinds,
            vec![
                OperatorKind::Join,
                OperatorKind::Filter,
                OperatorKind::TableScan,
                OperatorKind::TableScan
            ]
        );
        assert_eq!(binding.len(), operand.operand_count());
        assert_eq!(operand.depth(), 3);
    }

    #[test]
    fn test_exact_requires_arity() {
        let filter = PlanNode::filter(scan("emp"), "$0 > 1");
        let two_children = Operand::of(OperatorKind::Filter)
            .exact(vec![Operand::any_node(), Operand::any_node()]);
        assert!(match_tree(&two_children, &filter).is_none());
    }

    #[test]
    fn test_leaf_rejects_inner_nodes() {
        let filter = PlanNode::filter(scan("emp"), "$0 > 1");
        assert!(match_tree(&Operand::any_node().leaf(), &filter).is_none());
        assert!(match_tree(&Operand::any_node().leaf(), &scan("emp")).is_some());
    }

    #[test]
    fn test_unordered_matches_any_input() {
        let join = PlanNode::join(
            scan("emp"),
            PlanNode::filter(scan("dept"), "$0 > 1"),
            JoinType::Inner,
            "$0 = $1",
        );
        let operand = Operand::of(OperatorKind::Join).unordered(vec![Operand::of(OperatorKind::Filter)]);
        let binding = match_tree(&operand, &join).expect("should match");
        assert_eq!(binding.len(), 2);
        assert_eq!(binding[1].operator(), OperatorKind::Filter);
    }

    #[test]
    fn test_trait_filter_and_predicate() {
        let physical = scan("emp").with_traits(TraitSet::of_convention("ENUMERABLE"));
        let operand = Operand::of(OperatorKind::TableScan)
            .with_traits(TraitSet::of_convention("ENUMERABLE"))
            .with_predicate(|node| node.digest().contains("emp"));
        assert!(operand.accepts(&physical));
        assert!(!operand.accepts(&scan("emp")));
        assert!(!operand.accepts(&scan("dept").with_traits(TraitSet::of_convention("ENUMERABLE"))));
    }

    struct Alternatives;

    impl InputResolver for Alternatives {
        fn candidates(&self, input: &PlanRef) -> Vec<PlanRef> {
            vec![input.clone(), input.with_traits(TraitSet::of_convention("ENUMERABLE"))]
        }
    }

    #[test]
    fn test_resolver_expands_cartesian_product() {
        let join = PlanNode::join(scan("emp"), scan("dept"), JoinType::Inner, "$0 = $1");
        let operand = Operand::of(OperatorKind::Join).exact(vec![
            Operand::of(OperatorKind::TableScan),
            Operand::of(OperatorKind::TableScan),
        ]);
        let bindings = match_all(&operand, &join, &Alternatives);
        assert_eq!(bindings.len(), 4);
        assert!(bindings.iter().all(|b| b.len() == 3));
    }
}
