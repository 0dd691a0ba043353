//! 重写图
//!
//! 启发式重写在一张顶点图上进行：每个顶点保存一个当前节点，节点的输入全部是指向
//! 其他顶点的句柄。重写时用新顶点替换旧顶点，把旧顶点的父节点改为引用新顶点。
//! 允许共享时，摘要相同的子树只建一个顶点，计划成为有向无环图。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::error::{PlanningError, PlanningResult};
use crate::query::optimizer::pattern::InputResolver;
use crate::query::planner::plan::{PlanNode, PlanRef, VertexId};

use super::program::MatchOrder;

#[derive(Debug, Clone)]
struct GraphVertex {
    node: PlanRef,
    parents: Vec<VertexId>,
    alive: bool,
}

#[derive(Debug)]
pub struct PlanGraph {
    vertices: Vec<GraphVertex>,
    digests: HashMap<String, VertexId>,
    root: VertexId,
    allow_dag: bool,
    epoch: u64,
}

impl PlanGraph {
    /// 把计划树装入图中
    pub fn build(plan: &PlanRef, allow_dag: bool) -> Self {
        let mut graph = Self {
            vertices: Vec::new(),
            digests: HashMap::new(),
            root: VertexId(0),
            allow_dag,
            epoch: 0,
        };
        graph.root = graph.add_node(plan);
        graph
    }

    pub fn root(&self) -> VertexId {
        self.root
    }

    pub fn node(&self, id: VertexId) -> &PlanRef {
        &self.vertices[id.index()].node
    }

    pub fn is_alive(&self, id: VertexId) -> bool {
        self.vertices[id.index()].alive
    }

    /// 每新增一个顶点递增
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.iter().filter(|v| v.alive).count()
    }

    /// 指向顶点的句柄节点
    pub fn handle(&self, id: VertexId) -> PlanRef {
        let node = self.node(id);
        PlanNode::vertex(id, node.traits().clone(), node.row_type().clone())
    }

    /// 登记节点及其全部输入，返回节点所在的顶点
    ///
    /// 顶点句柄直接返回其编号；允许共享时，摘要与现存顶点相同的节点复用该顶点。
    pub fn add_node(&mut self, node: &PlanRef) -> VertexId {
        if let Some(id) = node.vertex_id() {
            return id;
        }
        let children: Vec<VertexId> = node.inputs().iter().map(|i| self.add_node(i)).collect();
        let canonical = if children.is_empty() {
            node.clone()
        } else {
            node.with_inputs(children.iter().map(|c| self.handle(*c)).collect())
        };

        if self.allow_dag {
            if let Some(&id) = self.digests.get(canonical.digest()) {
                if self.is_alive(id) {
                    return id;
                }
            }
        }

        let id = VertexId(self.vertices.len());
        self.digests.insert(canonical.digest().to_string(), id);
        self.vertices.push(GraphVertex {
            node: canonical,
            parents: Vec::new(),
            alive: true,
        });
        for child in children {
            self.add_parent(child, id);
        }
        self.epoch += 1;
        id
    }

    fn add_parent(&mut self, child: VertexId, parent: VertexId) {
        let parents = &mut self.vertices[child.index()].parents;
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    fn children(&self, id: VertexId) -> Vec<VertexId> {
        self.node(id)
            .inputs()
            .iter()
            .filter_map(|i| i.vertex_id())
            .collect()
    }

    fn distinct_children(&self, id: VertexId) -> Vec<VertexId> {
        let mut distinct = Vec::new();
        for child in self.children(id) {
            if !distinct.contains(&child) {
                distinct.push(child);
            }
        }
        distinct
    }

    /// 用 `new` 替换 `old`：父节点改为引用 `new`，`old` 失效
    pub fn replace(&mut self, old: VertexId, new: VertexId) {
        if old == new {
            return;
        }
        let parents = std::mem::take(&mut self.vertices[old.index()].parents);
        for parent in parents {
            if !self.is_alive(parent) || parent == new {
                continue;
            }
            let node = self.node(parent).clone();
            let inputs = node
                .inputs()
                .iter()
                .map(|i| {
                    if i.vertex_id() == Some(old) {
                        self.handle(new)
                    } else {
                        i.clone()
                    }
                })
                .collect();
            let updated = node.with_inputs(inputs);
            self.forget_digest(node.digest(), parent);
            self.digests
                .entry(updated.digest().to_string())
                .or_insert(parent);
            self.vertices[parent.index()].node = updated;
            self.add_parent(new, parent);
        }
        if self.root == old {
            self.root = new;
        }
        self.kill(old);
        self.collect_garbage(old);
    }

    fn kill(&mut self, id: VertexId) {
        let digest = self.node(id).digest().to_string();
        self.forget_digest(&digest, id);
        self.vertices[id.index()].alive = false;
    }

    /// 失效顶点的子顶点如果不再有存活的父节点（且不是根），一并失效
    fn collect_garbage(&mut self, dead: VertexId) {
        let mut stack = vec![dead];
        while let Some(id) = stack.pop() {
            for child in self.distinct_children(id) {
                self.vertices[child.index()].parents.retain(|p| *p != id);
                let orphan = !self.vertices[child.index()]
                    .parents
                    .iter()
                    .any(|p| self.vertices[p.index()].alive);
                if orphan && child != self.root && self.is_alive(child) {
                    self.kill(child);
                    stack.push(child);
                }
            }
        }
    }

    fn forget_digest(&mut self, digest: &str, id: VertexId) {
        if self.digests.get(digest) == Some(&id) {
            self.digests.remove(digest);
        }
    }

    /// 按遍历顺序列出从根可达的顶点
    pub fn order(&self, order: MatchOrder) -> Vec<VertexId> {
        self.order_from(self.root, order)
    }

    pub fn order_from(&self, start: VertexId, order: MatchOrder) -> Vec<VertexId> {
        match order {
            MatchOrder::Arbitrary | MatchOrder::DepthFirst => self.preorder(start),
            MatchOrder::TopDown => self.topological(start),
            MatchOrder::BottomUp => {
                let mut vertices = self.topological(start);
                vertices.reverse();
                vertices
            }
        }
    }

    fn preorder(&self, start: VertexId) -> Vec<VertexId> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            result.push(id);
            stack.extend(self.children(id).into_iter().rev());
        }
        result
    }

    /// 拓扑序：共享顶点排在它所有（可达的）父节点之后
    fn topological(&self, start: VertexId) -> Vec<VertexId> {
        let reachable = self.preorder(start);
        let mut in_degree: HashMap<VertexId, usize> = reachable.iter().map(|v| (*v, 0)).collect();
        for id in &reachable {
            for child in self.distinct_children(*id) {
                if let Some(degree) = in_degree.get_mut(&child) {
                    *degree += 1;
                }
            }
        }

        let mut result = Vec::with_capacity(reachable.len());
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            result.push(id);
            for child in self.distinct_children(id) {
                if let Some(degree) = in_degree.get_mut(&child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
        result
    }

    /// 展开为与图脱离的计划树，共享顶点展开为同一个子计划
    pub fn to_plan(&self) -> PlanningResult<PlanRef> {
        let mut built = HashMap::new();
        let mut path = Vec::new();
        self.build_plan(self.root, &mut built, &mut path)
    }

    fn build_plan(
        &self,
        id: VertexId,
        built: &mut HashMap<VertexId, PlanRef>,
        path: &mut Vec<VertexId>,
    ) -> PlanningResult<PlanRef> {
        if let Some(plan) = built.get(&id) {
            return Ok(plan.clone());
        }
        if path.contains(&id) {
            return Err(PlanningError::internal(format!("重写图中存在环: 顶点 {}", id)));
        }
        let node = self.node(id).clone();
        let plan = if node.is_leaf() {
            node
        } else {
            path.push(id);
            let mut inputs = Vec::with_capacity(node.inputs().len());
            for input in node.inputs() {
                let resolved = match input.vertex_id() {
                    Some(child) => self.build_plan(child, built, path)?,
                    None => input.clone(),
                };
                inputs.push(resolved);
            }
            path.pop();
            node.with_inputs(inputs)
        };
        built.insert(id, plan.clone());
        Ok(plan)
    }
}

impl InputResolver for PlanGraph {
    fn candidates(&self, input: &PlanRef) -> Vec<PlanRef> {
        match input.vertex_id() {
            Some(id) => vec![self.node(id).clone()],
            None => vec![input.clone()],
        }
    }
}
