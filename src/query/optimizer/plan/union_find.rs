//! 并查集
//!
//! 等价集以整数句柄寻址，合并时较小的编号成为代表元，查找时做路径压缩。

#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新建一个单元素集合，返回其编号
    pub fn make_set(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        id
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = id;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// 不做路径压缩的只读查找
    pub fn find_const(&self, id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        root
    }

    /// 合并两个集合，返回 (代表元, 被吸收者)；已在同一集合时返回 None
    pub fn union(&mut self, a: usize, b: usize) -> Option<(usize, usize)> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return None;
        }
        let (keep, absorbed) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[absorbed] = keep;
        Some((keep, absorbed))
    }

    /// 代表元自身（未被合并）的编号
    pub fn is_canonical(&self, id: usize) -> bool {
        self.parent[id] == id
    }
}
