//! 备忘录模块
//! 等价集、成员、并查集与元数据缓存

pub mod group;
pub mod memo;
pub mod metadata;
pub mod node;
pub mod union_find;

pub use group::{OptGroup, SubsetState};
pub use memo::{Memo, MemoEvents};
pub use metadata::{CacheStats, RowCountCache};
pub use node::{MemberId, OptGroupNode};
pub use union_find::UnionFind;
