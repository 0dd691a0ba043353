//! 物理属性（Trait）
//!
//! 表达式满足的物理属性：调用约定、排序、数据分布，以及嵌入方自定义的属性。
//! 属性目录本身由嵌入方通过 `TraitDefRegistry` 提供，核心只依赖 `TraitDef` 接口。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::core::error::{PlanningError, PlanningResult};

pub const CONVENTION_DEF: &str = "convention";
pub const COLLATION_DEF: &str = "collation";
pub const DISTRIBUTION_DEF: &str = "distribution";

/// 自定义属性的通配值
pub const NAMED_WILDCARD: &str = "*";

/// 调用约定
///
/// `None` 表示纯逻辑表达式，不可直接执行；`Any` 是通配约定。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Convention {
    None,
    Any,
    Physical(String),
}

impl Convention {
    pub fn physical(name: impl Into<String>) -> Self {
        Convention::Physical(name.into())
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Convention::None => write!(f, "NONE"),
            Convention::Any => write!(f, "ANY"),
            Convention::Physical(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// 单个字段的排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldCollation {
    pub field: usize,
    pub direction: Direction,
}

impl FieldCollation {
    pub fn asc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }
}

impl fmt::Display for FieldCollation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{}", self.field),
            Direction::Desc => write!(f, "{} DESC", self.field),
        }
    }
}

/// 排序属性：有序的字段排序列表，空列表表示"无排序要求"
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Collation {
    pub fields: Vec<FieldCollation>,
}

impl Collation {
    pub fn new(fields: Vec<FieldCollation>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 前缀满足：已按 [a, b] 排序的数据满足 [a] 的排序要求
    pub fn satisfies(&self, required: &Collation) -> bool {
        required.fields.len() <= self.fields.len()
            && required
                .fields
                .iter()
                .zip(self.fields.iter())
                .all(|(r, s)| r == s)
    }
}

impl fmt::Display for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, "]")
    }
}

/// 数据分布
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Distribution {
    Any,
    Singleton,
    Broadcast,
    RoundRobin,
    Hash(Vec<usize>),
}

impl Distribution {
    pub fn satisfies(&self, required: &Distribution) -> bool {
        matches!(required, Distribution::Any) || self == required
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Any => write!(f, "any"),
            Distribution::Singleton => write!(f, "single"),
            Distribution::Broadcast => write!(f, "broadcast"),
            Distribution::RoundRobin => write!(f, "rr"),
            Distribution::Hash(keys) => {
                write!(f, "hash[")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", key)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// 单个物理属性值
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Trait {
    Convention(Convention),
    Collation(Collation),
    Distribution(Distribution),
    Named { def: String, value: String },
}

impl Trait {
    pub fn convention(name: impl Into<String>) -> Self {
        Trait::Convention(Convention::physical(name))
    }

    pub fn collation(fields: Vec<FieldCollation>) -> Self {
        Trait::Collation(Collation::new(fields))
    }

    pub fn named(def: impl Into<String>, value: impl Into<String>) -> Self {
        Trait::Named {
            def: def.into(),
            value: value.into(),
        }
    }

    /// 所属属性定义的名称
    pub fn def_name(&self) -> &str {
        match self {
            Trait::Convention(_) => CONVENTION_DEF,
            Trait::Collation(_) => COLLATION_DEF,
            Trait::Distribution(_) => DISTRIBUTION_DEF,
            Trait::Named { def, .. } => def,
        }
    }

    /// 通配属性值（对应维度上"无要求"）
    pub fn is_wildcard(&self) -> bool {
        match self {
            Trait::Convention(c) => *c == Convention::Any,
            Trait::Collation(c) => c.is_empty(),
            Trait::Distribution(d) => *d == Distribution::Any,
            Trait::Named { value, .. } => value == NAMED_WILDCARD,
        }
    }

    pub fn satisfies(&self, required: &Trait) -> bool {
        match (self, required) {
            (Trait::Convention(_), Trait::Convention(Convention::Any)) => true,
            (Trait::Convention(own), Trait::Convention(req)) => own == req,
            (Trait::Collation(own), Trait::Collation(req)) => own.satisfies(req),
            (Trait::Distribution(own), Trait::Distribution(req)) => own.satisfies(req),
            (
                Trait::Named { def: d1, value: v1 },
                Trait::Named { def: d2, value: v2 },
            ) => d1 == d2 && (v2 == NAMED_WILDCARD || v1 == v2),
            _ => false,
        }
    }
}

impl fmt::Display for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trait::Convention(c) => write!(f, "{}", c),
            Trait::Collation(c) => write!(f, "{}", c),
            Trait::Distribution(d) => write!(f, "{}", d),
            Trait::Named { def, value } => write!(f, "{}={}", def, value),
        }
    }
}

/// 物理属性集：每个属性定义至多一个值，保持插入顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraitSet {
    traits: Vec<Trait>,
}

impl TraitSet {
    /// 构造属性集；同一属性定义出现多次时保留最后一个
    pub fn new(traits: Vec<Trait>) -> Self {
        let mut set = Self::empty();
        for t in traits {
            set = set.replace(t);
        }
        set
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// 仅包含 `NONE` 约定的逻辑属性集
    pub fn logical() -> Self {
        Self::new(vec![Trait::Convention(Convention::None)])
    }

    pub fn of_convention(name: impl Into<String>) -> Self {
        Self::new(vec![Trait::convention(name)])
    }

    pub fn traits(&self) -> &[Trait] {
        &self.traits
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trait> {
        self.traits.iter()
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    pub fn get(&self, def: &str) -> Option<&Trait> {
        self.traits.iter().find(|t| t.def_name() == def)
    }

    pub fn contains(&self, t: &Trait) -> bool {
        self.traits.contains(t)
    }

    pub fn convention(&self) -> Option<&Convention> {
        match self.get(CONVENTION_DEF) {
            Some(Trait::Convention(c)) => Some(c),
            _ => None,
        }
    }

    pub fn collation(&self) -> Option<&Collation> {
        match self.get(COLLATION_DEF) {
            Some(Trait::Collation(c)) => Some(c),
            _ => None,
        }
    }

    /// 纯逻辑属性集（约定为 `NONE`）不可直接执行
    pub fn is_logical(&self) -> bool {
        matches!(self.convention(), Some(Convention::None))
    }

    /// 替换同一定义下的属性值，不存在时追加
    pub fn replace(&self, t: Trait) -> TraitSet {
        let mut traits = self.traits.clone();
        match traits.iter().position(|x| x.def_name() == t.def_name()) {
            Some(pos) => traits[pos] = t,
            None => traits.push(t),
        }
        TraitSet { traits }
    }

    /// 本属性集是否满足 `required`
    ///
    /// 对 `required` 中的每个属性：本集合中同一定义的值必须满足它；
    /// 本集合缺失该定义时，只有通配要求才算满足。
    pub fn satisfies(&self, required: &TraitSet) -> bool {
        required.traits.iter().all(|req| match self.get(req.def_name()) {
            Some(own) => own.satisfies(req),
            None => req.is_wildcard(),
        })
    }

    /// 与 `required` 不一致的属性定义（按 `required` 的顺序）
    pub fn unsatisfied<'a>(&self, required: &'a TraitSet) -> Vec<&'a Trait> {
        required
            .traits
            .iter()
            .filter(|req| match self.get(req.def_name()) {
                Some(own) => !own.satisfies(req),
                None => !req.is_wildcard(),
            })
            .collect()
    }
}

impl fmt::Display for TraitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.traits.is_empty() {
            return write!(f, "{{}}");
        }
        for (i, t) in self.traits.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}

/// 属性定义
///
/// 描述一个属性维度：默认值、通配值以及两个值之间能否通过转换节点互相转换。
pub trait TraitDef: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn default_trait(&self) -> Trait;

    fn any_trait(&self) -> Trait;

    fn can_convert(&self, from: &Trait, to: &Trait) -> bool;
}

/// 调用约定定义
///
/// 约定之间的转换需要显式登记，`NONE` 约定永远不能作为转换的源或目标。
#[derive(Debug, Clone, Default)]
pub struct ConventionTraitDef {
    conversions: Vec<(Convention, Convention)>,
}

impl ConventionTraitDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversion(mut self, from: Convention, to: Convention) -> Self {
        self.conversions.push((from, to));
        self
    }
}

impl TraitDef for ConventionTraitDef {
    fn name(&self) -> &str {
        CONVENTION_DEF
    }

    fn default_trait(&self) -> Trait {
        Trait::Convention(Convention::None)
    }

    fn any_trait(&self) -> Trait {
        Trait::Convention(Convention::Any)
    }

    fn can_convert(&self, from: &Trait, to: &Trait) -> bool {
        match (from, to) {
            (Trait::Convention(f), Trait::Convention(t)) => {
                if *f == Convention::None || *t == Convention::None {
                    return false;
                }
                f == t
                    || self
                        .conversions
                        .iter()
                        .any(|(cf, ct)| cf == f && ct == t)
            }
            _ => false,
        }
    }
}

/// 排序定义：任意排序都可以通过排序节点得到
#[derive(Debug, Clone, Default)]
pub struct CollationTraitDef;

impl TraitDef for CollationTraitDef {
    fn name(&self) -> &str {
        COLLATION_DEF
    }

    fn default_trait(&self) -> Trait {
        Trait::Collation(Collation::empty())
    }

    fn any_trait(&self) -> Trait {
        Trait::Collation(Collation::empty())
    }

    fn can_convert(&self, from: &Trait, to: &Trait) -> bool {
        matches!((from, to), (Trait::Collation(_), Trait::Collation(_)))
    }
}

/// 分布定义：除 `Any` 以外的分布都可以通过交换节点得到
#[derive(Debug, Clone, Default)]
pub struct DistributionTraitDef;

impl TraitDef for DistributionTraitDef {
    fn name(&self) -> &str {
        DISTRIBUTION_DEF
    }

    fn default_trait(&self) -> Trait {
        Trait::Distribution(Distribution::Any)
    }

    fn any_trait(&self) -> Trait {
        Trait::Distribution(Distribution::Any)
    }

    fn can_convert(&self, from: &Trait, to: &Trait) -> bool {
        match (from, to) {
            (Trait::Distribution(_), Trait::Distribution(t)) => *t != Distribution::Any,
            _ => false,
        }
    }
}

/// 嵌入方自定义的属性定义
#[derive(Debug, Clone)]
pub struct NamedTraitDef {
    name: String,
    default_value: String,
    convertible: bool,
}

impl NamedTraitDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: NAMED_WILDCARD.to_string(),
            convertible: false,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = value.into();
        self
    }

    pub fn convertible(mut self, convertible: bool) -> Self {
        self.convertible = convertible;
        self
    }
}

impl TraitDef for NamedTraitDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_trait(&self) -> Trait {
        Trait::named(self.name.clone(), self.default_value.clone())
    }

    fn any_trait(&self) -> Trait {
        Trait::named(self.name.clone(), NAMED_WILDCARD)
    }

    fn can_convert(&self, from: &Trait, to: &Trait) -> bool {
        self.convertible && from.def_name() == self.name && to.def_name() == self.name
    }
}

/// 属性定义注册表
///
/// 每个规划会话持有一份，顺序决定属性集中各维度的排列顺序。
#[derive(Debug, Clone, Default)]
pub struct TraitDefRegistry {
    defs: Vec<Arc<dyn TraitDef>>,
}

impl TraitDefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只包含调用约定的注册表
    pub fn with_convention() -> Self {
        Self::new().with_def(Arc::new(ConventionTraitDef::new()))
    }

    pub fn with_def(mut self, def: Arc<dyn TraitDef>) -> Self {
        self.register(def);
        self
    }

    /// 注册属性定义，同名定义已存在时返回 false
    pub fn register(&mut self, def: Arc<dyn TraitDef>) -> bool {
        if self.get(def.name()).is_some() {
            return false;
        }
        self.defs.push(def);
        true
    }

    pub fn defs(&self) -> &[Arc<dyn TraitDef>] {
        &self.defs
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TraitDef>> {
        self.defs.iter().find(|d| d.name() == name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn default_trait_set(&self) -> TraitSet {
        TraitSet::new(self.defs.iter().map(|d| d.default_trait()).collect())
    }

    pub fn any_trait_set(&self) -> TraitSet {
        TraitSet::new(self.defs.iter().map(|d| d.any_trait()).collect())
    }

    /// 校验属性集中的每个属性都属于已注册的定义
    pub fn validate(&self, traits: &TraitSet) -> PlanningResult<()> {
        for t in traits.iter() {
            if self.get(t.def_name()).is_none() {
                return Err(PlanningError::invalid_trait_set(format!(
                    "属性 {} 的定义 {} 未注册",
                    t,
                    t.def_name()
                )));
            }
        }
        Ok(())
    }

    /// 两个属性值之间能否转换
    pub fn can_convert(&self, from: &Trait, to: &Trait) -> bool {
        if from.def_name() != to.def_name() {
            return false;
        }
        self.get(to.def_name())
            .map(|def| def.can_convert(from, to))
            .unwrap_or(false)
    }

    /// 根据属性集推断注册表：调用约定总是排在第一位，其余按出现顺序
    pub fn infer_from(traits: &TraitSet) -> Self {
        let mut registry = Self::with_convention();
        for t in traits.iter() {
            let def: Arc<dyn TraitDef> = match t {
                Trait::Convention(_) => continue,
                Trait::Collation(_) => Arc::new(CollationTraitDef),
                Trait::Distribution(_) => Arc::new(DistributionTraitDef),
                Trait::Named { def, .. } => Arc::new(NamedTraitDef::new(def.clone())),
            };
            registry.register(def);
        }
        registry
    }
}
