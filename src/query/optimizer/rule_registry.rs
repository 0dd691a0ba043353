//! 规则注册表
//!
//! 每个规划会话显式持有一个注册表，不存在进程级的全局规则状态。
//! 规则按注册顺序保存，并带有所属的优化阶段。

use log::debug;
use regex::Regex;

use crate::query::optimizer::core::OptimizationPhase;
use crate::query::optimizer::rule_traits::RuleRef;
use crate::query::planner::plan::PlanNode;

#[derive(Clone)]
struct RuleEntry {
    rule: RuleRef,
    phase: OptimizationPhase,
}

#[derive(Clone, Default)]
pub struct RuleRegistry {
    entries: Vec<RuleEntry>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.rule.name(), e.phase)))
            .finish()
    }
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从规则列表构造，全部归入 `Optimize` 阶段
    pub fn from_rules(rules: Vec<RuleRef>) -> Self {
        let mut registry = Self::new();
        for rule in rules {
            registry.register(rule);
        }
        registry
    }

    /// 注册到 `Optimize` 阶段；同名规则已存在时返回 false
    pub fn register(&mut self, rule: RuleRef) -> bool {
        self.register_in_phase(rule, OptimizationPhase::Optimize)
    }

    pub fn register_in_phase(&mut self, rule: RuleRef, phase: OptimizationPhase) -> bool {
        if self.get(rule.name()).is_some() {
            debug!("规则 {} 已注册，忽略重复注册", rule.name());
            return false;
        }
        self.entries.push(RuleEntry { rule, phase });
        true
    }

    /// 注销规则，返回被移除的规则
    pub fn unregister(&mut self, name: &str) -> Option<RuleRef> {
        let pos = self.entries.iter().position(|e| e.rule.name() == name)?;
        Some(self.entries.remove(pos).rule)
    }

    pub fn rules(&self) -> Vec<RuleRef> {
        self.entries.iter().map(|e| e.rule.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<RuleRef> {
        self.entries
            .iter()
            .find(|e| e.rule.name() == name)
            .map(|e| e.rule.clone())
    }

    pub fn phase_of(&self, name: &str) -> Option<OptimizationPhase> {
        self.entries
            .iter()
            .find(|e| e.rule.name() == name)
            .map(|e| e.phase)
    }

    pub fn rules_in_phase(&self, phase: OptimizationPhase) -> Vec<RuleRef> {
        self.entries
            .iter()
            .filter(|e| e.phase == phase)
            .map(|e| e.rule.clone())
            .collect()
    }

    /// 名称匹配正则表达式的规则
    pub fn rules_matching(&self, pattern: &Regex) -> Vec<RuleRef> {
        self.entries
            .iter()
            .filter(|e| pattern.is_match(e.rule.name()))
            .map(|e| e.rule.clone())
            .collect()
    }

    /// 根操作数能接受 `node` 的规则（按注册顺序）及其阶段
    pub fn rules_for_root(&self, node: &PlanNode) -> Vec<(RuleRef, OptimizationPhase)> {
        self.entries
            .iter()
            .filter(|e| e.rule.operand().accepts(node))
            .map(|e| (e.rule.clone(), e.phase))
            .collect()
    }

    /// 所有规则操作数树的最大深度
    pub fn max_operand_depth(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.rule.operand().depth())
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
