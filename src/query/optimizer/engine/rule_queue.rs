//! 规则队列
//!
//! 每个优化阶段一个先进先出队列，按阶段顺序消费。
//! - 同一 (规则, 成员) 在队列中至多出现一次
//! - 已经结束的阶段不再接收新的匹配任务
//! - 已触发过的 (规则, 绑定成员列表) 不会再次触发

use std::collections::{HashSet, VecDeque};

use log::debug;

use crate::query::optimizer::core::OptimizationPhase;
use crate::query::optimizer::plan::MemberId;
use crate::query::optimizer::rule_traits::RuleRef;

/// 待执行的匹配任务：以某个成员为根尝试匹配规则
#[derive(Clone)]
pub struct RuleMatch {
    pub rule: RuleRef,
    pub member: MemberId,
}

impl std::fmt::Debug for RuleMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@rel#{}", self.rule.name(), self.member)
    }
}

#[derive(Debug, Default)]
pub struct RuleQueue {
    queues: [VecDeque<RuleMatch>; 3],
    pending: HashSet<(String, MemberId)>,
    fired: HashSet<(String, Vec<MemberId>)>,
    current: usize,
}

impl RuleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_phase(&self) -> OptimizationPhase {
        OptimizationPhase::ALL[self.current]
    }

    /// 加入匹配任务，被丢弃或重复时返回 false
    pub fn add(&mut self, rule: RuleRef, phase: OptimizationPhase, member: MemberId) -> bool {
        if phase.index() < self.current {
            return false;
        }
        let key = (rule.name().to_string(), member);
        if !self.pending.insert(key) {
            return false;
        }
        self.queues[phase.index()].push_back(RuleMatch { rule, member });
        true
    }

    /// 取出下一个任务；当前阶段为空时进入下一阶段
    pub fn pop(&mut self) -> Option<RuleMatch> {
        loop {
            if let Some(task) = self.queues[self.current].pop_front() {
                self.pending.remove(&(task.rule.name().to_string(), task.member));
                return Some(task);
            }
            if self.current + 1 >= self.queues.len() {
                return None;
            }
            self.current += 1;
            debug!("规则队列进入阶段 {}", self.current_phase());
        }
    }

    /// 记录一次触发，已经触发过时返回 false
    pub fn mark_fired(&mut self, rule: &str, binding: Vec<MemberId>) -> bool {
        self.fired.insert((rule.to_string(), binding))
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }
}
