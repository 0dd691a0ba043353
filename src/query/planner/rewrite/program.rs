//! 重写程序
//!
//! 程序是一串有序指令：选择规则、设置遍历顺序与匹配上限、把若干规则组成一组同时应用，
//! 以及嵌套的子程序（反复执行直到不再产生变换）。

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::{PlanningError, PlanningResult};
use crate::query::optimizer::rule_traits::RuleRef;

/// 顶点的遍历顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchOrder {
    /// 深度优先先序；变换后在新顶点处继续
    #[default]
    Arbitrary,
    /// 深度优先先序；变换后先处理新顶点的整棵子树
    DepthFirst,
    /// 父节点先于子节点
    TopDown,
    /// 子节点先于父节点
    BottomUp,
}

impl fmt::Display for MatchOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchOrder::Arbitrary => "ARBITRARY",
            MatchOrder::DepthFirst => "DEPTH_FIRST",
            MatchOrder::TopDown => "TOP_DOWN",
            MatchOrder::BottomUp => "BOTTOM_UP",
        };
        write!(f, "{}", name)
    }
}

/// 程序指令
#[derive(Clone)]
pub enum Instruction {
    RuleInstance(RuleRef),
    RuleCollection(Vec<RuleRef>),
    /// 按名称在重写器的规则注册表中查找
    RuleByName(String),
    /// 注册表中名称匹配正则表达式的所有规则
    RulesMatching(Regex),
    MatchOrder(MatchOrder),
    MatchLimit(usize),
    BeginGroup,
    EndGroup,
    Subprogram(Program),
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::RuleInstance(rule) => write!(f, "RuleInstance({})", rule.name()),
            Instruction::RuleCollection(rules) => {
                let names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
                write!(f, "RuleCollection({:?})", names)
            }
            Instruction::RuleByName(name) => write!(f, "RuleByName({})", name),
            Instruction::RulesMatching(regex) => write!(f, "RulesMatching({})", regex.as_str()),
            Instruction::MatchOrder(order) => write!(f, "MatchOrder({})", order),
            Instruction::MatchLimit(limit) => write!(f, "MatchLimit({})", limit),
            Instruction::BeginGroup => write!(f, "BeginGroup"),
            Instruction::EndGroup => write!(f, "EndGroup"),
            Instruction::Subprogram(program) => write!(f, "Subprogram({:?})", program.instructions),
        }
    }
}

/// 重写程序
#[derive(Debug, Clone, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn builder() -> ProgramBuilder {
        ProgramBuilder::new()
    }

    /// 只包含一组规则的程序
    pub fn of_rules(rules: Vec<RuleRef>) -> Self {
        Self {
            instructions: vec![Instruction::RuleCollection(rules)],
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
    group_depth: usize,
    error: Option<String>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule_instance(mut self, rule: RuleRef) -> Self {
        self.instructions.push(Instruction::RuleInstance(rule));
        self
    }

    pub fn add_rule_collection(mut self, rules: Vec<RuleRef>) -> Self {
        self.instructions.push(Instruction::RuleCollection(rules));
        self
    }

    pub fn add_rule_by_name(mut self, name: impl Into<String>) -> Self {
        self.instructions.push(Instruction::RuleByName(name.into()));
        self
    }

    /// 正则表达式非法时在 `build` 中报告
    pub fn add_rules_matching(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => self.instructions.push(Instruction::RulesMatching(regex)),
            Err(e) => {
                self.error.get_or_insert_with(|| format!("规则名称模式 {} 无效: {}", pattern, e));
            }
        }
        self
    }

    pub fn add_match_order(mut self, order: MatchOrder) -> Self {
        self.instructions.push(Instruction::MatchOrder(order));
        self
    }

    pub fn add_match_limit(mut self, limit: usize) -> Self {
        self.instructions.push(Instruction::MatchLimit(limit));
        self
    }

    pub fn add_group_begin(mut self) -> Self {
        if self.group_depth > 0 {
            self.error.get_or_insert_with(|| "规则分组不能嵌套".to_string());
        }
        self.group_depth += 1;
        self.instructions.push(Instruction::BeginGroup);
        self
    }

    pub fn add_group_end(mut self) -> Self {
        if self.group_depth == 0 {
            self.error.get_or_insert_with(|| "规则分组结束前没有开始".to_string());
        } else {
            self.group_depth -= 1;
        }
        self.instructions.push(Instruction::EndGroup);
        self
    }

    pub fn add_subprogram(mut self, program: Program) -> Self {
        if self.group_depth > 0 {
            self.error.get_or_insert_with(|| "规则分组中不能包含子程序".to_string());
        }
        self.instructions.push(Instruction::Subprogram(program));
        self
    }

    pub fn build(self) -> PlanningResult<Program> {
        if let Some(message) = self.error {
            return Err(PlanningError::Config(message));
        }
        if self.group_depth != 0 {
            return Err(PlanningError::Config("规则分组没有结束".to_string()));
        }
        Ok(Program {
            instructions: self.instructions,
        })
    }
}
