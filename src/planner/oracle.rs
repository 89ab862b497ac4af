//! Planning oracle
//!
//! The planner's view of whatever judges predicates and decomposes goals,
//! typically an LLM. Answers are structured and treated as opaque.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::goal::{Condition, DecompositionKind, Goal, Predicate};

/// Answer to "is this predicate satisfied?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub satisfied: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl Verdict {
    pub fn yes(reasoning: &str) -> Self {
        Self {
            satisfied: true,
            reasoning: reasoning.to_string(),
        }
    }

    pub fn no(reasoning: &str) -> Self {
        Self {
            satisfied: false,
            reasoning: reasoning.to_string(),
        }
    }
}

/// One subgoal as proposed by the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgoalSpec {
    pub gloss: String,
    pub predicate: Predicate,
    #[serde(default)]
    pub done_when: Vec<Condition>,
    #[serde(default)]
    pub provenance: Value,
}

impl SubgoalSpec {
    pub fn new(gloss: &str, predicate: Predicate) -> Self {
        Self {
            gloss: gloss.to_string(),
            predicate,
            done_when: Vec::new(),
            provenance: Value::Null,
        }
    }

    pub fn done_when(mut self, condition: Condition) -> Self {
        self.done_when.push(condition);
        self
    }
}

/// How a composite goal splits, in declared execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionPlan {
    pub kind: DecompositionKind,
    pub subgoals: Vec<SubgoalSpec>,
}

#[async_trait]
pub trait PlanningOracle: Send + Sync {
    /// Judge `predicate` against a goal's evidence and context
    async fn evaluate(
        &self,
        predicate: &str,
        evidence: &HashMap<String, Value>,
        context: &Value,
    ) -> Result<Verdict>;

    /// Split a composite goal into ordered subgoals
    async fn decompose(&self, goal: &Goal) -> Result<DecompositionPlan>;

    /// Question to ask for a `gather_info` goal
    async fn formulate_question(
        &self,
        goal: &Goal,
        key: &str,
        prompt: Option<&str>,
    ) -> Result<String> {
        Ok(match prompt {
            Some(prompt) => prompt.to_string(),
            None => format!("Please provide '{}' for: {}", key, goal.gloss),
        })
    }
}
