//! Goal records
//!
//! Goals live in an arena keyed by [`GoalId`] and refer to their parent and
//! children by id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::PlannerError;

/// Stable arena key of a goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalId(pub(crate) u64);

impl GoalId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// What kind of work a goal represents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Achieved only through its decomposition
    Composite,
    /// Run a registered tool
    UseTool {
        tool: String,
        #[serde(default)]
        args: Value,
    },
    /// Ask for a fact and wait for it to arrive as evidence
    GatherInfo {
        key: String,
        #[serde(default)]
        prompt: Option<String>,
    },
    /// Achieved as soon as it runs
    Execute,
    /// Anything this planner cannot run
    #[serde(other)]
    Unknown,
}

impl Predicate {
    pub fn use_tool(tool: &str, args: Value) -> Self {
        Self::UseTool {
            tool: tool.to_string(),
            args,
        }
    }

    pub fn gather_info(key: &str, prompt: Option<&str>) -> Self {
        Self::GatherInfo {
            key: key.to_string(),
            prompt: prompt.map(String::from),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Composite => "composite",
            Self::UseTool { .. } => "use_tool",
            Self::GatherInfo { .. } => "gather_info",
            Self::Execute => "execute",
            Self::Unknown => "unknown",
        }
    }
}

/// One completion condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Evidence under `key` is present
    HasEvidence { key: String },
    /// The oracle judges `predicate` true over the goal's evidence
    PredicateTrue { predicate: String },
}

impl Condition {
    pub fn has_evidence(key: &str) -> Self {
        Self::HasEvidence {
            key: key.to_string(),
        }
    }

    pub fn predicate_true(predicate: &str) -> Self {
        Self::PredicateTrue {
            predicate: predicate.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    Active,
    Blocked,
    Achieved,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Achieved => "achieved",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Achieved | Self::Abandoned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecompositionKind {
    /// Every child must be achieved
    And,
    /// One achieved child is enough
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    pub kind: DecompositionKind,
    pub children: Vec<GoalId>,
}

/// A unit of intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub gloss: String,
    pub predicate: Predicate,
    pub parent: Option<GoalId>,
    /// Set once, on expansion
    pub decomposition: Option<Decomposition>,
    pub status: GoalStatus,
    pub done_when: Vec<Condition>,
    pub evidence: HashMap<String, Value>,
    pub provenance: Value,
    pub context: Value,
    /// Why a leaf goal is blocked, e.g. a missing tool
    pub blocked_reason: Option<String>,
    /// A `gather_info` goal has emitted its question
    pub question_asked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn has_evidence(&self, key: &str) -> bool {
        self.evidence.contains_key(key)
    }

    pub fn is_decomposed(&self) -> bool {
        self.decomposition.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Terminal statuses are final; returns `false` if the change was refused.
    pub(crate) fn set_status(&mut self, status: GoalStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if self.status != status {
            self.status = status;
            self.touch();
        }
        true
    }
}

/// Arguments of [`GoalLedger::create_goal`](super::GoalLedger::create_goal)
#[derive(Debug, Clone)]
pub struct GoalSpec {
    pub gloss: String,
    pub predicate: Predicate,
    pub parent: Option<GoalId>,
    pub done_when: Vec<Condition>,
    pub evidence: HashMap<String, Value>,
    pub provenance: Value,
    pub context: Value,
}

impl GoalSpec {
    pub fn new(gloss: &str, predicate: Predicate) -> Self {
        Self {
            gloss: gloss.to_string(),
            predicate,
            parent: None,
            done_when: Vec::new(),
            evidence: HashMap::new(),
            provenance: Value::Null,
            context: Value::Null,
        }
    }

    pub fn with_parent(mut self, parent: GoalId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn done_when(mut self, condition: Condition) -> Self {
        self.done_when.push(condition);
        self
    }

    pub fn with_evidence(mut self, key: &str, value: Value) -> Self {
        self.evidence.insert(key.to_string(), value);
        self
    }

    pub fn with_provenance(mut self, provenance: Value) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Evidence arriving from outside the planner, checked before it reaches the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceUpdate {
    pub goal: GoalId,
    pub key: String,
    pub value: Value,
}

impl EvidenceUpdate {
    /// Parse `{goal, key, value}`; the key must be non-blank
    pub fn from_payload(payload: &Value) -> Result<Self, PlannerError> {
        let update: Self = serde_json::from_value(payload.clone())
            .map_err(|e| PlannerError::InvalidEvidence(e.to_string()))?;
        if update.key.trim().is_empty() {
            return Err(PlannerError::InvalidEvidence("empty key".to_string()));
        }
        Ok(update)
    }
}
