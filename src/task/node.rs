//! Task node state
//!
//! A node is addressed by `TaskId`. Parents own their children's ids; a child
//! keeps only its parent's id for routing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Stable task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Node lifecycle: `Pending -> Active -> {Completed | Failed | Aborted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Aborted,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// Transitions only move forward; terminal states are final
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Active) => true,
            (Self::Pending | Self::Active, s) if s.is_terminal() => true,
            _ => false,
        }
    }
}

/// What an artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Text,
    Json,
    File,
    Trace,
}

/// A named output stored on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub value: Value,
    pub description: String,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn new(value: Value, description: &str, kind: ArtifactKind) -> Self {
        Self {
            value,
            description: description.to_string(),
            kind,
        }
    }
}

/// One line of a node's conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: String,
    pub content: String,
    pub timestamp: i64,
}

/// A unit of execution in the task tree
#[derive(Debug, Clone, Serialize)]
pub struct TaskNode {
    pub id: TaskId,
    pub description: String,
    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,
    pub status: TaskStatus,
    pub artifacts: HashMap<String, Artifact>,
    conversation: Vec<ConversationEntry>,
    pub strategy: String,
    /// Set once the parent has been told about the terminal state
    #[serde(skip)]
    pub(crate) parent_notified: bool,
}

impl TaskNode {
    pub fn new(description: &str, parent: Option<TaskId>, strategy: &str) -> Self {
        Self {
            id: TaskId::new(),
            description: description.to_string(),
            parent,
            children: Vec::new(),
            status: TaskStatus::Pending,
            artifacts: HashMap::new(),
            conversation: Vec::new(),
            strategy: strategy.to_string(),
            parent_notified: false,
        }
    }

    /// Append to the conversation log
    pub fn log(&mut self, role: &str, content: impl Into<String>) {
        self.conversation.push(ConversationEntry {
            role: role.to_string(),
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp(),
        });
    }

    pub fn conversation(&self) -> &[ConversationEntry] {
        &self.conversation
    }

    /// Apply a status change if the lifecycle allows it
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}
