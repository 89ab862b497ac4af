//! Messages exchanged between task nodes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node::TaskId;
use crate::recovery::ErrorClass;

/// A fire-and-forget message delivered to a node's strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Begin work (parent/external)
    Start {
        #[serde(default)]
        payload: Value,
    },
    /// Continue or resume work (parent/external, or a self-continuation)
    Work {
        #[serde(default)]
        payload: Value,
    },
    /// Stop now; terminal for the receiver
    Abort { reason: String },
    /// A child finished successfully
    Completed { result: Value },
    /// A child reached a terminal failure
    Failed(FailureReport),
    /// Strategy-specific traffic
    Custom { kind: String, payload: Value },
}

impl Message {
    pub fn start() -> Self {
        Self::Start {
            payload: Value::Null,
        }
    }

    pub fn work() -> Self {
        Self::Work {
            payload: Value::Null,
        }
    }

    pub fn custom(kind: &str, payload: Value) -> Self {
        Self::Custom {
            kind: kind.to_string(),
            payload,
        }
    }

    /// Name used in logs
    pub fn kind(&self) -> &str {
        match self {
            Self::Start { .. } => "start",
            Self::Work { .. } => "work",
            Self::Abort { .. } => "abort",
            Self::Completed { .. } => "completed",
            Self::Failed(_) => "failed",
            Self::Custom { kind, .. } => kind,
        }
    }
}

/// Details carried by a `failed` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Originating error text
    pub error: String,
    /// Human-readable summary from the failing node
    pub message: String,
    /// Classification, when the failure went through recovery
    pub classification: Option<ErrorClass>,
    /// Why recovery declined, e.g. "Maximum recovery attempts exceeded"
    pub reason: Option<String>,
    /// Strategy the parent may retry the work with
    pub fallback_strategy: Option<String>,
}

impl FailureReport {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            classification: None,
            reason: None,
            fallback_strategy: None,
        }
    }
}

/// Where a delivered message came from, relative to the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Sender is a child of the receiver
    Child(TaskId),
    /// Sender is the receiver's parent
    Parent(TaskId),
    /// Anything else: the host, a sibling, or the node's own continuation
    External(Option<TaskId>),
}

impl Origin {
    pub fn is_child(&self) -> bool {
        matches!(self, Self::Child(_))
    }
}
