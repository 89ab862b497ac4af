//! Error types
//!
//! `AgentError` is what strategies, the planner and tools hand to the
//! recovery engine. The remaining enums cover the dispatcher, the goal
//! ledger and the shared execution-state stores.

use thiserror::Error;

/// Failures that flow into error recovery
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// A task-level failure (bad tool call, missing tool, unmet condition)
    #[error("{message}")]
    Task {
        message: String,
        retryable: Option<bool>,
    },

    /// An external resource failed (network, filesystem, upstream API)
    #[error("{message}")]
    Resource {
        message: String,
        retryable: Option<bool>,
    },

    /// The bound strategy gave up; a different strategy may succeed
    #[error("{strategy}: {message}")]
    Strategy { strategy: String, message: String },

    /// Planning defect (bad decomposition, abandoned goal, cycles)
    #[error("{message}")]
    Planning { message: String },

    /// Host-level failure
    #[error("{message}")]
    System { message: String },
}

impl AgentError {
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
            retryable: None,
        }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
            retryable: None,
        }
    }

    pub fn strategy(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    pub fn planning(message: impl Into<String>) -> Self {
        Self::Planning {
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Assert (or deny) that retrying this error can help.
    ///
    /// Only `Task` and `Resource` errors carry the assertion; other variants
    /// are returned unchanged.
    pub fn with_retryable(mut self, value: bool) -> Self {
        match &mut self {
            Self::Task { retryable, .. } | Self::Resource { retryable, .. } => {
                *retryable = Some(value);
            }
            _ => {}
        }
        self
    }

    /// Error-supplied retryability, when the producer stated one
    pub fn is_retryable(&self) -> Option<bool> {
        match self {
            Self::Task { retryable, .. } | Self::Resource { retryable, .. } => *retryable,
            _ => None,
        }
    }

    /// Short name of the error family
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Task { .. } => "task",
            Self::Resource { .. } => "resource",
            Self::Strategy { .. } => "strategy",
            Self::Planning { .. } => "planning",
            Self::System { .. } => "system",
        }
    }

    /// Message text without the strategy prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Task { message, .. }
            | Self::Resource { message, .. }
            | Self::Strategy { message, .. }
            | Self::Planning { message }
            | Self::System { message } => message,
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AgentError>() {
            Ok(agent) => agent,
            Err(other) => Self::System {
                message: other.to_string(),
            },
        }
    }
}

/// Message routing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Mailbox closed for task {0}")]
    MailboxClosed(String),
}

/// Goal ledger misuse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
    #[error("Goal not found: {0}")]
    UnknownGoal(String),

    #[error("Goal {0} is already on the stack")]
    AlreadyStacked(String),

    #[error("Goal {0} is already decomposed")]
    AlreadyDecomposed(String),

    #[error("Invalid evidence: {0}")]
    InvalidEvidence(String),
}

impl From<PlannerError> for AgentError {
    fn from(err: PlannerError) -> Self {
        Self::planning(err.to_string())
    }
}

/// Errors from the shared execution-state stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid state payload: {0}")]
    InvalidState(#[from] serde_json::Error),
}
