//! Recovery context and state snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::task::{ExecutionState, StateStore, TaskId};

/// What recovery knows about the failing task
#[derive(Clone)]
pub struct RecoveryContext {
    pub task_id: String,
    /// Strategy bound to the task when it failed
    pub strategy: Option<String>,
    /// Opaque domain payload copied into snapshots
    pub metadata: Value,
    pub task_queue: Option<Arc<dyn StateStore>>,
    pub progress_stream: Option<Arc<dyn StateStore>>,
    /// Snapshot and rollback only this task's entries in the stores
    pub task_scoped: bool,
}

impl RecoveryContext {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            strategy: None,
            metadata: Value::Null,
            task_queue: None,
            progress_stream: None,
            task_scoped: false,
        }
    }

    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.strategy = Some(strategy.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_task_queue(mut self, store: Arc<dyn StateStore>) -> Self {
        self.task_queue = Some(store);
        self
    }

    pub fn with_progress_stream(mut self, store: Arc<dyn StateStore>) -> Self {
        self.progress_stream = Some(store);
        self
    }

    /// Attach both stores of a task tree
    pub fn with_execution_state(self, state: &ExecutionState) -> Self {
        let queue: Arc<dyn StateStore> = state.queue.clone();
        let progress: Arc<dyn StateStore> = state.progress.clone();
        self.with_task_queue(queue).with_progress_stream(progress)
    }

    /// Limit snapshot and rollback to the entries of `task_id`
    pub fn scoped_to_task(mut self) -> Self {
        self.task_scoped = true;
        self
    }

    /// Store scope implied by `task_scoped`
    pub fn scope(&self) -> Option<TaskId> {
        self.task_scoped.then(|| TaskId::from(self.task_id.as_str()))
    }

    /// Serializable copy without the store handles
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "task_id": self.task_id,
            "strategy": self.strategy,
            "metadata": self.metadata,
            "task_scoped": self.task_scoped,
        })
    }
}

impl fmt::Debug for RecoveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryContext")
            .field("task_id", &self.task_id)
            .field("strategy", &self.strategy)
            .field("metadata", &self.metadata)
            .field("task_queue", &self.task_queue.is_some())
            .field("progress_stream", &self.progress_stream.is_some())
            .field("task_scoped", &self.task_scoped)
            .finish()
    }
}

/// Immutable capture of shared execution state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub timestamp: DateTime<Utc>,
    pub context: Value,
    pub queue_state: Option<Value>,
    pub progress_state: Option<Value>,
}

/// One subtask as seen by partial-result recovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskRecord {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub result: Option<Value>,
}

impl SubtaskRecord {
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            result: None,
        }
    }
}

/// Source of subtask progress for partial-result recovery
pub trait ExecutionContext: Send + Sync {
    fn completed_subtasks(&self) -> Vec<SubtaskRecord>;
    fn pending_subtasks(&self) -> Vec<SubtaskRecord>;
    fn failed_subtasks(&self) -> Vec<SubtaskRecord>;
}
