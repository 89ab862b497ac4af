//! Shared execution state owned by the task layer
//!
//! The queue of work awaiting a start and the progress stream are the two
//! pieces of state recovery can snapshot and roll back. Each store mutates
//! under its own lock, so an import is observed either fully or not at all.
//!
//! Both stores are shared by every node of a tree. A scoped export or import
//! touches only the entries of one task and leaves its siblings alone.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

use super::node::{TaskId, TaskStatus};
use crate::error::StoreError;

/// Export/import contract used by snapshot and rollback.
///
/// `scope` of `None` covers the whole store; `Some(task)` covers only the
/// entries belonging to `task`.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn export(&self, scope: Option<&TaskId>) -> Result<Value>;
    async fn import(&self, scope: Option<&TaskId>, state: Value) -> Result<()>;
}

/// A node waiting for its first `start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task_id: TaskId,
    pub description: String,
}

/// FIFO of nodes that exist but have not started
#[derive(Debug, Default)]
pub struct TaskQueue {
    items: Mutex<VecDeque<QueuedTask>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: QueuedTask) {
        self.items.lock().push_back(task);
    }

    /// Remove a specific task, wherever it sits
    pub fn remove(&self, task_id: &TaskId) -> Option<QueuedTask> {
        let mut items = self.items.lock();
        let pos = items.iter().position(|t| &t.task_id == task_id)?;
        items.remove(pos)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn contents(&self) -> Vec<QueuedTask> {
        self.items.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl StateStore for TaskQueue {
    async fn export(&self, scope: Option<&TaskId>) -> Result<Value> {
        let items: Vec<QueuedTask> = self
            .items
            .lock()
            .iter()
            .filter(|t| scope.map_or(true, |id| &t.task_id == id))
            .cloned()
            .collect();
        Ok(serde_json::to_value(items)?)
    }

    /// A scoped import replaces the task's entries and appends restored ones
    async fn import(&self, scope: Option<&TaskId>, state: Value) -> Result<()> {
        let restored: VecDeque<QueuedTask> =
            serde_json::from_value(state).map_err(StoreError::InvalidState)?;

        let mut items = self.items.lock();
        match scope {
            None => *items = restored,
            Some(id) => {
                items.retain(|t| &t.task_id != id);
                items.extend(restored.into_iter().filter(|t| &t.task_id == id));
            }
        }
        Ok(())
    }
}

/// One status transition of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub detail: Option<String>,
    pub timestamp: i64,
}

/// Append-only log of progress events
#[derive(Debug, Default)]
pub struct ProgressStream {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task_id: &TaskId, status: TaskStatus, detail: Option<String>) {
        self.events.lock().push(ProgressEvent {
            task_id: task_id.clone(),
            status,
            detail,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl StateStore for ProgressStream {
    async fn export(&self, scope: Option<&TaskId>) -> Result<Value> {
        let events: Vec<ProgressEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| scope.map_or(true, |id| &e.task_id == id))
            .cloned()
            .collect();
        Ok(serde_json::to_value(events)?)
    }

    /// A scoped import swaps the task's events and keeps the stream in time order
    async fn import(&self, scope: Option<&TaskId>, state: Value) -> Result<()> {
        let restored: Vec<ProgressEvent> =
            serde_json::from_value(state).map_err(StoreError::InvalidState)?;

        let mut events = self.events.lock();
        match scope {
            None => *events = restored,
            Some(id) => {
                events.retain(|e| &e.task_id != id);
                events.extend(restored.into_iter().filter(|e| &e.task_id == id));
                events.sort_by_key(|e| e.timestamp);
            }
        }
        Ok(())
    }
}

/// The queue and progress stream shared by one task tree
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    pub queue: Arc<TaskQueue>,
    pub progress: Arc<ProgressStream>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }
}
