//! Message Dispatcher
//!
//! Every node owns an unbounded mailbox drained by its own tokio task, so a
//! node handles its messages strictly in order and never two at once, while
//! different nodes run concurrently. `send` only enqueues.
//!
//! Handler errors and panics are caught here, turned into a terminal
//! `failed` status, and reported to the parent.
//!
//! `abort` bypasses the mailbox: the node is terminated when the message is
//! posted, even while a handler is mid-flight, and the queued message then
//! reaches the strategy as a notification. Once a node is terminal its
//! mailbox task drains what is left and exits.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::message::{FailureReport, Message, Origin};
use super::node::{Artifact, TaskId, TaskNode, TaskStatus};
use super::state::{ExecutionState, QueuedTask};
use super::strategy::Strategy;
use crate::error::DispatchError;

struct Envelope {
    sender: Option<TaskId>,
    message: Message,
}

struct NodeEntry {
    node: Arc<Mutex<TaskNode>>,
    mailbox: mpsc::UnboundedSender<Envelope>,
    /// Set once, when the node reaches a terminal status
    terminal: watch::Sender<Option<TaskStatus>>,
}

struct Inner {
    nodes: RwLock<HashMap<TaskId, NodeEntry>>,
    execution: ExecutionState,
}

/// Owner of a task tree
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_state(ExecutionState::new())
    }

    /// Use an existing queue/progress pair
    pub fn with_state(execution: ExecutionState) -> Self {
        Self {
            inner: Arc::new(Inner {
                nodes: RwLock::new(HashMap::new()),
                execution,
            }),
        }
    }

    /// Create a root node. Must be called inside a tokio runtime.
    pub fn spawn_root(&self, description: &str, strategy: Box<dyn Strategy>) -> TaskId {
        Inner::spawn(&self.inner, description, None, strategy)
    }

    /// Create a child of `parent`
    pub fn spawn_child(
        &self,
        parent: &TaskId,
        description: &str,
        strategy: Box<dyn Strategy>,
    ) -> Result<TaskId, DispatchError> {
        if !self.inner.nodes.read().contains_key(parent) {
            return Err(DispatchError::UnknownTask(parent.to_string()));
        }
        Ok(Inner::spawn(&self.inner, description, Some(parent.clone()), strategy))
    }

    /// Deliver a message from outside the tree
    pub fn send(&self, target: &TaskId, message: Message) -> Result<(), DispatchError> {
        self.inner.post(None, target, message)
    }

    /// Deliver a message on behalf of `sender`
    pub fn send_from(
        &self,
        sender: &TaskId,
        target: &TaskId,
        message: Message,
    ) -> Result<(), DispatchError> {
        self.inner.post(Some(sender.clone()), target, message)
    }

    /// Copy of a node's current state
    pub fn node(&self, id: &TaskId) -> Option<TaskNode> {
        self.inner.node(id).map(|n| n.lock().clone())
    }

    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.inner.node(id).map(|n| n.lock().status)
    }

    pub fn execution(&self) -> &ExecutionState {
        &self.inner.execution
    }

    /// Wait until the node is terminal; `None` on timeout or unknown node
    pub async fn wait_for_terminal(&self, id: &TaskId, timeout: Duration) -> Option<TaskStatus> {
        let mut terminal = self.inner.nodes.read().get(id)?.terminal.subscribe();
        let reached = tokio::time::timeout(timeout, terminal.wait_for(Option::is_some)).await;
        match reached {
            Ok(Ok(status)) => *status,
            _ => None,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn spawn(
        this: &Arc<Self>,
        description: &str,
        parent: Option<TaskId>,
        strategy: Box<dyn Strategy>,
    ) -> TaskId {
        let node = TaskNode::new(description, parent.clone(), strategy.name());
        let id = node.id.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut nodes = this.nodes.write();
            if let Some(parent_id) = &parent {
                if let Some(entry) = nodes.get(parent_id) {
                    entry.node.lock().children.push(id.clone());
                }
            }
            nodes.insert(
                id.clone(),
                NodeEntry {
                    node: Arc::new(Mutex::new(node)),
                    mailbox: tx,
                    terminal: watch::channel(None).0,
                },
            );
        }

        this.execution.queue.push(QueuedTask {
            task_id: id.clone(),
            description: description.to_string(),
        });
        this.execution
            .progress
            .record(&id, TaskStatus::Pending, Some(description.to_string()));

        info!(task_id = %id, strategy = strategy.name(), "Spawned task node");
        tokio::spawn(run_node(Arc::downgrade(this), id.clone(), rx, strategy));
        id
    }

    fn node(&self, id: &TaskId) -> Option<Arc<Mutex<TaskNode>>> {
        self.nodes.read().get(id).map(|e| Arc::clone(&e.node))
    }

    fn parent_of(&self, id: &TaskId) -> Option<TaskId> {
        self.node(id).and_then(|n| n.lock().parent.clone())
    }

    fn is_terminal(&self, id: &TaskId) -> bool {
        self.node(id).map_or(true, |n| n.lock().status.is_terminal())
    }

    fn post(
        &self,
        sender: Option<TaskId>,
        target: &TaskId,
        message: Message,
    ) -> Result<(), DispatchError> {
        if let Message::Abort { reason } = &message {
            if self.node(target).is_none() {
                return Err(DispatchError::UnknownTask(target.to_string()));
            }
            let report = FailureReport::new(format!("Task aborted: {}", reason), "aborted");
            if !self.finish(target, TaskStatus::Aborted, Message::Failed(report)) {
                return Ok(());
            }
        }

        let nodes = self.nodes.read();
        let entry = nodes
            .get(target)
            .ok_or_else(|| DispatchError::UnknownTask(target.to_string()))?;
        match entry.mailbox.send(Envelope { sender, message }) {
            Ok(()) => Ok(()),
            Err(rejected) if entry.node.lock().status.is_terminal() => {
                debug!(
                    task_id = %target,
                    message = rejected.0.message.kind(),
                    "Discarding message for released task"
                );
                Ok(())
            }
            Err(_) => Err(DispatchError::MailboxClosed(target.to_string())),
        }
    }

    fn classify(&self, target: &TaskId, sender: Option<&TaskId>) -> Origin {
        let Some(sender) = sender else {
            return Origin::External(None);
        };
        if self.parent_of(sender).as_ref() == Some(target) {
            Origin::Child(sender.clone())
        } else if self.parent_of(target).as_ref() == Some(sender) {
            Origin::Parent(sender.clone())
        } else {
            Origin::External(Some(sender.clone()))
        }
    }

    /// Move a node to a terminal status and notify its parent once.
    /// Returns `false` if the node was already terminal.
    fn finish(&self, id: &TaskId, status: TaskStatus, notification: Message) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };

        let (parent, children) = {
            let mut node = node.lock();
            if !node.transition(status) {
                debug!(task_id = %id, status = status.as_str(), "Ignoring transition on terminal task");
                return false;
            }
            let parent = if node.parent_notified {
                None
            } else {
                node.parent_notified = true;
                node.parent.clone()
            };
            (parent, node.children.clone())
        };

        self.execution.queue.remove(id);
        self.execution.progress.record(id, status, None);
        if let Some(entry) = self.nodes.read().get(id) {
            entry.terminal.send_replace(Some(status));
        }
        info!(task_id = %id, status = status.as_str(), "Task reached terminal state");

        if status == TaskStatus::Aborted {
            for child in children {
                let live = self
                    .node(&child)
                    .map(|n| !n.lock().status.is_terminal())
                    .unwrap_or(false);
                if live {
                    let _ = self.post(
                        Some(id.clone()),
                        &child,
                        Message::Abort {
                            reason: "Parent aborted".to_string(),
                        },
                    );
                }
            }
        }

        if let Some(parent) = parent {
            if let Err(e) = self.post(Some(id.clone()), &parent, notification) {
                warn!(task_id = %id, error = %e, "Failed to notify parent");
            }
        }

        true
    }

    async fn deliver(self: &Arc<Self>, id: &TaskId, strategy: &mut dyn Strategy, envelope: Envelope) {
        let Some(node) = self.node(id) else {
            return;
        };

        let status = node.lock().status;
        let is_abort = matches!(envelope.message, Message::Abort { .. });
        if status.is_terminal() && !is_abort {
            debug!(
                task_id = %id,
                message = envelope.message.kind(),
                "Discarding message for terminal task"
            );
            return;
        }

        if status == TaskStatus::Pending
            && matches!(envelope.message, Message::Start { .. } | Message::Work { .. })
        {
            let mut node = node.lock();
            if node.transition(TaskStatus::Active) {
                self.execution.queue.remove(id);
                self.execution.progress.record(id, TaskStatus::Active, None);
            }
        }

        let origin = self.classify(id, envelope.sender.as_ref());
        let ctx = TaskContext {
            id: id.clone(),
            inner: Arc::clone(self),
        };

        debug!(task_id = %id, message = envelope.message.kind(), ?origin, "Dispatching message");

        let handled = AssertUnwindSafe(strategy.on_message(&ctx, origin, envelope.message))
            .catch_unwind()
            .await;
        match handled {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(task_id = %id, error = %e, "Message handler failed");
                ctx.fail_with_error(&e, "Unhandled error while handling message");
            }
            Err(payload) => {
                let reason = panic_reason(&*payload);
                error!(task_id = %id, panic = %reason, "Message handler panicked");
                ctx.fail_with_error(&reason, "Handler panicked");
            }
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_node(
    inner: Weak<Inner>,
    id: TaskId,
    mut mailbox: mpsc::UnboundedReceiver<Envelope>,
    mut strategy: Box<dyn Strategy>,
) {
    while let Some(envelope) = mailbox.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.deliver(&id, strategy.as_mut(), envelope).await;

        if inner.is_terminal(&id) {
            // Late aborts still reach the strategy; everything else is dropped
            mailbox.close();
            while let Ok(envelope) = mailbox.try_recv() {
                inner.deliver(&id, strategy.as_mut(), envelope).await;
            }
            break;
        }
    }
    debug!(task_id = %id, "Mailbox released");
}

/// A strategy's handle on its own node
pub struct TaskContext {
    id: TaskId,
    inner: Arc<Inner>,
}

impl TaskContext {
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn parent(&self) -> Option<TaskId> {
        self.inner.parent_of(&self.id)
    }

    pub fn status(&self) -> TaskStatus {
        self.inner
            .node(&self.id)
            .map(|n| n.lock().status)
            .unwrap_or(TaskStatus::Aborted)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Copy of this node's state
    pub fn snapshot(&self) -> Option<TaskNode> {
        self.inner.node(&self.id).map(|n| n.lock().clone())
    }

    pub fn execution(&self) -> &ExecutionState {
        &self.inner.execution
    }

    /// Fire-and-forget send to another node
    pub fn send(&self, target: &TaskId, message: Message) -> Result<(), DispatchError> {
        self.inner.post(Some(self.id.clone()), target, message)
    }

    /// Send to the parent; a root node drops the message
    pub fn send_to_parent(&self, message: Message) -> Result<(), DispatchError> {
        match self.parent() {
            Some(parent) => self.send(&parent, message),
            None => Ok(()),
        }
    }

    pub fn spawn_child(&self, description: &str, strategy: Box<dyn Strategy>) -> TaskId {
        Inner::spawn(&self.inner, description, Some(self.id.clone()), strategy)
    }

    /// Append to this node's conversation log
    pub fn log(&self, role: &str, content: impl Into<String>) {
        if let Some(node) = self.inner.node(&self.id) {
            node.lock().log(role, content);
        }
    }

    pub fn set_artifact(&self, name: &str, artifact: Artifact) {
        if let Some(node) = self.inner.node(&self.id) {
            node.lock().artifacts.insert(name.to_string(), artifact);
        }
    }

    /// Run `work` off the dispatch path and deliver its result back to this
    /// node as a new message. Results for a terminated node are discarded.
    pub fn continue_with<F>(&self, work: F)
    where
        F: Future<Output = Message> + Send + 'static,
    {
        let inner = Arc::downgrade(&self.inner);
        let id = self.id.clone();
        tokio::spawn(async move {
            let message = work.await;
            if let Some(inner) = inner.upgrade() {
                if let Err(e) = inner.post(Some(id.clone()), &id, message) {
                    debug!(task_id = %id, error = %e, "Dropping continuation result");
                }
            }
        });
    }

    /// Deliver `message` to this node after `delay`
    pub fn schedule(&self, message: Message, delay: Duration) {
        self.continue_with(async move {
            tokio::time::sleep(delay).await;
            message
        });
    }

    /// Store artifacts, log them, complete the node and notify the parent
    pub fn complete_with_artifacts(
        &self,
        artifacts: Vec<(String, Artifact)>,
        result: Value,
    ) -> bool {
        if self.is_terminal() {
            return false;
        }

        if let Some(node) = self.inner.node(&self.id) {
            let mut node = node.lock();
            let count = artifacts.len();
            for (name, artifact) in artifacts {
                node.log(
                    "system",
                    format!(
                        "Stored artifact '{}' ({:?}): {}",
                        name, artifact.kind, artifact.description
                    ),
                );
                node.artifacts.insert(name, artifact);
            }
            node.log("system", format!("Task completed with {} artifact(s)", count));
        }

        self.inner
            .finish(&self.id, TaskStatus::Completed, Message::Completed { result })
    }

    /// Terminal failure carrying the originating error text
    pub fn fail_with_error(&self, error: &dyn std::fmt::Display, message: &str) -> bool {
        self.fail(FailureReport::new(error.to_string(), message))
    }

    /// Terminal failure with a full report
    pub fn fail(&self, report: FailureReport) -> bool {
        self.log("system", format!("Task failed: {} ({})", report.message, report.error));
        self.inner
            .finish(&self.id, TaskStatus::Failed, Message::Failed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::node::ArtifactKind;
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    type Seen = Arc<PlMutex<Vec<(String, String)>>>;

    /// Records (origin, message kind) and reacts to a few commands
    struct Recorder {
        seen: Seen,
        released: Arc<AtomicBool>,
    }

    impl Drop for Recorder {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn origin_label(origin: &Origin) -> &'static str {
        match origin {
            Origin::Child(_) => "child",
            Origin::Parent(_) => "parent",
            Origin::External(_) => "external",
        }
    }

    #[async_trait]
    impl Strategy for Recorder {
        fn name(&self) -> &str {
            "Recorder"
        }

        async fn on_message(
            &mut self,
            ctx: &TaskContext,
            origin: Origin,
            message: Message,
        ) -> anyhow::Result<()> {
            self.seen
                .lock()
                .push((origin_label(&origin).to_string(), message.kind().to_string()));

            match message {
                Message::Custom { kind, .. } if kind == "explode" => {
                    anyhow::bail!("handler exploded")
                }
                Message::Custom { kind, .. } if kind == "finish" => {
                    ctx.complete_with_artifacts(
                        vec![(
                            "answer".to_string(),
                            Artifact::new(serde_json::json!(42), "The answer", ArtifactKind::Json),
                        )],
                        serde_json::json!({"answer": 42}),
                    );
                }
                Message::Custom { kind, .. } if kind == "panic" => {
                    let empty: Vec<u8> = Vec::new();
                    let _ = empty[empty.len()];
                }
                Message::Custom { kind, .. } if kind == "stall" => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    ctx.complete_with_artifacts(vec![], serde_json::json!({"late": true}));
                }
                Message::Custom { kind, .. } if kind == "slow" => {
                    ctx.continue_with(async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Message::custom("slow_done", Value::Null)
                    });
                }
                _ => {}
            }
            Ok(())
        }
    }

    fn recorder() -> (Box<dyn Strategy>, Seen) {
        let (strategy, seen, _) = tracked_recorder();
        (strategy, seen)
    }

    fn tracked_recorder() -> (Box<dyn Strategy>, Seen, Arc<AtomicBool>) {
        let seen: Seen = Arc::new(PlMutex::new(Vec::new()));
        let released = Arc::new(AtomicBool::new(false));
        let strategy = Recorder {
            seen: seen.clone(),
            released: released.clone(),
        };
        (Box::new(strategy), seen, released)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_start_activates_and_dequeues() {
        let dispatcher = Dispatcher::new();
        let (strategy, seen) = recorder();
        let root = dispatcher.spawn_root("root", strategy);

        assert_eq!(dispatcher.status(&root), Some(TaskStatus::Pending));
        assert_eq!(dispatcher.execution().queue.len(), 1);

        dispatcher.send(&root, Message::start()).unwrap();
        settle().await;

        assert_eq!(dispatcher.status(&root), Some(TaskStatus::Active));
        assert!(dispatcher.execution().queue.is_empty());
        assert_eq!(seen.lock()[0], ("external".to_string(), "start".to_string()));
    }

    #[tokio::test]
    async fn test_completion_notifies_parent_once() {
        let dispatcher = Dispatcher::new();
        let (root_strategy, root_seen) = recorder();
        let root = dispatcher.spawn_root("root", root_strategy);
        let (child_strategy, child_seen) = recorder();
        let child = dispatcher.spawn_child(&root, "child", child_strategy).unwrap();

        dispatcher.send_from(&root, &child, Message::start()).unwrap();
        dispatcher
            .send(&child, Message::custom("finish", Value::Null))
            .unwrap();
        // Arrives after termination and must be dropped
        dispatcher
            .send(&child, Message::custom("finish", Value::Null))
            .unwrap();

        assert_eq!(
            dispatcher.wait_for_terminal(&child, Duration::from_secs(1)).await,
            Some(TaskStatus::Completed)
        );
        settle().await;

        assert_eq!(child_seen.lock()[0].0, "parent");
        assert_eq!(child_seen.lock().len(), 2);

        let root_seen = root_seen.lock();
        assert_eq!(root_seen.len(), 1);
        assert_eq!(root_seen[0], ("child".to_string(), "completed".to_string()));

        let node = dispatcher.node(&child).unwrap();
        assert_eq!(node.artifacts["answer"].description, "The answer");
        // One entry per artifact plus the summary
        assert_eq!(node.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_handler_error_fails_node_and_reports() {
        let dispatcher = Dispatcher::new();
        let (root_strategy, root_seen) = recorder();
        let root = dispatcher.spawn_root("root", root_strategy);
        let (child_strategy, _) = recorder();
        let child = dispatcher.spawn_child(&root, "child", child_strategy).unwrap();

        dispatcher
            .send(&child, Message::custom("explode", Value::Null))
            .unwrap();

        assert_eq!(
            dispatcher.wait_for_terminal(&child, Duration::from_secs(1)).await,
            Some(TaskStatus::Failed)
        );
        settle().await;

        let seen = root_seen.lock();
        assert_eq!(seen.as_slice(), &[("child".to_string(), "failed".to_string())]);
        // Root itself is unaffected
        assert_eq!(dispatcher.status(&root), Some(TaskStatus::Pending));
    }

    #[tokio::test]
    async fn test_abort_cascades_and_drops_late_continuations() {
        let dispatcher = Dispatcher::new();
        let (root_strategy, root_seen) = recorder();
        let root = dispatcher.spawn_root("root", root_strategy);
        let (child_strategy, _) = recorder();
        let child = dispatcher.spawn_child(&root, "child", child_strategy).unwrap();

        dispatcher.send(&root, Message::custom("slow", Value::Null)).unwrap();
        dispatcher
            .send(
                &root,
                Message::Abort {
                    reason: "user cancelled".into(),
                },
            )
            .unwrap();

        assert_eq!(
            dispatcher.wait_for_terminal(&child, Duration::from_secs(1)).await,
            Some(TaskStatus::Aborted)
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(dispatcher.status(&root), Some(TaskStatus::Aborted));
        let seen = root_seen.lock();
        assert!(!seen.iter().any(|(_, kind)| kind == "slow_done"));
    }

    #[tokio::test]
    async fn test_abort_lands_while_handler_runs() {
        let dispatcher = Dispatcher::new();
        let (root_strategy, root_seen) = recorder();
        let root = dispatcher.spawn_root("root", root_strategy);
        let (child_strategy, child_seen) = recorder();
        let child = dispatcher.spawn_child(&root, "child", child_strategy).unwrap();

        dispatcher.send_from(&root, &child, Message::start()).unwrap();
        dispatcher
            .send(&child, Message::custom("stall", Value::Null))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.status(&child), Some(TaskStatus::Active));

        dispatcher
            .send(
                &child,
                Message::Abort {
                    reason: "user cancelled".into(),
                },
            )
            .unwrap();
        // Terminal before the stalled handler returns
        assert_eq!(dispatcher.status(&child), Some(TaskStatus::Aborted));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(dispatcher.status(&child), Some(TaskStatus::Aborted));

        // The strategy still hears about the abort once its handler is done
        assert_eq!(
            child_seen.lock().last(),
            Some(&("external".to_string(), "abort".to_string()))
        );
        let root_seen = root_seen.lock();
        assert_eq!(root_seen.as_slice(), &[("child".to_string(), "failed".to_string())]);
    }

    #[tokio::test]
    async fn test_handler_panic_fails_node_and_reports() {
        let dispatcher = Dispatcher::new();
        let (root_strategy, root_seen) = recorder();
        let root = dispatcher.spawn_root("root", root_strategy);
        let (child_strategy, _) = recorder();
        let child = dispatcher.spawn_child(&root, "child", child_strategy).unwrap();

        dispatcher
            .send(&child, Message::custom("panic", Value::Null))
            .unwrap();

        assert_eq!(
            dispatcher.wait_for_terminal(&child, Duration::from_secs(1)).await,
            Some(TaskStatus::Failed)
        );
        settle().await;

        assert_eq!(
            root_seen.lock().as_slice(),
            &[("child".to_string(), "failed".to_string())]
        );
        let node = dispatcher.node(&child).unwrap();
        assert!(node
            .conversation()
            .iter()
            .any(|entry| entry.content.contains("index out of bounds")));

        // Later sends are discarded, not rejected
        assert_eq!(dispatcher.send(&child, Message::work()), Ok(()));
    }

    #[tokio::test]
    async fn test_terminal_node_releases_mailbox() {
        let dispatcher = Dispatcher::new();
        let (strategy, seen, released) = tracked_recorder();
        let root = dispatcher.spawn_root("root", strategy);

        dispatcher.send(&root, Message::custom("finish", Value::Null)).unwrap();
        assert_eq!(
            dispatcher.wait_for_terminal(&root, Duration::from_secs(1)).await,
            Some(TaskStatus::Completed)
        );
        settle().await;
        assert!(released.load(Ordering::SeqCst));

        assert_eq!(dispatcher.send(&root, Message::work()), Ok(()));
        assert_eq!(
            dispatcher.send(
                &root,
                Message::Abort {
                    reason: "too late".into()
                }
            ),
            Ok(())
        );
        assert_eq!(dispatcher.status(&root), Some(TaskStatus::Completed));
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_terminal_times_out() {
        let dispatcher = Dispatcher::new();
        let (strategy, _) = recorder();
        let root = dispatcher.spawn_root("root", strategy);

        assert_eq!(
            dispatcher.wait_for_terminal(&root, Duration::from_millis(20)).await,
            None
        );
        assert_eq!(
            dispatcher
                .wait_for_terminal(&TaskId::from("nope"), Duration::from_millis(20))
                .await,
            None
        );
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let dispatcher = Dispatcher::new();
        let err = dispatcher.send(&TaskId::from("nope"), Message::start());
        assert_eq!(err, Err(DispatchError::UnknownTask("nope".into())));
    }
}
