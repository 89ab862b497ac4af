//! Task tree
//!
//! Nodes form a tree and talk only through asynchronous messages. Each node
//! is bound to a [`Strategy`] that reacts to what arrives in its mailbox.

mod dispatcher;
mod message;
mod node;
mod state;
mod strategy;

pub use dispatcher::{Dispatcher, TaskContext};
pub use message::{FailureReport, Message, Origin};
pub use node::{Artifact, ArtifactKind, ConversationEntry, TaskId, TaskNode, TaskStatus};
pub use state::{ExecutionState, ProgressEvent, ProgressStream, QueuedTask, StateStore, TaskQueue};
pub use strategy::Strategy;
