//! Task Tree Execution Core
//!
//! Execution core of an autonomous task-running agent.
//!
//! # Features
//!
//! - **Task Tree**: nodes bound to pluggable strategies, talking by fire-and-forget messages
//! - **Goal-Stack Planner**: AND/OR goal decomposition with event-driven completion propagation
//! - **Error Recovery**: classification, bounded retries, strategy fallback chains
//! - **Snapshots**: capture and roll back the tree's queue and progress stream
//!
//! # Architecture
//!
//! ```text
//! Dispatcher ──► TaskNode mailbox ──► Strategy::on_message
//!                                        │
//!                                        ├── GoalStackStrategy
//!                                        │     ├── GoalLedger (goals + LIFO stack)
//!                                        │     ├── PlanningOracle (evaluate / decompose)
//!                                        │     └── ToolRegistry
//!                                        └── ErrorRecovery
//!                                              ├── classify_error
//!                                              ├── RecoveryHistory (per key, windowed)
//!                                              └── StateSnapshot (queue + progress)
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod planner;
pub mod recovery;
pub mod task;
pub mod tools;

pub use config::{Config, LogConfig, PlannerConfig, RecoveryConfig};
pub use error::{AgentError, DispatchError, PlannerError, StoreError};
pub use planner::{
    Condition, DecompositionKind, Goal, GoalId, GoalLedger, GoalSpec, GoalStackPlanner,
    GoalStackStrategy, GoalStatus, PlanningOracle, Predicate, StepOutcome,
};
pub use recovery::{
    classify_error, is_recoverable, ErrorClass, ErrorRecovery, RecoveryAction, RecoveryContext,
    RecoveryOutcome, StateSnapshot,
};
pub use task::{Dispatcher, Message, Strategy, TaskContext, TaskId, TaskStatus};
pub use tools::{Tool, ToolOutput, ToolRegistry};
