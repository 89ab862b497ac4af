//! Error recovery
//!
//! Classifies failures, enforces a per-key attempt budget and picks the next
//! action: retry with backoff, fall back to another strategy, or fail.

mod classify;
mod engine;
mod history;
mod retry;
mod snapshot;

pub use classify::{classify_error, is_recoverable, ErrorClass};
pub use engine::{
    completion_percentage, ErrorRecovery, PartialResult, RecoveryAction, RecoveryOutcome,
    RecoveryStatistics, ResumeStrategy, FALLBACK_CHAIN, MAX_ATTEMPTS_EXCEEDED, NOT_RECOVERABLE,
    NO_FALLBACK,
};
pub use history::{RecoveryAttempt, RecoveryHistory};
pub use retry::RetryPolicy;
pub use snapshot::{ExecutionContext, RecoveryContext, StateSnapshot, SubtaskRecord};
