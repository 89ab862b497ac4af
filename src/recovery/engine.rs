//! Error Recovery Engine
//!
//! Decides what to do after a failure and keeps the books:
//! - Bounded attempts per `classification:task_id` key inside a retention window
//! - Retry with backoff for transient errors
//! - A fixed strategy fallback chain for strategy-level failures
//! - Partial-result salvage
//! - Snapshot and rollback of the task tree's queue and progress stream
//!
//! Decisions are returned as values; nothing here raises.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::classify::{classify_error, is_recoverable, ErrorClass};
use super::history::{RecoveryAttempt, RecoveryHistory};
use super::retry::RetryPolicy;
use super::snapshot::{ExecutionContext, RecoveryContext, StateSnapshot, SubtaskRecord};
use crate::config::RecoveryConfig;
use crate::error::AgentError;

pub const MAX_ATTEMPTS_EXCEEDED: &str = "Maximum recovery attempts exceeded";
pub const NOT_RECOVERABLE: &str = "Error is not recoverable";
pub const NO_FALLBACK: &str = "No fallback strategy available";

/// Ordered strategy fallbacks; each entry falls back to the next
pub const FALLBACK_CHAIN: &[&str] = &[
    "OptimizedExecutionStrategy",
    "RecursiveExecutionStrategy",
    "AtomicExecutionStrategy",
];

/// What the caller should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Run the same task again after `retry_after`
    RetryTask,
    /// Re-run the task under `fallback_strategy`
    FallbackStrategy,
    /// Fallback-chain lookup found a next strategy
    StrategyFallback,
    /// Fallback chain exhausted
    NoFallbackAvailable,
    /// Give up on the task
    FailTask,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetryTask => "retry_task",
            Self::FallbackStrategy => "fallback_strategy",
            Self::StrategyFallback => "strategy_fallback",
            Self::NoFallbackAvailable => "no_fallback_available",
            Self::FailTask => "fail_task",
        }
    }
}

/// A recovery decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub action: RecoveryAction,
    pub classification: ErrorClass,
    pub reason: Option<String>,
    pub fallback_strategy: Option<String>,
    pub retry_after: Option<Duration>,
}

impl RecoveryOutcome {
    fn new(success: bool, action: RecoveryAction, classification: ErrorClass) -> Self {
        Self {
            success,
            action,
            classification,
            reason: None,
            fallback_strategy: None,
            retry_after: None,
        }
    }

    fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

/// How to continue after salvaging partial results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeStrategy {
    pub strategy: String,
    pub continue_from_checkpoint: bool,
    pub skip_completed: bool,
}

/// Salvaged state of a partially executed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    pub completed: Vec<SubtaskRecord>,
    pub pending: Vec<SubtaskRecord>,
    pub failed: Vec<SubtaskRecord>,
    /// Integer percent, rounded half away from zero
    pub completion_percentage: u32,
    pub error_type: ErrorClass,
    pub recoverable: bool,
    pub can_resume: bool,
    pub resume_strategy: Option<ResumeStrategy>,
}

/// Read-only aggregates over the history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryStatistics {
    pub total_attempts: usize,
    pub successful_recoveries: usize,
    pub success_rate: f64,
}

impl RecoveryStatistics {
    /// Format for display
    pub fn format(&self) -> String {
        format!(
            "{:.1}% recovered ({}/{} attempts)",
            self.success_rate * 100.0,
            self.successful_recoveries,
            self.total_attempts
        )
    }
}

/// Completion percentage with integer rounding; 0 when there is nothing to count
pub fn completion_percentage(completed: usize, pending: usize, failed: usize) -> u32 {
    let total = completed + pending + failed;
    if total == 0 {
        return 0;
    }
    (100.0 * completed as f64 / total as f64).round() as u32
}

pub struct ErrorRecovery {
    config: RecoveryConfig,
    retry: RetryPolicy,
    history: Mutex<RecoveryHistory>,
    /// Serializes snapshot capture against rollback
    state_lock: tokio::sync::Mutex<()>,
}

impl ErrorRecovery {
    pub fn new(config: RecoveryConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            config,
            retry,
            history: Mutex::new(RecoveryHistory::new()),
            state_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the retry timing
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn classify_error(&self, error: &AgentError) -> ErrorClass {
        classify_error(error)
    }

    pub fn is_recoverable(&self, error: &AgentError) -> bool {
        is_recoverable(error)
    }

    fn key(error: &AgentError, context: &RecoveryContext) -> String {
        format!("{}:{}", classify_error(error).as_str(), context.task_id)
    }

    fn cutoff(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.retention_window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Decide how to recover from `error` and record the attempt.
    pub fn recover(&self, error: &AgentError, context: &RecoveryContext) -> RecoveryOutcome {
        let classification = classify_error(error);
        let key = Self::key(error, context);

        info!(
            key = %key,
            classification = classification.as_str(),
            task_id = %context.task_id,
            error = %error,
            "Starting error recovery"
        );

        let cutoff = self.cutoff();
        let (outcome, attempts) = {
            let mut history = self.history.lock();
            let prior = history.attempts_since(&key, cutoff);

            if prior >= self.config.max_recovery_attempts {
                let outcome = RecoveryOutcome::new(false, RecoveryAction::FailTask, classification)
                    .with_reason(MAX_ATTEMPTS_EXCEEDED);
                (outcome, prior)
            } else {
                let outcome = self.decide(error, classification, context, prior);
                history.record(&key, RecoveryAttempt::now(outcome.success, classification));
                (outcome, prior + 1)
            }
        };

        info!(
            key = %key,
            action = outcome.action.as_str(),
            success = outcome.success,
            attempts,
            reason = outcome.reason.as_deref().unwrap_or(""),
            "Recovery attempt completed"
        );

        outcome
    }

    fn decide(
        &self,
        error: &AgentError,
        classification: ErrorClass,
        context: &RecoveryContext,
        prior: usize,
    ) -> RecoveryOutcome {
        if !is_recoverable(error) {
            return RecoveryOutcome::new(false, RecoveryAction::FailTask, classification)
                .with_reason(NOT_RECOVERABLE);
        }

        if classification == ErrorClass::Strategy {
            let current = context.strategy.as_deref().unwrap_or_default();
            let lookup = self.fallback_strategy(&context.task_id, current, error);
            return match lookup.fallback_strategy {
                Some(next) => RecoveryOutcome {
                    fallback_strategy: Some(next),
                    ..RecoveryOutcome::new(true, RecoveryAction::FallbackStrategy, classification)
                },
                None => RecoveryOutcome::new(false, RecoveryAction::NoFallbackAvailable, classification)
                    .with_reason(NO_FALLBACK),
            };
        }

        let policy = if classification == ErrorClass::RateLimit {
            self.retry.rate_limit_aware()
        } else {
            self.retry.clone()
        };

        RecoveryOutcome {
            retry_after: Some(policy.delay_for_attempt(prior)),
            ..RecoveryOutcome::new(true, RecoveryAction::RetryTask, classification)
        }
    }

    /// Next strategy after `current` in the fallback chain
    pub fn fallback_strategy(
        &self,
        task_id: &str,
        current: &str,
        error: &AgentError,
    ) -> RecoveryOutcome {
        let classification = classify_error(error);
        let next = FALLBACK_CHAIN
            .iter()
            .position(|name| *name == current)
            .and_then(|pos| FALLBACK_CHAIN.get(pos + 1));

        match next {
            Some(next) => {
                info!(task_id, from = current, to = *next, "Falling back to next strategy");
                RecoveryOutcome {
                    fallback_strategy: Some(next.to_string()),
                    ..RecoveryOutcome::new(true, RecoveryAction::StrategyFallback, classification)
                }
            }
            None => {
                warn!(task_id, strategy = current, "No fallback strategy available");
                RecoveryOutcome::new(false, RecoveryAction::NoFallbackAvailable, classification)
                    .with_reason(NO_FALLBACK)
            }
        }
    }

    /// Salvage completed work and propose how to resume
    pub fn recover_partial_results(
        &self,
        execution: &dyn ExecutionContext,
        error: &AgentError,
    ) -> PartialResult {
        let completed = execution.completed_subtasks();
        let pending = execution.pending_subtasks();
        let failed = execution.failed_subtasks();

        let percentage = completion_percentage(completed.len(), pending.len(), failed.len());
        let error_type = classify_error(error);
        let recoverable = is_recoverable(error);
        let can_resume = recoverable && !pending.is_empty();

        let resume_strategy = can_resume.then(|| ResumeStrategy {
            strategy: "RecursiveExecutionStrategy".to_string(),
            continue_from_checkpoint: true,
            skip_completed: true,
        });

        info!(
            completed = completed.len(),
            pending = pending.len(),
            failed = failed.len(),
            completion_percentage = percentage,
            can_resume,
            "Recovered partial results"
        );

        PartialResult {
            completed,
            pending,
            failed,
            completion_percentage: percentage,
            error_type,
            recoverable,
            can_resume,
            resume_strategy,
        }
    }

    /// Capture the queue and progress stream; absent stores yield `None`
    pub async fn create_state_snapshot(&self, context: &RecoveryContext) -> Result<StateSnapshot> {
        let _guard = self.state_lock.lock().await;
        let scope = context.scope();

        let queue_state = match &context.task_queue {
            Some(queue) => Some(queue.export(scope.as_ref()).await?),
            None => None,
        };
        let progress_state = match &context.progress_stream {
            Some(progress) => Some(progress.export(scope.as_ref()).await?),
            None => None,
        };

        debug!(task_id = %context.task_id, "Created state snapshot");

        Ok(StateSnapshot {
            timestamp: Utc::now(),
            context: context.to_value(),
            queue_state,
            progress_state,
        })
    }

    /// Restore a snapshot. Returns `false` (and logs) if either import fails.
    pub async fn rollback_state(&self, snapshot: &StateSnapshot, context: &RecoveryContext) -> bool {
        let _guard = self.state_lock.lock().await;

        match Self::restore(snapshot, context).await {
            Ok(()) => {
                info!(
                    task_id = %context.task_id,
                    snapshot_at = %snapshot.timestamp,
                    "State rolled back"
                );
                true
            }
            Err(e) => {
                error!(error = %e, task_id = %context.task_id, "State rollback failed");
                false
            }
        }
    }

    async fn restore(snapshot: &StateSnapshot, context: &RecoveryContext) -> Result<()> {
        let scope = context.scope();
        if let (Some(queue), Some(state)) = (&context.task_queue, &snapshot.queue_state) {
            queue.import(scope.as_ref(), state.clone()).await?;
        }
        if let (Some(progress), Some(state)) = (&context.progress_stream, &snapshot.progress_state) {
            progress.import(scope.as_ref(), state.clone()).await?;
        }
        Ok(())
    }

    /// Drop attempts older than the retention window
    pub fn cleanup_recovery_history(&self) -> usize {
        let removed = self.history.lock().prune_before(self.cutoff());
        if removed > 0 {
            debug!(removed, "Pruned recovery history");
        }
        removed
    }

    pub fn get_statistics(&self) -> RecoveryStatistics {
        let history = self.history.lock();
        let total_attempts = history.total();
        let successful_recoveries = history.successful();
        let success_rate = if total_attempts == 0 {
            0.0
        } else {
            successful_recoveries as f64 / total_attempts as f64
        };

        RecoveryStatistics {
            total_attempts,
            successful_recoveries,
            success_rate,
        }
    }

    /// Attempts inside the window for this error's key
    pub fn get_recovery_attempts(&self, error: &AgentError, context: &RecoveryContext) -> usize {
        let key = Self::key(error, context);
        self.history.lock().attempts_since(&key, self.cutoff())
    }

    /// Outcome of the newest attempt for this error's key
    pub fn last_outcome(&self, error: &AgentError, context: &RecoveryContext) -> Option<bool> {
        self.history.lock().last_outcome(&Self::key(error, context))
    }

    /// Import one attempt, e.g. from persisted history
    pub fn record_attempt(&self, key: &str, attempt: RecoveryAttempt) {
        self.history.lock().record(key, attempt);
    }

    /// Copy of the whole history, for persistence
    pub fn history_snapshot(&self) -> HashMap<String, Vec<RecoveryAttempt>> {
        self.history.lock().to_map()
    }
}

impl Default for ErrorRecovery {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}
