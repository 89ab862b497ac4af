//! Error Recovery Integration Tests
//!
//! Budget accounting, fallback chains, partial results and snapshot/rollback
//! through the public API.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use tasktree::recovery::{
    ExecutionContext, RecoveryAttempt, SubtaskRecord, FALLBACK_CHAIN, MAX_ATTEMPTS_EXCEEDED,
};
use tasktree::task::{ExecutionState, QueuedTask, StateStore};
use tasktree::{
    classify_error, is_recoverable, AgentError, Config, ErrorClass, ErrorRecovery, RecoveryAction,
    RecoveryContext, TaskId,
};

fn recovery_with_budget(max: usize) -> ErrorRecovery {
    let config = Config::from_lookup(|key| match key {
        "TASKTREE_MAX_RECOVERY_ATTEMPTS" => Some(max.to_string()),
        "TASKTREE_RETRY_BASE_MS" => Some("1".to_string()),
        _ => None,
    })
    .expect("valid config");
    ErrorRecovery::new(config.recovery)
}

#[test]
fn test_classification_scenarios() {
    let missing = AgentError::task("Tool not found: missing_tool");
    assert_eq!(classify_error(&missing), ErrorClass::ToolMissing);
    assert!(!is_recoverable(&missing));

    let refused = AgentError::resource("ECONNREFUSED");
    assert_eq!(classify_error(&refused), ErrorClass::Network);
    assert!(is_recoverable(&refused));
}

#[test]
fn test_budget_exhaustion_for_each_bound() {
    for max in 1..=4 {
        let recovery = recovery_with_budget(max);
        let error = AgentError::resource("connection reset by peer");
        let ctx = RecoveryContext::new("task-1");

        for _ in 0..max {
            assert!(recovery.recover(&error, &ctx).success);
        }

        let outcome = recovery.recover(&error, &ctx);
        assert!(!outcome.success);
        assert_eq!(outcome.reason.as_deref(), Some(MAX_ATTEMPTS_EXCEEDED));
        assert_eq!(recovery.get_recovery_attempts(&error, &ctx), max);

        // Another task with the same error is untouched
        let other = RecoveryContext::new("task-2");
        assert!(recovery.recover(&error, &other).success);
    }
}

#[test]
fn test_concurrent_recover_respects_budget() {
    let recovery = Arc::new(recovery_with_budget(5));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let recovery = recovery.clone();
            std::thread::spawn(move || {
                let ctx = RecoveryContext::new("shared");
                recovery
                    .recover(&AgentError::resource("ETIMEDOUT"), &ctx)
                    .success
            })
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(granted, 5);
    assert_eq!(recovery.get_statistics().total_attempts, 5);
}

#[test]
fn test_fallback_chain_walk() {
    let recovery = ErrorRecovery::default();
    let error = AgentError::strategy("OptimizedExecutionStrategy", "gave up");

    let first = recovery.fallback_strategy("t", FALLBACK_CHAIN[0], &error);
    assert_eq!(first.action, RecoveryAction::StrategyFallback);
    assert_eq!(first.fallback_strategy.as_deref(), Some("RecursiveExecutionStrategy"));

    let second = recovery.fallback_strategy("t", "RecursiveExecutionStrategy", &error);
    assert_eq!(second.fallback_strategy.as_deref(), Some("AtomicExecutionStrategy"));

    let last = recovery.fallback_strategy("t", "AtomicExecutionStrategy", &error);
    assert!(!last.success);
    assert_eq!(last.action, RecoveryAction::NoFallbackAvailable);
}

struct Subtasks {
    completed: Vec<SubtaskRecord>,
    pending: Vec<SubtaskRecord>,
    failed: Vec<SubtaskRecord>,
}

impl ExecutionContext for Subtasks {
    fn completed_subtasks(&self) -> Vec<SubtaskRecord> {
        self.completed.clone()
    }
    fn pending_subtasks(&self) -> Vec<SubtaskRecord> {
        self.pending.clone()
    }
    fn failed_subtasks(&self) -> Vec<SubtaskRecord> {
        self.failed.clone()
    }
}

#[test]
fn test_partial_results_half_done() {
    let recovery = ErrorRecovery::default();
    let ctx = Subtasks {
        completed: vec![SubtaskRecord::new("1", "fetch"), SubtaskRecord::new("2", "parse")],
        pending: vec![SubtaskRecord::new("3", "summarize")],
        failed: vec![SubtaskRecord::new("4", "translate")],
    };

    let partial = recovery.recover_partial_results(&ctx, &AgentError::resource("ECONNRESET"));
    assert_eq!(partial.completion_percentage, 50);
    assert!(partial.can_resume);
    assert_eq!(partial.pending[0].description, "summarize");

    let empty = Subtasks {
        completed: vec![],
        pending: vec![],
        failed: vec![],
    };
    let partial = recovery.recover_partial_results(&empty, &AgentError::resource("ECONNRESET"));
    assert_eq!(partial.completion_percentage, 0);
    assert!(!partial.can_resume);
}

#[test]
fn test_cleanup_keeps_only_recent() {
    let recovery = ErrorRecovery::default();
    let now = Utc::now();
    for hours in [30, 25, 1] {
        recovery.record_attempt(
            "network:t",
            RecoveryAttempt {
                timestamp: now - ChronoDuration::hours(hours),
                success: true,
                classification: ErrorClass::Network,
            },
        );
    }

    assert_eq!(recovery.cleanup_recovery_history(), 2);
    let history = recovery.history_snapshot();
    assert_eq!(history["network:t"].len(), 1);
    assert!(history["network:t"][0].timestamp > now - ChronoDuration::hours(2));
}

struct FlakyStore {
    inner: Arc<tasktree::task::TaskQueue>,
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn export(&self, scope: Option<&TaskId>) -> Result<Value> {
        self.inner.export(scope).await
    }

    async fn import(&self, _scope: Option<&TaskId>, _state: Value) -> Result<()> {
        anyhow::bail!("Queue import failed")
    }
}

#[test]
fn test_snapshot_round_trip_and_rejection() {
    tokio_test::block_on(async {
        let recovery = ErrorRecovery::default();
        let state = ExecutionState::new();
        state.queue.push(QueuedTask {
            task_id: TaskId::from("a"),
            description: "first".into(),
        });

        let ctx = RecoveryContext::new("t")
            .with_metadata(json!({"attempt": 1}))
            .with_execution_state(&state);
        let snapshot = tokio_test::assert_ok!(recovery.create_state_snapshot(&ctx).await);

        state.queue.push(QueuedTask {
            task_id: TaskId::from("b"),
            description: "second".into(),
        });
        assert!(recovery.rollback_state(&snapshot, &ctx).await);
        assert_eq!(state.queue.len(), 1);

        let flaky = RecoveryContext::new("t").with_task_queue(Arc::new(FlakyStore {
            inner: state.queue.clone(),
        }));
        let snapshot = tokio_test::assert_ok!(recovery.create_state_snapshot(&flaky).await);
        assert!(!recovery.rollback_state(&snapshot, &flaky).await);

        // No stores attached: nothing captured, nothing to fail
        let bare = RecoveryContext::new("t");
        let snapshot = tokio_test::assert_ok!(recovery.create_state_snapshot(&bare).await);
        assert!(snapshot.queue_state.is_none() && snapshot.progress_state.is_none());
        assert!(recovery.rollback_state(&snapshot, &bare).await);
    });
}

#[test]
fn test_retry_delay_grows() {
    let recovery = ErrorRecovery::new(tasktree::RecoveryConfig {
        max_recovery_attempts: 3,
        retry_base_delay: Duration::from_millis(100),
        ..Default::default()
    })
    .with_retry_policy(tasktree::recovery::RetryPolicy {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(10),
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    });
    let ctx = RecoveryContext::new("t");
    let error = AgentError::resource("ECONNREFUSED");

    let delays: Vec<Duration> = (0..3)
        .map(|_| recovery.recover(&error, &ctx).retry_after.unwrap())
        .collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400)
        ]
    );
}
