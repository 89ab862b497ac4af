//! Goal-stack planner hosted in a task node
//!
//! `start` creates and pushes the root goal, `work` resumes the planner, and
//! `evidence` messages feed `gather_info` goals. Failures go through error
//! recovery: retries roll shared state back and reschedule `work`, anything
//! else fails the node with a full report.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::engine::{GoalStackPlanner, StepOutcome};
use super::goal::{EvidenceUpdate, GoalId, GoalSpec, GoalStatus};
use crate::error::AgentError;
use crate::recovery::{ErrorRecovery, RecoveryAction, RecoveryContext, StateSnapshot};
use crate::task::{Artifact, ArtifactKind, FailureReport, Message, Origin, Strategy, TaskContext};

pub const GOAL_STACK_STRATEGY: &str = "GoalStackStrategy";

pub struct GoalStackStrategy {
    planner: GoalStackPlanner,
    recovery: Arc<ErrorRecovery>,
    root_spec: Option<GoalSpec>,
    root: Option<GoalId>,
}

impl GoalStackStrategy {
    pub fn new(planner: GoalStackPlanner, recovery: Arc<ErrorRecovery>, root: GoalSpec) -> Self {
        Self {
            planner,
            recovery,
            root_spec: Some(root),
            root: None,
        }
    }

    pub fn planner(&self) -> &GoalStackPlanner {
        &self.planner
    }

    pub fn root(&self) -> Option<GoalId> {
        self.root
    }

    fn recovery_context(&self, ctx: &TaskContext) -> RecoveryContext {
        RecoveryContext::new(ctx.id().as_str())
            .with_strategy(GOAL_STACK_STRATEGY)
            .with_metadata(json!({
                "root_goal": self.root,
                "stack": self.planner.ledger().stack(),
            }))
            .with_execution_state(ctx.execution())
            .scoped_to_task()
    }

    async fn start(&mut self, ctx: &TaskContext, payload: Value) -> Result<()> {
        if let Some(mut spec) = self.root_spec.take() {
            if !payload.is_null() {
                spec.context = payload;
            }
            let id = self.planner.create_goal(spec)?;
            self.planner.push(id)?;
            self.root = Some(id);
            ctx.log("system", format!("Planning root goal {}", id));
        }
        self.advance(ctx).await
    }

    async fn receive_evidence(&mut self, ctx: &TaskContext, payload: Value) -> Result<()> {
        let update = match EvidenceUpdate::from_payload(&payload) {
            Ok(update) => update,
            Err(e) => {
                warn!(task_id = %ctx.id(), error = %e, "Ignoring invalid evidence");
                return Ok(());
            }
        };

        let (goal, key) = (update.goal, update.key.clone());
        if let Err(e) = self.planner.add_evidence(goal, &key, update.value) {
            warn!(task_id = %ctx.id(), error = %e, "Evidence for unknown goal");
            return Ok(());
        }
        ctx.log("user", format!("Evidence '{}' for goal {}", key, goal));
        self.advance(ctx).await
    }

    /// Run the planner until it settles, then act on the outcome
    async fn advance(&mut self, ctx: &TaskContext) -> Result<()> {
        if ctx.is_terminal() {
            return Ok(());
        }

        let recovery_ctx = self.recovery_context(ctx);
        let snapshot = self.recovery.create_state_snapshot(&recovery_ctx).await?;

        let result = self.planner.run().await;
        if ctx.is_terminal() {
            debug!(task_id = %ctx.id(), "Node ended while planning, dropping outcome");
            return Ok(());
        }

        let error = match result {
            Ok(StepOutcome::Idle) => return self.finish(ctx),
            Ok(StepOutcome::Question {
                goal,
                key,
                question,
            }) => {
                self.ask(ctx, goal, &key, &question);
                return Ok(());
            }
            Ok(StepOutcome::AwaitingInput(goal)) => {
                debug!(task_id = %ctx.id(), goal = %goal, "Waiting for evidence");
                return Ok(());
            }
            Ok(StepOutcome::Achieved(_) | StepOutcome::Expanded { .. }) => {
                ctx.schedule(Message::work(), Duration::ZERO);
                return Ok(());
            }
            Ok(StepOutcome::ToolMissing { tool, .. }) => {
                AgentError::task(format!("Tool not found: {}", tool))
            }
            Ok(StepOutcome::Unsatisfied(goal)) => AgentError::task(format!(
                "Goal {} is not satisfied by its tool result",
                goal
            ))
            .with_retryable(true),
            Ok(StepOutcome::Abandoned { goal, reason }) => {
                AgentError::planning(format!("Goal {} abandoned: {}", goal, reason))
            }
            Err(e) => e,
        };

        self.handle_failure(ctx, error, &recovery_ctx, &snapshot).await;
        Ok(())
    }

    fn ask(&self, ctx: &TaskContext, goal: GoalId, key: &str, question: &str) {
        ctx.log("assistant", question);
        let payload = json!({ "goal": goal, "key": key, "question": question });
        if let Err(e) = ctx.send_to_parent(Message::custom("question", payload)) {
            warn!(task_id = %ctx.id(), error = %e, "Could not deliver question");
        }
    }

    fn finish(&self, ctx: &TaskContext) -> Result<()> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let ledger = self.planner.ledger();

        match ledger.status(root) {
            Some(GoalStatus::Achieved) => {
                let trace = serde_json::to_value(ledger.trace())?;
                let evidence = ledger
                    .get(root)
                    .map(|g| Value::Object(g.evidence.clone().into_iter().collect()))
                    .unwrap_or(Value::Null);
                ctx.complete_with_artifacts(
                    vec![(
                        "goal_trace".to_string(),
                        Artifact::new(trace, "Every goal of the planning session", ArtifactKind::Trace),
                    )],
                    json!({ "goal": root, "status": "achieved", "evidence": evidence }),
                );
                info!(task_id = %ctx.id(), goal = %root, goals = ledger.len(), "Planning complete");
            }
            status => {
                let status = status.map(|s| s.as_str()).unwrap_or("missing");
                ctx.fail(FailureReport::new(
                    format!("Root goal {} ended {}", root, status),
                    "Planning ended without achieving the root goal",
                ));
            }
        }
        Ok(())
    }

    async fn handle_failure(
        &self,
        ctx: &TaskContext,
        error: AgentError,
        recovery_ctx: &RecoveryContext,
        snapshot: &StateSnapshot,
    ) {
        let outcome = self.recovery.recover(&error, recovery_ctx);

        if outcome.action == RecoveryAction::RetryTask {
            if !self.recovery.rollback_state(snapshot, recovery_ctx).await {
                warn!(task_id = %ctx.id(), "Retrying without rollback");
            }
            let delay = outcome.retry_after.unwrap_or_default();
            ctx.log(
                "system",
                format!("Retrying in {}ms after: {}", delay.as_millis(), error),
            );
            ctx.schedule(Message::work(), delay);
            return;
        }

        let partial = self
            .recovery
            .recover_partial_results(self.planner.ledger(), &error);
        match serde_json::to_value(&partial) {
            Ok(value) => ctx.set_artifact(
                "partial_result",
                Artifact::new(value, "Goals settled before the failure", ArtifactKind::Json),
            ),
            Err(e) => warn!(task_id = %ctx.id(), error = %e, "Could not store partial result"),
        }

        let mut report = FailureReport::new(error.to_string(), "Goal-stack planning failed");
        report.classification = Some(outcome.classification);
        report.reason = outcome.reason;
        report.fallback_strategy = outcome.fallback_strategy;
        ctx.fail(report);
    }
}

#[async_trait]
impl Strategy for GoalStackStrategy {
    fn name(&self) -> &str {
        GOAL_STACK_STRATEGY
    }

    async fn on_message(&mut self, ctx: &TaskContext, origin: Origin, message: Message) -> Result<()> {
        match message {
            Message::Start { payload } => self.start(ctx, payload).await,
            Message::Work { .. } => self.advance(ctx).await,
            Message::Custom { kind, payload } if kind == "evidence" => {
                self.receive_evidence(ctx, payload).await
            }
            Message::Abort { reason } => {
                info!(task_id = %ctx.id(), reason = %reason, "Planner aborted");
                Ok(())
            }
            other => {
                debug!(task_id = %ctx.id(), message = other.kind(), ?origin, "Ignoring message");
                Ok(())
            }
        }
    }
}
