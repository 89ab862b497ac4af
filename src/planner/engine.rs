//! Goal-Stack Planner
//!
//! Step function over the [`GoalLedger`]. Only the top of the stack is ever
//! processed:
//! - composite goals expand once into AND/OR subgoals
//! - leaf goals run a tool, ask a question or finish immediately
//!
//! Achievement propagates up the ancestor chain as soon as a child is
//! achieved. Abandonment does the same for parents that can no longer succeed.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::goal::{
    Condition, Decomposition, DecompositionKind, Goal, GoalId, GoalSpec, GoalStatus, Predicate,
};
use super::ledger::GoalLedger;
use super::oracle::{DecompositionPlan, PlanningOracle};
use crate::config::PlannerConfig;
use crate::error::{AgentError, PlannerError};
use crate::tools::{tool_evidence_key, ToolRegistry};

/// Result of one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The stack is empty
    Idle,
    /// The goal (and possibly some ancestors) reached `achieved`
    Achieved(GoalId),
    /// Subgoals were pushed for `goal`
    Expanded { goal: GoalId, children: Vec<GoalId> },
    /// A `gather_info` goal wants input
    Question {
        goal: GoalId,
        key: String,
        question: String,
    },
    /// Still waiting for evidence that was already asked for
    AwaitingInput(GoalId),
    /// The goal's tool is not registered; the goal is blocked
    ToolMissing { goal: GoalId, tool: String },
    /// The tool ran but the goal's conditions still fail
    Unsatisfied(GoalId),
    /// `goal` is the highest goal abandoned by this step
    Abandoned { goal: GoalId, reason: String },
}

impl StepOutcome {
    /// Whether `run` keeps stepping after this outcome
    pub fn is_progress(&self) -> bool {
        matches!(self, Self::Achieved(_) | Self::Expanded { .. })
    }
}

pub struct GoalStackPlanner {
    ledger: GoalLedger,
    oracle: Arc<dyn PlanningOracle>,
    tools: Arc<ToolRegistry>,
    config: PlannerConfig,
}

impl GoalStackPlanner {
    pub fn new(
        oracle: Arc<dyn PlanningOracle>,
        tools: Arc<ToolRegistry>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            ledger: GoalLedger::new(),
            oracle,
            tools,
            config,
        }
    }

    pub fn ledger(&self) -> &GoalLedger {
        &self.ledger
    }

    pub fn goal(&self, id: GoalId) -> Result<&Goal, PlannerError> {
        self.ledger
            .get(id)
            .ok_or_else(|| PlannerError::UnknownGoal(id.to_string()))
    }

    pub fn create_goal(&mut self, spec: GoalSpec) -> Result<GoalId, PlannerError> {
        self.ledger.create_goal(spec)
    }

    pub fn push(&mut self, id: GoalId) -> Result<(), PlannerError> {
        self.ledger.push(id)
    }

    pub fn pop(&mut self) -> Option<GoalId> {
        self.ledger.pop()
    }

    pub fn peek(&self) -> Option<GoalId> {
        self.ledger.peek()
    }

    pub fn add_evidence(
        &mut self,
        id: GoalId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), PlannerError> {
        self.ledger.add_evidence(id, key, value)?;
        debug!(goal = %id, key, "Evidence added");
        Ok(())
    }

    /// Process the top of the stack once
    pub async fn process_goal_stack(&mut self) -> Result<StepOutcome, AgentError> {
        let Some(id) = self.ledger.peek() else {
            return Ok(StepOutcome::Idle);
        };

        let goal = self.ledger.get_mut(id)?;
        if goal.status == GoalStatus::Pending {
            goal.set_status(GoalStatus::Active);
            debug!(goal = %id, gloss = %goal.gloss, "Goal activated");
        }

        if self.conditions_satisfied(id).await {
            self.achieve(id);
            return Ok(StepOutcome::Achieved(id));
        }

        let goal = self.goal(id)?;
        if goal.is_decomposed() {
            return self.settle_decomposed(id);
        }

        match goal.predicate.clone() {
            Predicate::Composite => {
                let children = self.expand(id).await?;
                Ok(StepOutcome::Expanded { goal: id, children })
            }
            Predicate::UseTool { tool, args } => self.use_tool(id, &tool, args).await,
            Predicate::GatherInfo { key, prompt } => {
                self.gather_info(id, &key, prompt.as_deref()).await
            }
            Predicate::Execute => {
                self.achieve(id);
                Ok(StepOutcome::Achieved(id))
            }
            Predicate::Unknown => Ok(self.abandon(id, "Unrecognized predicate")),
        }
    }

    /// Step until the stack empties or the planner needs something from outside.
    ///
    /// Abandoned subgoals do not stop the run unless the abandonment reaches a root goal.
    pub async fn run(&mut self) -> Result<StepOutcome, AgentError> {
        for _ in 0..self.config.max_steps {
            let outcome = self.process_goal_stack().await?;
            let subgoal_abandoned = matches!(
                &outcome,
                StepOutcome::Abandoned { goal, .. }
                    if self.ledger.get(*goal).and_then(|g| g.parent).is_some()
            );
            if !outcome.is_progress() && !subgoal_abandoned {
                return Ok(outcome);
            }
        }

        Err(AgentError::planning(format!(
            "Planner did not settle within {} steps",
            self.config.max_steps
        )))
    }

    /// Every condition holds. An empty list never holds; oracle errors count as "no".
    async fn conditions_satisfied(&self, id: GoalId) -> bool {
        let Some(goal) = self.ledger.get(id) else {
            return false;
        };
        if goal.done_when.is_empty() {
            return false;
        }

        for condition in &goal.done_when {
            let holds = match condition {
                Condition::HasEvidence { key } => goal.has_evidence(key),
                Condition::PredicateTrue { predicate } => {
                    match self
                        .oracle
                        .evaluate(predicate, &goal.evidence, &goal.context)
                        .await
                    {
                        Ok(verdict) => {
                            debug!(
                                goal = %id,
                                predicate = predicate.as_str(),
                                satisfied = verdict.satisfied,
                                reasoning = %verdict.reasoning,
                                "Predicate evaluated"
                            );
                            verdict.satisfied
                        }
                        Err(e) => {
                            warn!(
                                goal = %id,
                                predicate = predicate.as_str(),
                                error = %e,
                                "Predicate evaluation failed, treating as unsatisfied"
                            );
                            false
                        }
                    }
                }
            };
            if !holds {
                return false;
            }
        }

        true
    }

    /// Decompose a composite goal and push its subgoals so the first declared
    /// one is on top. Rejected if the goal is already decomposed.
    pub async fn expand(&mut self, id: GoalId) -> Result<Vec<GoalId>, AgentError> {
        let goal = self.goal(id)?;
        if goal.is_decomposed() {
            return Err(PlannerError::AlreadyDecomposed(id.to_string()).into());
        }

        let plan = self.oracle.decompose(goal).await.map_err(AgentError::from)?;
        if plan.subgoals.is_empty() {
            return Err(AgentError::planning(format!(
                "Decomposition of goal {} produced no subgoals",
                id
            )));
        }
        self.check_cycles(id, &plan)?;

        let context = self.goal(id)?.context.clone();
        let kind = plan.kind;
        let mut children = Vec::with_capacity(plan.subgoals.len());
        for sub in plan.subgoals {
            let spec = GoalSpec {
                gloss: sub.gloss,
                predicate: sub.predicate,
                parent: Some(id),
                done_when: sub.done_when,
                evidence: HashMap::new(),
                provenance: sub.provenance,
                context: context.clone(),
            };
            children.push(self.ledger.create_goal(spec)?);
        }

        self.ledger.decompose(
            id,
            Decomposition {
                kind,
                children: children.clone(),
            },
        )?;
        for child in children.iter().rev() {
            self.ledger.push(*child)?;
        }
        self.ledger.set_status(id, GoalStatus::Blocked);

        info!(goal = %id, kind = ?kind, subgoals = children.len(), "Goal expanded");
        Ok(children)
    }

    /// A subgoal identical to the goal or one of its ancestors would loop forever
    fn check_cycles(&self, id: GoalId, plan: &DecompositionPlan) -> Result<(), AgentError> {
        for ancestor in self.ledger.lineage(id) {
            let Some(ancestor) = self.ledger.get(ancestor) else {
                continue;
            };
            if let Some(sub) = plan
                .subgoals
                .iter()
                .find(|s| s.gloss == ancestor.gloss && s.predicate == ancestor.predicate)
            {
                return Err(AgentError::planning(format!(
                    "Circular dependency: goal {} decomposes into '{}'",
                    id, sub.gloss
                )));
            }
        }
        Ok(())
    }

    async fn use_tool(
        &mut self,
        id: GoalId,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<StepOutcome, AgentError> {
        let Some(tool) = self.tools.get_tool(tool_name) else {
            let goal = self.ledger.get_mut(id)?;
            goal.set_status(GoalStatus::Blocked);
            goal.blocked_reason = Some(format!("Tool not found: {}", tool_name));
            goal.touch();
            warn!(goal = %id, tool = tool_name, "Tool not registered, goal blocked");
            return Ok(StepOutcome::ToolMissing {
                goal: id,
                tool: tool_name.to_string(),
            });
        };

        let output = tool.execute(args).await.map_err(|e| match e.downcast::<AgentError>() {
            Ok(agent) => agent,
            Err(e) => AgentError::task(format!("Tool '{}' failed: {}", tool_name, e)),
        })?;

        let key = tool_evidence_key(tool_name);
        self.ledger.add_evidence(id, &key, output.evidence_value())?;
        let goal = self.ledger.get_mut(id)?;
        goal.blocked_reason = None;
        if goal.status == GoalStatus::Blocked {
            goal.set_status(GoalStatus::Active);
        }
        debug!(
            goal = %id,
            tool = tool_name,
            key = %key,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Tool result stored as evidence"
        );

        let done = self.goal(id)?.done_when.is_empty() || self.conditions_satisfied(id).await;
        if done {
            self.achieve(id);
            Ok(StepOutcome::Achieved(id))
        } else {
            Ok(StepOutcome::Unsatisfied(id))
        }
    }

    async fn gather_info(
        &mut self,
        id: GoalId,
        key: &str,
        prompt: Option<&str>,
    ) -> Result<StepOutcome, AgentError> {
        let goal = self.goal(id)?;
        if goal.has_evidence(key) {
            self.achieve(id);
            return Ok(StepOutcome::Achieved(id));
        }
        if goal.question_asked {
            return Ok(StepOutcome::AwaitingInput(id));
        }

        let question = match self.oracle.formulate_question(goal, key, prompt).await {
            Ok(question) => question,
            Err(e) => {
                warn!(goal = %id, key, error = %e, "Could not formulate question, using prompt");
                prompt
                    .map(String::from)
                    .unwrap_or_else(|| format!("Please provide '{}'", key))
            }
        };

        let goal = self.ledger.get_mut(id)?;
        goal.question_asked = true;
        goal.touch();
        info!(goal = %id, key, "Asking for input");

        Ok(StepOutcome::Question {
            goal: id,
            key: key.to_string(),
            question,
        })
    }

    /// A decomposed goal is back on top: resume open children, or settle it
    fn settle_decomposed(&mut self, id: GoalId) -> Result<StepOutcome, AgentError> {
        let children = self.ledger.children(id);
        let open: Vec<GoalId> = children
            .iter()
            .copied()
            .filter(|c| {
                !self.ledger.status(*c).is_some_and(|s| s.is_terminal()) && !self.ledger.is_stacked(*c)
            })
            .collect();

        if !open.is_empty() {
            for child in open.iter().rev() {
                self.ledger.push(*child)?;
            }
            debug!(goal = %id, resumed = open.len(), "Resumed open subgoals");
            return Ok(StepOutcome::Expanded {
                goal: id,
                children: open,
            });
        }

        if self.decomposition_satisfied(id) {
            self.achieve(id);
            return Ok(StepOutcome::Achieved(id));
        }

        Ok(self.abandon(id, "Subgoals finished without satisfying the decomposition"))
    }

    fn decomposition_satisfied(&self, id: GoalId) -> bool {
        let Some(decomposition) = self.ledger.get(id).and_then(|g| g.decomposition.as_ref()) else {
            return false;
        };
        let achieved = decomposition
            .children
            .iter()
            .filter(|c| self.ledger.status(**c) == Some(GoalStatus::Achieved))
            .count();

        match decomposition.kind {
            DecompositionKind::And => achieved == decomposition.children.len(),
            DecompositionKind::Or => achieved > 0,
        }
    }

    fn achieve(&mut self, id: GoalId) {
        self.ledger.set_status(id, GoalStatus::Achieved);
        self.ledger.unstack(id);
        info!(goal = %id, "Goal achieved");
        self.propagate_achievement(id);
    }

    /// Walk up from a newly achieved goal, achieving every parent whose
    /// AND/OR rule is now met
    fn propagate_achievement(&mut self, child: GoalId) {
        let mut current = child;
        while let Some(parent) = self.ledger.get(current).and_then(|g| g.parent) {
            let Some(kind) = self.open_decomposition_kind(parent) else {
                break;
            };
            if !self.decomposition_satisfied(parent) {
                break;
            }

            if kind == DecompositionKind::Or {
                self.prune_open_children(parent);
            }
            self.ledger.set_status(parent, GoalStatus::Achieved);
            self.ledger.unstack(parent);
            info!(goal = %parent, via = %current, kind = ?kind, "Goal achieved through subgoals");
            current = parent;
        }
    }

    /// Mark a goal abandoned and walk up, abandoning parents that can no
    /// longer be achieved. Returns the highest abandoned goal.
    fn abandon(&mut self, id: GoalId, reason: &str) -> StepOutcome {
        self.ledger.set_status(id, GoalStatus::Abandoned);
        self.ledger.unstack(id);
        self.prune_open_children(id);
        warn!(goal = %id, reason, "Goal abandoned");

        let mut current = id;
        while let Some(parent) = self.ledger.get(current).and_then(|g| g.parent) {
            let Some(kind) = self.open_decomposition_kind(parent) else {
                break;
            };
            let doomed = match kind {
                DecompositionKind::And => true,
                DecompositionKind::Or => self
                    .ledger
                    .children(parent)
                    .iter()
                    .all(|c| self.ledger.status(*c).is_some_and(|s| s.is_terminal())),
            };
            if !doomed {
                break;
            }

            self.prune_open_children(parent);
            self.ledger.set_status(parent, GoalStatus::Abandoned);
            self.ledger.unstack(parent);
            warn!(goal = %parent, via = %current, "Goal abandoned, subgoal cannot succeed");
            current = parent;
        }

        StepOutcome::Abandoned {
            goal: current,
            reason: reason.to_string(),
        }
    }

    /// Decomposition kind of a live, decomposed goal
    fn open_decomposition_kind(&self, id: GoalId) -> Option<DecompositionKind> {
        let goal = self.ledger.get(id)?;
        if goal.is_terminal() {
            return None;
        }
        goal.decomposition.as_ref().map(|d| d.kind)
    }

    /// Abandon and unstack every unfinished goal below `id`
    fn prune_open_children(&mut self, id: GoalId) {
        for goal in self.ledger.descendants(id) {
            if self.ledger.set_status(goal, GoalStatus::Abandoned) {
                self.ledger.unstack(goal);
                debug!(goal = %goal, parent = %id, "Pruned subgoal");
            }
        }
    }
}
