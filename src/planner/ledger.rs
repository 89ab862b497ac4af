//! Goal Ledger
//!
//! The set of all goals plus a LIFO stack of goal ids. Pure data: no I/O, no
//! oracle calls. Goals are never removed, so the whole session can be
//! serialized as a trace.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use super::goal::{Decomposition, Goal, GoalId, GoalSpec, GoalStatus};
use crate::error::PlannerError;
use crate::recovery::{ExecutionContext, SubtaskRecord};

#[derive(Debug, Default)]
pub struct GoalLedger {
    goals: HashMap<GoalId, Goal>,
    stack: Vec<GoalId>,
    next_id: u64,
}

/// Serializable view of the ledger
#[derive(Debug, Clone, Serialize)]
pub struct GoalTrace {
    pub goals: Vec<Goal>,
    pub stack: Vec<GoalId>,
}

impl GoalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `pending` goal. It is not pushed.
    pub fn create_goal(&mut self, spec: GoalSpec) -> Result<GoalId, PlannerError> {
        if let Some(parent) = spec.parent {
            if !self.goals.contains_key(&parent) {
                return Err(PlannerError::UnknownGoal(parent.to_string()));
            }
        }

        self.next_id += 1;
        let id = GoalId(self.next_id);
        let now = Utc::now();
        self.goals.insert(
            id,
            Goal {
                id,
                gloss: spec.gloss,
                predicate: spec.predicate,
                parent: spec.parent,
                decomposition: None,
                status: GoalStatus::Pending,
                done_when: spec.done_when,
                evidence: spec.evidence,
                provenance: spec.provenance,
                context: spec.context,
                blocked_reason: None,
                question_asked: false,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: GoalId) -> Option<&Goal> {
        self.goals.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: GoalId) -> Result<&mut Goal, PlannerError> {
        self.goals
            .get_mut(&id)
            .ok_or_else(|| PlannerError::UnknownGoal(id.to_string()))
    }

    pub fn status(&self, id: GoalId) -> Option<GoalStatus> {
        self.goals.get(&id).map(|g| g.status)
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Push onto the stack; a goal may be stacked only once at a time
    pub fn push(&mut self, id: GoalId) -> Result<(), PlannerError> {
        if !self.goals.contains_key(&id) {
            return Err(PlannerError::UnknownGoal(id.to_string()));
        }
        if self.stack.contains(&id) {
            return Err(PlannerError::AlreadyStacked(id.to_string()));
        }
        self.stack.push(id);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<GoalId> {
        self.stack.pop()
    }

    pub fn peek(&self) -> Option<GoalId> {
        self.stack.last().copied()
    }

    pub fn stack(&self) -> &[GoalId] {
        &self.stack
    }

    pub fn stack_is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn is_stacked(&self, id: GoalId) -> bool {
        self.stack.contains(&id)
    }

    /// Remove `id` from wherever it sits on the stack
    pub(crate) fn unstack(&mut self, id: GoalId) -> bool {
        if self.peek() == Some(id) {
            self.stack.pop();
            return true;
        }
        match self.stack.iter().position(|g| *g == id) {
            Some(pos) => {
                self.stack.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Insert or overwrite one evidence entry
    pub fn add_evidence(&mut self, id: GoalId, key: &str, value: Value) -> Result<(), PlannerError> {
        let goal = self.get_mut(id)?;
        goal.evidence.insert(key.to_string(), value);
        goal.touch();
        Ok(())
    }

    /// Record a goal's decomposition. Happens at most once per goal.
    pub(crate) fn decompose(
        &mut self,
        id: GoalId,
        decomposition: Decomposition,
    ) -> Result<(), PlannerError> {
        let goal = self.get_mut(id)?;
        if goal.decomposition.is_some() {
            return Err(PlannerError::AlreadyDecomposed(id.to_string()));
        }
        goal.decomposition = Some(decomposition);
        goal.touch();
        Ok(())
    }

    pub(crate) fn set_status(&mut self, id: GoalId, status: GoalStatus) -> bool {
        self.goals
            .get_mut(&id)
            .map(|g| g.set_status(status))
            .unwrap_or(false)
    }

    pub fn children(&self, id: GoalId) -> Vec<GoalId> {
        self.goals
            .get(&id)
            .and_then(|g| g.decomposition.as_ref())
            .map(|d| d.children.clone())
            .unwrap_or_default()
    }

    /// Every goal below `id`, depth first
    pub fn descendants(&self, id: GoalId) -> Vec<GoalId> {
        let mut out = Vec::new();
        let mut pending = self.children(id);
        while let Some(next) = pending.pop() {
            pending.extend(self.children(next));
            out.push(next);
        }
        out
    }

    /// `id` and its ancestors, nearest first
    pub fn lineage(&self, id: GoalId) -> Vec<GoalId> {
        let mut out = Vec::new();
        let mut current = Some(id);
        while let Some(goal) = current.and_then(|c| self.goals.get(&c)) {
            out.push(goal.id);
            current = goal.parent;
        }
        out
    }

    pub fn trace(&self) -> GoalTrace {
        let mut goals: Vec<Goal> = self.goals.values().cloned().collect();
        goals.sort_by_key(|g| g.id);
        GoalTrace {
            goals,
            stack: self.stack.clone(),
        }
    }

    fn leaves_where(&self, keep: impl Fn(GoalStatus) -> bool) -> Vec<SubtaskRecord> {
        let mut leaves: Vec<&Goal> = self
            .goals
            .values()
            .filter(|g| !g.is_decomposed() && keep(g.status))
            .collect();
        leaves.sort_by_key(|g| g.id);
        leaves
            .into_iter()
            .map(|g| SubtaskRecord {
                id: g.id.to_string(),
                description: g.gloss.clone(),
                result: (!g.evidence.is_empty())
                    .then(|| Value::Object(g.evidence.clone().into_iter().collect())),
            })
            .collect()
    }
}

/// Leaf goals seen as subtasks for partial-result recovery
impl ExecutionContext for GoalLedger {
    fn completed_subtasks(&self) -> Vec<SubtaskRecord> {
        self.leaves_where(|s| s == GoalStatus::Achieved)
    }

    fn pending_subtasks(&self) -> Vec<SubtaskRecord> {
        self.leaves_where(|s| !s.is_terminal())
    }

    fn failed_subtasks(&self) -> Vec<SubtaskRecord> {
        self.leaves_where(|s| s == GoalStatus::Abandoned)
    }
}
