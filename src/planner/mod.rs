//! Goal-stack planning
//!
//! Abstract goals decompose into AND/OR subgoal trees held in a ledger;
//! completion propagates from leaves to the root.

mod engine;
mod goal;
mod ledger;
mod oracle;
mod strategy;

pub use engine::{GoalStackPlanner, StepOutcome};
pub use goal::{
    Condition, Decomposition, DecompositionKind, EvidenceUpdate, Goal, GoalId, GoalSpec,
    GoalStatus, Predicate,
};
pub use ledger::{GoalLedger, GoalTrace};
pub use oracle::{DecompositionPlan, PlanningOracle, SubgoalSpec, Verdict};
pub use strategy::{GoalStackStrategy, GOAL_STACK_STRATEGY};
