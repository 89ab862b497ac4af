//! Goal-Stack Planner Integration Tests
//!
//! AND/OR completion rules and evidence gating through the public API.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use tasktree::planner::{DecompositionPlan, SubgoalSpec, Verdict};
use tasktree::{
    Condition, DecompositionKind, Goal, GoalSpec, GoalStackPlanner, GoalStatus, PlannerConfig,
    PlanningOracle, Predicate, StepOutcome, ToolRegistry,
};

/// Decomposes every composite goal with the same plan
struct FixedPlan(DecompositionPlan);

#[async_trait]
impl PlanningOracle for FixedPlan {
    async fn evaluate(
        &self,
        _predicate: &str,
        _evidence: &HashMap<String, Value>,
        _context: &Value,
    ) -> Result<Verdict> {
        Ok(Verdict::no("never"))
    }

    async fn decompose(&self, _goal: &Goal) -> Result<DecompositionPlan> {
        Ok(self.0.clone())
    }
}

fn planner(plan: DecompositionPlan) -> GoalStackPlanner {
    GoalStackPlanner::new(
        Arc::new(FixedPlan(plan)),
        Arc::new(ToolRegistry::new()),
        PlannerConfig::default(),
    )
}

fn child(succeeds: bool, n: usize) -> SubgoalSpec {
    let predicate = if succeeds {
        Predicate::Execute
    } else {
        Predicate::Unknown
    };
    SubgoalSpec::new(&format!("step {}", n), predicate)
}

#[tokio::test]
async fn test_and_or_rules_over_all_child_outcomes() {
    for kind in [DecompositionKind::And, DecompositionKind::Or] {
        for mask in 0u8..8 {
            let outcomes: Vec<bool> = (0..3).map(|i| mask & (1 << i) != 0).collect();
            let plan = DecompositionPlan {
                kind,
                subgoals: outcomes
                    .iter()
                    .enumerate()
                    .map(|(i, ok)| child(*ok, i))
                    .collect(),
            };

            let mut planner = planner(plan);
            let root = planner
                .create_goal(GoalSpec::new("root", Predicate::Composite))
                .unwrap();
            planner.push(root).unwrap();
            planner.run().await.unwrap();

            let expected = match kind {
                DecompositionKind::And => outcomes.iter().all(|ok| *ok),
                DecompositionKind::Or => outcomes.iter().any(|ok| *ok),
            };
            let status = planner.ledger().status(root).unwrap();
            assert_eq!(
                status == GoalStatus::Achieved,
                expected,
                "{:?} with outcomes {:?} ended {:?}",
                kind,
                outcomes,
                status
            );
            assert!(status.is_terminal());
            assert!(planner.ledger().stack_is_empty());
        }
    }
}

#[tokio::test]
async fn test_goal_waits_for_evidence() {
    let mut planner = planner(DecompositionPlan {
        kind: DecompositionKind::And,
        subgoals: vec![],
    });
    let goal = planner
        .create_goal(
            GoalSpec::new("needs x", Predicate::Composite).done_when(Condition::has_evidence("x")),
        )
        .unwrap();
    planner.push(goal).unwrap();

    // Empty decomposition is a planning error, and the goal stays put
    assert!(planner.process_goal_stack().await.is_err());
    assert_ne!(planner.ledger().status(goal), Some(GoalStatus::Achieved));

    planner.add_evidence(goal, "x", json!(true)).unwrap();
    assert_eq!(
        planner.process_goal_stack().await.unwrap(),
        StepOutcome::Achieved(goal)
    );
    assert!(planner.ledger().stack_is_empty());
}

#[tokio::test]
async fn test_pop_on_empty_stack() {
    let mut planner = planner(DecompositionPlan {
        kind: DecompositionKind::Or,
        subgoals: vec![],
    });
    assert_eq!(planner.pop(), None);
    assert_eq!(planner.process_goal_stack().await.unwrap(), StepOutcome::Idle);
}

#[tokio::test]
async fn test_trace_serializes_whole_session() {
    let mut planner = planner(DecompositionPlan {
        kind: DecompositionKind::And,
        subgoals: vec![child(true, 0), child(true, 1)],
    });
    let root = planner
        .create_goal(
            GoalSpec::new("root", Predicate::Composite).with_provenance(json!({"source": "test"})),
        )
        .unwrap();
    planner.push(root).unwrap();
    assert_eq!(planner.run().await.unwrap(), StepOutcome::Idle);

    let trace = serde_json::to_value(planner.ledger().trace()).unwrap();
    let goals = trace["goals"].as_array().unwrap();
    assert_eq!(goals.len(), 3);
    assert_eq!(goals[0]["decomposition"]["kind"], "AND");
    assert_eq!(goals[0]["provenance"]["source"], "test");
    assert_eq!(goals[1]["predicate"]["kind"], "execute");
}
