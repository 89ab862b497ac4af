//! Recovery attempt history
//!
//! One time-ordered row per `classification:task_id` key. Counting and
//! pruning walk from the oldest entry, so both stop early.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::classify::ErrorClass;

/// One recorded recovery decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub classification: ErrorClass,
}

impl RecoveryAttempt {
    pub fn now(success: bool, classification: ErrorClass) -> Self {
        Self {
            timestamp: Utc::now(),
            success,
            classification,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecoveryHistory {
    rows: HashMap<String, VecDeque<RecoveryAttempt>>,
}

impl RecoveryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping the row sorted by timestamp
    pub fn record(&mut self, key: &str, attempt: RecoveryAttempt) {
        let row = self.rows.entry(key.to_string()).or_default();
        let pos = row
            .iter()
            .rposition(|a| a.timestamp <= attempt.timestamp)
            .map(|p| p + 1)
            .unwrap_or(0);
        row.insert(pos, attempt);
    }

    /// Attempts for `key` at or after `cutoff`
    pub fn attempts_since(&self, key: &str, cutoff: DateTime<Utc>) -> usize {
        self.rows
            .get(key)
            .map(|row| row.iter().rev().take_while(|a| a.timestamp >= cutoff).count())
            .unwrap_or(0)
    }

    /// Outcome of the newest attempt for `key`
    pub fn last_outcome(&self, key: &str) -> Option<bool> {
        self.rows.get(key).and_then(|row| row.back()).map(|a| a.success)
    }

    /// Drop every attempt older than `cutoff`; returns how many were removed
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.rows.retain(|_, row| {
            while row.front().is_some_and(|a| a.timestamp < cutoff) {
                row.pop_front();
                removed += 1;
            }
            !row.is_empty()
        });
        removed
    }

    pub fn total(&self) -> usize {
        self.rows.values().map(|row| row.len()).sum()
    }

    pub fn successful(&self) -> usize {
        self.rows
            .values()
            .flat_map(|row| row.iter())
            .filter(|a| a.success)
            .count()
    }

    pub fn attempts(&self, key: &str) -> Vec<RecoveryAttempt> {
        self.rows
            .get(key)
            .map(|row| row.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Full copy, for persistence by the embedder
    pub fn to_map(&self) -> HashMap<String, Vec<RecoveryAttempt>> {
        self.rows
            .iter()
            .map(|(k, row)| (k.clone(), row.iter().cloned().collect()))
            .collect()
    }
}
