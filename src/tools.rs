//! Tool registry seam
//!
//! The planner resolves `use_tool` goals by name here and stores what a tool
//! returns as goal evidence. A missing name is a lookup miss, never a panic.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// What one tool run hands back to the planner
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Short human-readable account of the run
    pub summary: String,
    /// Structured evidence; the summary stands in when absent
    pub evidence: Option<Value>,
    pub elapsed: Duration,
}

impl ToolOutput {
    pub fn text(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            evidence: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn evidence(summary: impl Into<String>, evidence: Value) -> Self {
        Self {
            evidence: Some(evidence),
            ..Self::text(summary)
        }
    }

    /// Value recorded under the tool's evidence key
    pub fn evidence_value(&self) -> Value {
        self.evidence
            .clone()
            .unwrap_or_else(|| Value::String(self.summary.clone()))
    }
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send>>;

/// A named async action the planner can invoke
pub struct Tool {
    name: String,
    description: String,
    run: Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>,
}

impl Tool {
    pub fn new<F, Fut>(name: &str, description: &str, run: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            run: Arc::new(move |args| Box::pin(run(args))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run with the goal's arguments, timing the call
    pub async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let started = Instant::now();
        let mut output = (self.run)(args).await?;
        output.elapsed = started.elapsed();
        debug!(tool = %self.name, elapsed_ms = output.elapsed.as_millis() as u64, "Tool finished");
        Ok(output)
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Tool) {
        info!(tool = %tool.name, "Registered tool");
        self.tools.insert(tool.name.clone(), Arc::new(tool));
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Evidence key under which a tool's result is stored: lowercase, with
/// runs of non-alphanumerics collapsed to `_`.
pub fn tool_evidence_key(tool_name: &str) -> String {
    let mut key = String::with_capacity(tool_name.len());
    let mut last_sep = true;
    for c in tool_name.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            key.push('_');
            last_sep = true;
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}
