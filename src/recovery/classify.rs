//! Error classification
//!
//! Pure mapping from an [`AgentError`] to a fixed taxonomy. Message patterns
//! win over the error variant, so a `Task` error saying "Tool not found" is
//! `ToolMissing` and a `Resource` error saying "ECONNREFUSED" is `Network`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Classification of errors for recovery decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// A requested tool is not registered
    ToolMissing,
    /// The plan references itself
    CircularDependency,
    /// Connection-level failure
    Network,
    /// Throttled by an upstream
    RateLimit,
    /// Host resources exhausted or internal fault
    System,
    /// A resource failed without a more specific signature
    Resource,
    /// A task failed without a more specific signature
    Task,
    /// The bound strategy failed as a whole
    Strategy,
    /// Nothing matched
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolMissing => "tool_missing",
            Self::CircularDependency => "circular_dependency",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::System => "system",
            Self::Resource => "resource",
            Self::Task => "task",
            Self::Strategy => "strategy",
            Self::Unknown => "unknown",
        }
    }

    /// Recoverability before consulting the error's own assertion
    fn recoverable_by_default(&self) -> bool {
        !matches!(self, Self::ToolMissing | Self::CircularDependency | Self::Unknown)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static TOOL_MISSING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)tool not found|unknown tool|no such tool|tool \S+ is not registered")
        .expect("valid regex")
});

static CIRCULAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)circular dependenc|dependency cycle|cycle detected").expect("valid regex")
});

static RATE_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rate.?limit|too many requests|\b429\b|quota exceeded").expect("valid regex")
});

static NETWORK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(econnrefused|econnreset|econnaborted|enotfound|etimedout|ehostunreach|enetunreach|epipe)\b|network|connection (refused|reset|closed|aborted)|socket hang up|timed out|timeout",
    )
    .expect("valid regex")
});

static SYSTEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)out of memory|\benomem\b|\benospc\b|no space left|internal error|panicked")
        .expect("valid regex")
});

/// Classify an error. Deterministic: the same error always maps to the same class.
pub fn classify_error(error: &AgentError) -> ErrorClass {
    let message = error.message();

    if TOOL_MISSING.is_match(message) {
        ErrorClass::ToolMissing
    } else if CIRCULAR.is_match(message) {
        ErrorClass::CircularDependency
    } else if RATE_LIMIT.is_match(message) {
        ErrorClass::RateLimit
    } else if NETWORK.is_match(message) {
        ErrorClass::Network
    } else if SYSTEM.is_match(message) {
        ErrorClass::System
    } else {
        match error {
            AgentError::Strategy { .. } => ErrorClass::Strategy,
            AgentError::System { .. } => ErrorClass::System,
            AgentError::Resource { .. } => ErrorClass::Resource,
            AgentError::Task { .. } => ErrorClass::Task,
            AgentError::Planning { .. } => ErrorClass::Unknown,
        }
    }
}

/// Whether recovery should try again at all.
///
/// `ToolMissing` and `CircularDependency` never recover. Otherwise an explicit
/// retryability assertion on the error decides, falling back to the class default.
pub fn is_recoverable(error: &AgentError) -> bool {
    let class = classify_error(error);
    match class {
        ErrorClass::ToolMissing | ErrorClass::CircularDependency => false,
        _ => error
            .is_retryable()
            .unwrap_or_else(|| class.recoverable_by_default()),
    }
}
