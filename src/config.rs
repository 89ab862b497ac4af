//! Configuration management

use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Complete runtime configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub planner: PlannerConfig,
    pub recovery: RecoveryConfig,
    pub log: LogConfig,
}

/// Goal-stack planner limits
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Upper bound on step-function calls per planner run
    pub max_steps: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { max_steps: 256 }
    }
}

/// Error-recovery budget and retry timing
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Attempts allowed per (classification, task) key within the window
    pub max_recovery_attempts: usize,
    /// Attempts older than this no longer count and may be pruned
    pub retention_window: Duration,
    /// First retry delay
    pub retry_base_delay: Duration,
    /// Retry delay cap
    pub retry_max_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_recovery_attempts: 3,
            retention_window: Duration::from_secs(24 * 60 * 60),
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Emit JSON lines to stderr instead of pretty output
    pub json: bool,
    /// Filter directive used when `RUST_LOG` is unset
    pub default_directive: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_directive: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env`, if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a dotenv-style file without touching the process environment
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path.as_ref())? {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let parse_u64 = |key: &str| -> Result<Option<u64>> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, raw, e)),
                None => Ok(None),
            }
        };

        let max_steps = parse_u64("TASKTREE_MAX_PLANNER_STEPS")?
            .map(|v| v as usize)
            .unwrap_or(defaults.planner.max_steps);

        let max_recovery_attempts = parse_u64("TASKTREE_MAX_RECOVERY_ATTEMPTS")?
            .map(|v| v as usize)
            .unwrap_or(defaults.recovery.max_recovery_attempts);

        let retention_window = parse_u64("TASKTREE_RECOVERY_WINDOW_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.recovery.retention_window);

        let retry_base_delay = parse_u64("TASKTREE_RETRY_BASE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.recovery.retry_base_delay);

        let retry_max_delay = parse_u64("TASKTREE_RETRY_MAX_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.recovery.retry_max_delay);

        let json = lookup("TASKTREE_LOG_JSON")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.log.json);

        let default_directive = lookup("RUST_LOG").unwrap_or(defaults.log.default_directive);

        Ok(Self {
            planner: PlannerConfig { max_steps },
            recovery: RecoveryConfig {
                max_recovery_attempts,
                retention_window,
                retry_base_delay,
                retry_max_delay,
            },
            log: LogConfig {
                json,
                default_directive,
            },
        })
    }
}
