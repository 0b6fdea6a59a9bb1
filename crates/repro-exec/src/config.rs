//! Evaluator configuration.

use std::path::PathBuf;
use std::time::Duration;

use repro_core::{WorkspaceSettings, DEFAULT_SEARCH_PATH_VAR};
use serde::{Deserialize, Serialize};

pub const RUN_ROOT_ENV: &str = "REPRO_RUN_ROOT";
pub const LOG_DIR_ENV: &str = "REPRO_LOG_DIR";
pub const SEARCH_PATH_VAR_ENV: &str = "REPRO_SEARCH_PATH_VAR";
pub const COMMAND_TIMEOUT_ENV: &str = "REPRO_COMMAND_TIMEOUT_SECS";
pub const MAX_CONCURRENT_ENV: &str = "REPRO_MAX_CONCURRENT_COMMANDS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Parent of every per-attempt workspace.
    pub run_root: PathBuf,
    /// Where run records are written.
    pub log_dir: PathBuf,
    /// Search-path variable that dependency locations are appended to.
    pub search_path_var: String,
    /// Per-command wall-clock limit; `None` waits indefinitely.
    pub command_timeout: Option<Duration>,
    /// Subprocesses allowed to run at once.
    pub max_concurrent_commands: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            run_root: std::env::var(RUN_ROOT_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("repro-runs")),
            log_dir: std::env::var(LOG_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs").join("experiments")),
            search_path_var: std::env::var(SEARCH_PATH_VAR_ENV)
                .unwrap_or_else(|_| DEFAULT_SEARCH_PATH_VAR.to_string()),
            command_timeout: std::env::var(COMMAND_TIMEOUT_ENV)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            max_concurrent_commands: std::env::var(MAX_CONCURRENT_ENV)
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(1),
        }
    }
}

impl EvaluatorConfig {
    /// Create a new config from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config rooted at explicit directories, ignoring the environment.
    pub fn new(run_root: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        EvaluatorConfig {
            run_root: run_root.into(),
            log_dir: log_dir.into(),
            search_path_var: DEFAULT_SEARCH_PATH_VAR.to_string(),
            command_timeout: None,
            max_concurrent_commands: 1,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn with_max_concurrent_commands(mut self, n: usize) -> Self {
        self.max_concurrent_commands = n.max(1);
        self
    }

    pub fn with_search_path_var(mut self, var: impl Into<String>) -> Self {
        self.search_path_var = var.into();
        self
    }

    pub fn workspace_settings(&self) -> WorkspaceSettings {
        WorkspaceSettings::new(&self.run_root).with_search_path_var(&self.search_path_var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config() {
        let cfg = EvaluatorConfig::new("/tmp/runs", "/tmp/logs")
            .with_command_timeout(Duration::from_secs(30))
            .with_max_concurrent_commands(0)
            .with_search_path_var("LD_LIBRARY_PATH");
        assert_eq!(cfg.command_timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.max_concurrent_commands, 1);
        let settings = cfg.workspace_settings();
        assert_eq!(settings.run_root, PathBuf::from("/tmp/runs"));
        assert_eq!(settings.search_path_var, "LD_LIBRARY_PATH");
    }

    #[test]
    fn test_from_env_has_sane_defaults() {
        let cfg = EvaluatorConfig::from_env();
        assert!(cfg.max_concurrent_commands >= 1);
        assert!(!cfg.search_path_var.is_empty());
    }
}
