//! Submitted command execution and stdout verification.

use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use repro_core::domain::{CommandCheck, CommandExpectation, CommandResult};
use repro_core::obs;
use repro_core::Workspace;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::debug;

/// Exit code recorded when a command could not be spawned or was killed.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// Runs submitted commands inside a workspace.
///
/// Clones share one semaphore, so the concurrency bound holds across every
/// evaluator using the same runner.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(1, None)
    }
}

impl CommandRunner {
    /// `max_concurrent` is clamped to at least one.
    pub fn new(max_concurrent: usize, timeout: Option<Duration>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Execute `commands` strictly in order. Command *i* is verified against
    /// expectation `min(i, len - 1)`; with no expectations there are no checks.
    pub async fn run_all(
        &self,
        experiment_id: &str,
        workspace: &Workspace,
        commands: &[Vec<String>],
        expectations: &[CommandExpectation],
    ) -> Vec<CommandResult> {
        let mut results = Vec::with_capacity(commands.len());
        for (idx, argv) in commands.iter().enumerate() {
            let result = self
                .execute(workspace, argv, expectation_for(expectations, idx))
                .await;
            obs::emit_command_finished(
                experiment_id,
                &result.command_line(),
                result.exit_code,
                result.duration_ms,
            );
            results.push(result);
        }
        results
    }

    /// Execute one command. Never fails: spawn errors and timeouts are
    /// recorded with exit code -1 and the error text on stderr.
    pub async fn execute(
        &self,
        workspace: &Workspace,
        argv: &[String],
        expectation: Option<&CommandExpectation>,
    ) -> CommandResult {
        let start = Instant::now();
        let outcome = self.spawn_and_wait(workspace, argv).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (exit_code, stdout, stderr) = match outcome {
            Ok(output) => (
                output.status.code().unwrap_or(SPAWN_FAILURE_EXIT_CODE),
                String::from_utf8_lossy(&output.stdout).to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ),
            Err(e) => (SPAWN_FAILURE_EXIT_CODE, String::new(), format!("{e:#}")),
        };

        let checks = verify_stdout(&stdout, expectation);
        CommandResult {
            command: argv.to_vec(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            checks,
        }
    }

    async fn spawn_and_wait(&self, workspace: &Workspace, argv: &[String]) -> anyhow::Result<Output> {
        let Some((exe, args)) = argv.split_first() else {
            anyhow::bail!("empty command");
        };

        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("command runner is shut down")?;

        debug!(command = %argv.join(" "), cwd = %workspace.root().display(), "spawning command");
        let child = Command::new(exe)
            .args(args)
            .current_dir(workspace.root())
            .env_clear()
            .envs(workspace.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn `{exe}`"))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    anyhow::anyhow!("command timed out after {} seconds", limit.as_secs_f64())
                })??,
            None => child.wait_with_output().await?,
        };
        Ok(output)
    }
}

/// Expectation for the command at `index`, clamped to the last one.
pub fn expectation_for(
    expectations: &[CommandExpectation],
    index: usize,
) -> Option<&CommandExpectation> {
    expectations.get(index.min(expectations.len().checked_sub(1)?))
}

/// One `stdout_contains` check per required snippet.
pub fn verify_stdout(stdout: &str, expectation: Option<&CommandExpectation>) -> Vec<CommandCheck> {
    expectation
        .map(|exp| {
            exp.expected_stdout
                .iter()
                .map(|snippet| CommandCheck::StdoutContains {
                    snippet: snippet.clone(),
                    passed: stdout.contains(snippet.as_str()),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use repro_core::{ExperimentSpec, WorkspaceSettings};
    use tempfile::tempdir;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn workspace(root: &std::path::Path) -> Workspace {
        let template = root.join("template");
        std::fs::create_dir_all(&template).unwrap();
        let spec = ExperimentSpec::new("runner_test", "Runner", &template);
        Workspace::create(&spec, &WorkspaceSettings::new(root.join("runs"))).unwrap()
    }

    #[test]
    fn test_expectation_clamping() {
        let exps = vec![CommandExpectation::new("first"), CommandExpectation::new("last")];
        assert_eq!(expectation_for(&exps, 0).unwrap().description, "first");
        assert_eq!(expectation_for(&exps, 1).unwrap().description, "last");
        assert_eq!(expectation_for(&exps, 7).unwrap().description, "last");
        assert!(expectation_for(&[], 0).is_none());
    }

    #[test]
    fn test_verify_stdout_is_unordered_containment() {
        let exp = CommandExpectation::new("x")
            .expect_stdout("RMSE:")
            .expect_stdout("Slope:")
            .expect_stdout("R2:");
        let checks = verify_stdout("Slope: 2\nRMSE: 0.1\n", Some(&exp));
        let passed: Vec<bool> = checks.iter().map(CommandCheck::passed).collect();
        assert_eq!(passed, vec![true, true, false]);
        assert!(verify_stdout("anything", None).is_empty());
    }

    #[tokio::test]
    async fn test_execute_in_workspace_root() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        let exp = CommandExpectation::new("pwd").expect_stdout("runner_test_");

        let result = CommandRunner::default()
            .execute(&ws, &argv(&["pwd"]), Some(&exp))
            .await;
        assert_eq!(result.exit_code, 0);
        assert!(result.passed(), "stdout: {}", result.stdout);
    }

    #[tokio::test]
    async fn test_failing_command_is_data() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        let result = CommandRunner::default()
            .execute(&ws, &argv(&["sh", "-c", "echo oops >&2; exit 3"]), None)
            .await;
        assert_eq!(result.exit_code, 3);
        assert!(result.stderr.contains("oops"));
        assert!(!result.passed());
    }

    #[tokio::test]
    async fn test_spawn_failure_and_empty_argv() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        let runner = CommandRunner::default();

        let missing = runner
            .execute(&ws, &argv(&["definitely-not-a-real-binary-xyz"]), None)
            .await;
        assert_eq!(missing.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(missing.stderr.contains("failed to spawn"));

        let empty = runner.execute(&ws, &[], None).await;
        assert_eq!(empty.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(empty.stderr.contains("empty command"));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        let runner = CommandRunner::new(1, Some(Duration::from_millis(200)));
        let result = runner.execute(&ws, &argv(&["sleep", "5"]), None).await;
        assert_eq!(result.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(result.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_all_clamps_to_last_expectation() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        let exps = vec![
            CommandExpectation::new("first").expect_stdout("one"),
            CommandExpectation::new("rest").expect_stdout("later"),
        ];
        let commands = vec![
            argv(&["echo", "one"]),
            argv(&["echo", "later"]),
            argv(&["echo", "later again"]),
        ];
        let results = CommandRunner::default()
            .run_all("runner_test", &ws, &commands, &exps)
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(CommandResult::passed));
        assert!(matches!(
            &results[2].checks[0],
            CommandCheck::StdoutContains { snippet, .. } if snippet == "later"
        ));
    }
}
