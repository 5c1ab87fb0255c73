//! Claude Code CLI runner.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;

use crate::credentials::Redactor;
use crate::error::{Error, Result};

use super::{classify_line, parse_terminal_result, AgentEvent, AgentRunConfig, AgentRunResult, AgentRunner};

/// Runner for Claude Code CLI.
pub struct ClaudeRunner {
    /// Path to the claude CLI binary.
    cli_path: String,
    /// Masks secrets in logged output.
    redactor: Redactor,
}

impl Default for ClaudeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaudeRunner {
    /// Creates a new Claude runner using the default `claude` command.
    pub fn new() -> Self {
        Self {
            cli_path: "claude".to_string(),
            redactor: Redactor::new(),
        }
    }

    /// Creates a new Claude runner with a custom CLI path.
    pub fn with_cli_path(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            ..Self::new()
        }
    }

    /// Sets the redactor applied to logged output lines.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Builds the command arguments for one run.
    fn build_args(&self, config: &AgentRunConfig) -> Vec<String> {
        vec![
            "-p".to_string(),
            config.prompt(),
            "--dangerously-skip-permissions".to_string(),
            "--max-turns".to_string(),
            config.max_turns.to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(), // Required for stream-json
            "--plugin-dir".to_string(),
            config.plugin_dir.to_string_lossy().to_string(),
        ]
    }

    fn log_line(&self, line: &str) {
        match classify_line(line) {
            AgentEvent::ToolCall { tool, .. } => tracing::debug!(tool = %tool, "agent tool call"),
            AgentEvent::FileRead(path) => tracing::debug!(path = ?path, "agent read file"),
            AgentEvent::FileWrite(path) => tracing::debug!(path = ?path, "agent wrote file"),
            AgentEvent::Result(result) => tracing::info!(
                is_error = result.is_error,
                num_turns = ?result.num_turns,
                cost_usd = ?result.total_cost_usd,
                "agent reported result"
            ),
            AgentEvent::Text(text) => {
                tracing::trace!(line = %self.redactor.redact(&text), "agent stdout")
            }
        }
    }
}

#[async_trait]
impl AgentRunner for ClaudeRunner {
    async fn run(&self, config: &AgentRunConfig) -> Result<AgentRunResult> {
        let args = self.build_args(config);

        tracing::info!(
            cli = %self.cli_path,
            working_dir = ?config.working_dir,
            issue = %config.identifier,
            max_turns = config.max_turns,
            "spawning Claude CLI"
        );

        let started = Instant::now();
        let mut child = Command::new(&self.cli_path)
            .args(&args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            // Passed through for live diagnostics.
            .stderr(Stdio::inherit())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Agent(format!("failed to spawn {}: {}", self.cli_path, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Agent("stdout was not captured".to_string()))?;

        let outcome = tokio::time::timeout(config.timeout, async {
            let mut lines = BufReader::new(stdout).lines();
            let mut raw = String::new();
            while let Some(line) = lines.next_line().await? {
                self.log_line(&line);
                raw.push_str(&line);
                raw.push('\n');
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, raw))
        })
        .await;

        let (status, raw_stdout) = match outcome {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => return Err(Error::Agent(format!("failed to read agent output: {}", e))),
            Err(_) => {
                tracing::warn!(timeout = ?config.timeout, "agent exceeded timeout, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill agent process");
                }
                return Err(Error::Timeout {
                    label: format!("agent to resolve {}", config.identifier),
                    after: config.timeout,
                });
            }
        };

        let duration = started.elapsed();
        let terminal = parse_terminal_result(&raw_stdout);
        if terminal.is_none() {
            tracing::warn!("no terminal result in agent output; relying on exit code");
        }

        tracing::info!(exit_code = ?status.code(), duration = ?duration, "agent finished");

        Ok(AgentRunResult {
            exit_code: status.code(),
            terminal,
            raw_stdout,
            duration,
        })
    }

    fn name(&self) -> &str {
        "claude-code"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> AgentRunConfig {
        AgentRunConfig::new("/tmp/repo", "ENG-42", "uuid-42", "/plugins/linear-pm")
            .with_max_turns(7)
    }

    #[test]
    fn claude_runner_builds_args() {
        let runner = ClaudeRunner::new();
        let args = runner.build_args(&config());

        assert_eq!(args[0], "-p");
        assert!(args[1].starts_with("Resolve Linear issue ENG-42 (ID: uuid-42)"));
        assert!(args.contains(&"--dangerously-skip-permissions".to_string()));

        let turns = args.iter().position(|a| a == "--max-turns").unwrap();
        assert_eq!(args[turns + 1], "7");

        let format = args.iter().position(|a| a == "--output-format").unwrap();
        assert_eq!(args[format + 1], "stream-json");

        let plugin = args.iter().position(|a| a == "--plugin-dir").unwrap();
        assert_eq!(args[plugin + 1], "/plugins/linear-pm");
    }

    #[test]
    fn claude_runner_with_custom_path() {
        let runner = ClaudeRunner::with_cli_path("/usr/local/bin/claude");
        assert_eq!(runner.cli_path, "/usr/local/bin/claude");
        assert_eq!(runner.name(), "claude-code");
    }

    #[tokio::test]
    async fn missing_binary_is_agent_error() {
        let runner = ClaudeRunner::with_cli_path("/nonexistent/claude");
        let mut config = config();
        config.working_dir = std::env::temp_dir();

        let err = runner.run(&config).await.unwrap_err();
        assert!(matches!(err, Error::Agent(_)));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &TempDir, body: &str) -> ClaudeRunner {
            let path = dir.path().join("claude");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            ClaudeRunner::with_cli_path(path.to_string_lossy().to_string())
        }

        fn config_in(dir: &TempDir) -> AgentRunConfig {
            let mut config = config();
            config.working_dir = dir.path().to_path_buf();
            config
        }

        #[tokio::test]
        async fn captures_stdout_and_parses_result() {
            let dir = TempDir::new().unwrap();
            let runner = script(
                &dir,
                r#"echo '{"type":"system","subtype":"init"}'
echo '{"type":"result","is_error":false,"result":"done","num_turns":3}'
exit 0"#,
            );

            let result = runner.run(&config_in(&dir)).await.unwrap();
            assert_eq!(result.exit_code, Some(0));
            assert!(result.raw_stdout.contains("\"init\""));
            let terminal = result.terminal.unwrap();
            assert_eq!(terminal.num_turns, Some(3));
            assert!(!terminal.is_error);
        }

        #[tokio::test]
        async fn non_zero_exit_without_result() {
            let dir = TempDir::new().unwrap();
            let runner = script(&dir, "echo 'crashed'\nexit 3");

            let result = runner.run(&config_in(&dir)).await.unwrap();
            assert_eq!(result.exit_code, Some(3));
            assert!(result.terminal.is_none());
            assert!(!result.succeeded());
        }

        #[tokio::test]
        async fn timeout_is_fatal() {
            let dir = TempDir::new().unwrap();
            let runner = script(&dir, "exec sleep 30");
            let config = config_in(&dir).with_timeout(Duration::from_millis(200));

            let err = runner.run(&config).await.unwrap_err();
            assert!(err.is_timeout());
        }
    }
}
