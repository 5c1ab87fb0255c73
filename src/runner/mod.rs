//! Agent-process runner.
//!
//! Launches the autonomous agent against a scaffolded repository and recovers
//! its terminal result from the captured structured output.

mod claude;
mod output;

pub use claude::ClaudeRunner;
pub use output::{classify_line, parse_terminal_result, AgentEvent, TerminalResult};

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Default turn cap for one agent run.
pub const DEFAULT_MAX_TURNS: u32 = 100;

/// Default wall-clock limit for one agent run.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Builds the task instruction for resolving one tracker issue.
pub fn resolve_issue_prompt(identifier: &str, issue_id: &str) -> String {
    format!(
        "Resolve Linear issue {} (ID: {}). You MUST invoke the resolve-linear-issue skill \
         using the Skill tool before starting any implementation work. The workflow is NOT \
         complete until: PR checks pass, pr-reviewer approves the PR, and the Linear issue \
         is updated.",
        identifier, issue_id
    )
}

/// Configuration for one agent run.
#[derive(Debug, Clone)]
pub struct AgentRunConfig {
    /// Scaffolded repository the agent works in.
    pub working_dir: PathBuf,
    /// Human identifier of the target issue (e.g. "ENG-42").
    pub identifier: String,
    /// Opaque tracker id of the target issue.
    pub issue_id: String,
    /// Plugin under test.
    pub plugin_dir: PathBuf,
    /// Maximum reasoning turns.
    pub max_turns: u32,
    /// Wall-clock limit enforced on the process.
    pub timeout: Duration,
}

impl AgentRunConfig {
    /// Creates a config with default turn cap and timeout.
    pub fn new(
        working_dir: impl Into<PathBuf>,
        identifier: impl Into<String>,
        issue_id: impl Into<String>,
        plugin_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            identifier: identifier.into(),
            issue_id: issue_id.into(),
            plugin_dir: plugin_dir.into(),
            max_turns: DEFAULT_MAX_TURNS,
            timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    /// Sets the turn cap.
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Sets the wall-clock limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The task instruction for this run.
    pub fn prompt(&self) -> String {
        resolve_issue_prompt(&self.identifier, &self.issue_id)
    }
}

/// Outcome of one agent run.
#[derive(Debug, Clone)]
pub struct AgentRunResult {
    /// Process exit code; `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Parsed terminal record, if one was found.
    pub terminal: Option<TerminalResult>,
    /// Everything the process wrote to stdout.
    pub raw_stdout: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl AgentRunResult {
    /// Returns true if the exit code is zero and the terminal record, when
    /// present, does not report an error.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.terminal.as_ref().is_some_and(|t| t.is_error)
    }
}

/// Launches the agent process.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Runs the agent to completion or until the configured timeout.
    async fn run(&self, config: &AgentRunConfig) -> Result<AgentRunResult>;

    /// Returns the name of this runner.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: Option<i32>, is_error: Option<bool>) -> AgentRunResult {
        AgentRunResult {
            exit_code,
            terminal: is_error.map(|is_error| TerminalResult {
                record_type: "result".to_string(),
                is_error,
                ..Default::default()
            }),
            raw_stdout: String::new(),
            duration: Duration::from_secs(1),
        }
    }

    #[test]
    fn prompt_names_issue_and_skill() {
        let prompt = resolve_issue_prompt("ENG-42", "uuid-42");
        assert!(prompt.starts_with("Resolve Linear issue ENG-42 (ID: uuid-42). "));
        assert!(prompt.contains("resolve-linear-issue skill using the Skill tool"));
        assert!(prompt.ends_with("and the Linear issue is updated."));
    }

    #[test]
    fn config_defaults() {
        let config = AgentRunConfig::new("/repo", "ENG-1", "id-1", "/plugin");
        assert_eq!(config.max_turns, 100);
        assert_eq!(config.timeout, Duration::from_secs(1200));
        assert!(config.prompt().contains("ENG-1"));
    }

    #[test]
    fn success_requires_zero_exit_and_no_reported_error() {
        assert!(result(Some(0), Some(false)).succeeded());
        assert!(result(Some(0), None).succeeded());
        assert!(!result(Some(0), Some(true)).succeeded());
        assert!(!result(Some(1), Some(false)).succeeded());
        assert!(!result(None, None).succeeded());
    }
}
