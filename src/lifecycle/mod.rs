//! Fixture lifecycle: provisioning, agent run, and teardown.
//!
//! Adapters are passed in by reference so the same sequence runs against
//! real systems from the CLI and against in-memory fakes in tests.

mod setup;
mod teardown;

pub use setup::{setup, SetupContext};
pub use teardown::{teardown, StepOutcome, TeardownContext, TeardownReport, TeardownStep};

use std::path::{Path, PathBuf};

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::runner::{AgentRunConfig, AgentRunResult, AgentRunner};

/// File that receives the agent's raw stdout after a run.
pub const DEBUG_OUTPUT_FILE_NAME: &str = "claude-debug-output.jsonl";

/// Runs the agent against the primary issue of a provisioned fixture.
///
/// The raw output is saved to [`DEBUG_OUTPUT_FILE_NAME`] in the tests
/// directory before the result is returned.
pub async fn run_agent(
    config: &HarnessConfig,
    manifest: &Manifest,
    runner: &dyn AgentRunner,
) -> Result<AgentRunResult> {
    let issue = manifest
        .primary_issue()
        .ok_or_else(|| Error::Config("manifest lists no issues".to_string()))?;

    let run_config = AgentRunConfig::new(
        &manifest.test_repo_path,
        &issue.identifier,
        &issue.id,
        config.plugin_dir(),
    )
    .with_max_turns(config.max_turns)
    .with_timeout(config.agent_timeout_duration());

    tracing::info!(issue = %issue.identifier, runner = runner.name(), "running agent");
    let result = runner.run(&run_config).await?;

    let debug_path = debug_output_path(&config.tests_dir);
    if let Err(e) = std::fs::write(&debug_path, &result.raw_stdout) {
        tracing::warn!(path = ?debug_path, error = %e, "failed to save agent output");
    } else {
        tracing::info!(path = ?debug_path, "saved agent output");
    }

    Ok(result)
}

/// Path of the saved agent output.
pub fn debug_output_path(tests_dir: &Path) -> PathBuf {
    tests_dir.join(DEBUG_OUTPUT_FILE_NAME)
}
