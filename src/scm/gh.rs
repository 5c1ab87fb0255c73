//! GitHub adapter backed by the `gh` CLI.

use std::path::Path;
use std::process::Command;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::git::run_git;

use super::{CheckRun, PrComment, PullRequestInfo, SourceControl};

const PR_FIELDS: &str = "number,title,state,headRefName,url";

/// Runner for GitHub operations through `gh`.
pub struct GhCli {
    /// Path to the gh CLI binary.
    cli_path: String,
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GhCli {
    /// Creates an adapter using the default `gh` command.
    pub fn new() -> Self {
        Self {
            cli_path: "gh".to_string(),
        }
    }

    /// Creates an adapter with a custom CLI path.
    pub fn with_cli_path(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }

    fn gh(&self, args: &[&str], cwd: Option<&Path>) -> Result<String> {
        let mut cmd = Command::new(&self.cli_path);
        cmd.args(args);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let output = cmd
            .output()
            .map_err(|e| Error::GitHub(format!("failed to run gh: {}", e)))?;

        if !output.status.success() {
            return Err(Error::GitHub(format!(
                "gh {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Runs a gh query and parses its JSON, degrading to `None` on any failure.
    fn query<T: DeserializeOwned>(&self, args: &[&str]) -> Option<T> {
        match self.gh(args, None) {
            Ok(out) => match serde_json::from_str(&out) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!(error = %e, args = ?args, "unparseable gh output");
                    None
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "gh query failed");
                None
            }
        }
    }
}

impl SourceControl for GhCli {
    fn create_repo(&self, org: &str, name: &str, local_path: &Path) -> Result<String> {
        let full_name = format!("{}/{}", org, name);

        tracing::info!(repo = %full_name, "creating remote repository");
        // Public so CI runs without billing concerns.
        self.gh(&["repo", "create", &full_name, "--public"], Some(local_path))?;
        Ok(full_name)
    }

    fn push(&self, full_name: &str, local_path: &Path) -> Result<()> {
        let remote = format!("https://github.com/{}.git", full_name);
        run_git(local_path, &["remote", "add", "origin", &remote])?;
        run_git(local_path, &["push", "-u", "origin", "main"])?;
        tracing::info!(repo = %full_name, "pushed main");
        Ok(())
    }

    fn delete_repo(&self, full_name: &str) -> Result<()> {
        tracing::info!(repo = %full_name, "deleting remote repository");
        self.gh(&["repo", "delete", full_name, "--yes"], None)?;
        Ok(())
    }

    fn list_prs(&self, repo: &str) -> Vec<PullRequestInfo> {
        self.query(&[
            "pr", "list", "--repo", repo, "--state", "all", "--json", PR_FIELDS, "--limit", "50",
        ])
        .unwrap_or_default()
    }

    fn pr_details(&self, repo: &str, number: u64) -> Option<PullRequestInfo> {
        let number = number.to_string();
        self.query(&["pr", "view", &number, "--repo", repo, "--json", PR_FIELDS])
    }

    fn pr_comments(&self, repo: &str, number: u64) -> Vec<PrComment> {
        let number = number.to_string();
        self.query(&[
            "pr", "view", &number, "--repo", repo, "--json", "comments", "--jq", ".comments",
        ])
        .unwrap_or_default()
    }

    fn pr_checks(&self, repo: &str, number: u64) -> Vec<CheckRun> {
        let number = number.to_string();
        let args = [
            "pr", "checks", &number, "--repo", repo, "--json", "name,state,bucket",
        ];

        // gh exits non-zero while checks are pending but still prints them.
        let output = match Command::new(&self.cli_path).args(args).output() {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!(error = %e, "failed to run gh pr checks");
                return Vec::new();
            }
        };

        serde_json::from_slice(&output.stdout).unwrap_or_default()
    }

    fn list_branches(&self, repo: &str) -> Vec<String> {
        let path = format!("repos/{}/branches", repo);
        match self.gh(&["api", &path, "--jq", ".[].name"], None) {
            Ok(out) => out
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::debug!(error = %e, "failed to list branches");
                Vec::new()
            }
        }
    }
}
