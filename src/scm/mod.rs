//! Source-control adapter.
//!
//! Listing and fetch operations never fail: they are called from inside
//! polling loops, so a transient CLI or network failure degrades to an empty
//! observation and the wait carries on.

mod gh;

pub use gh::GhCli;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Pull request metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    /// OPEN, CLOSED or MERGED.
    pub state: String,
    pub head_ref_name: String,
    pub url: String,
}

impl PullRequestInfo {
    /// Returns true if the PR is still open.
    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }
}

/// Author of a PR comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub login: String,
}

/// A conversation comment on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrComment {
    pub author: CommentAuthor,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A CI check attached to a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    pub name: String,
    /// e.g. QUEUED, IN_PROGRESS, PENDING, SUCCESS, FAILURE.
    pub state: String,
    /// pass, fail, pending, skipping or cancel.
    #[serde(default)]
    pub bucket: Option<String>,
}

impl CheckRun {
    /// Returns true once the check has reached a final state.
    ///
    /// gh's `bucket` decides when present; otherwise the raw state is used.
    pub fn is_final(&self) -> bool {
        match self.bucket.as_deref() {
            Some(bucket) => bucket != "pending",
            None => !matches!(
                self.state.as_str(),
                "PENDING" | "QUEUED" | "IN_PROGRESS" | "WAITING" | "REQUESTED" | "EXPECTED"
            ),
        }
    }
}

/// Returns true when every check is final and at least one exists.
pub fn checks_completed(checks: &[CheckRun]) -> bool {
    !checks.is_empty() && checks.iter().all(CheckRun::is_final)
}

/// Returns true if `branch` refers to the issue `identifier`.
///
/// Matching is a case-insensitive substring test, so `ENG-12` also matches a
/// branch for `ENG-123`.
pub fn branch_matches(branch: &str, identifier: &str) -> bool {
    branch.to_lowercase().contains(&identifier.to_lowercase())
}

/// Narrow operation set over the source-control host.
pub trait SourceControl: Send + Sync {
    /// Creates the empty remote repository `org/name` and returns its full name.
    fn create_repo(&self, org: &str, name: &str, local_path: &Path) -> Result<String>;

    /// Wires `full_name` as `origin` of `local_path` and pushes `main`.
    fn push(&self, full_name: &str, local_path: &Path) -> Result<()>;

    /// Deletes a remote repository.
    fn delete_repo(&self, full_name: &str) -> Result<()>;

    /// Lists pull requests. Empty on failure.
    fn list_prs(&self, repo: &str) -> Vec<PullRequestInfo>;

    /// Fetches one pull request. `None` on failure.
    fn pr_details(&self, repo: &str, number: u64) -> Option<PullRequestInfo>;

    /// Lists conversation comments on a pull request. Empty on failure.
    fn pr_comments(&self, repo: &str, number: u64) -> Vec<PrComment>;

    /// Lists CI checks on a pull request. Empty on failure.
    fn pr_checks(&self, repo: &str, number: u64) -> Vec<CheckRun>;

    /// Lists remote branch names. Empty on failure.
    fn list_branches(&self, repo: &str) -> Vec<String>;

    /// Returns true if any remote branch contains `pattern`.
    fn branch_exists(&self, repo: &str, pattern: &str) -> bool {
        self.list_branches(repo)
            .iter()
            .any(|b| branch_matches(b, pattern))
    }

    /// Finds the first pull request whose head branch refers to `identifier`.
    fn find_pr_for(&self, repo: &str, identifier: &str) -> Option<PullRequestInfo> {
        self.list_prs(repo)
            .into_iter()
            .find(|pr| branch_matches(&pr.head_ref_name, identifier))
    }
}
