//! Post-run verification of the agent's externally visible effects.
//!
//! Each check is independent: a failed or timed-out check records its unmet
//! expectation and the remaining checks still run.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::manifest::{Manifest, ManifestIssue};
use crate::poll::{poll_until, PollOptions};
use crate::runner::AgentRunResult;
use crate::scm::{checks_completed, PullRequestInfo, SourceControl};
use crate::tracker::{IssueTracker, StateKind};

/// Phrases that mark a comment as a review.
const REVIEW_MARKERS: [&str; 5] = ["Summary", "Verdict", "Approve", "LGTM", "approve"];

/// Outcome of one verification check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }

    fn from_bool(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{}] {}: {}", mark, self.name, self.detail)
    }
}

/// All checks of one verification.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub checks: Vec<Check>,
}

impl VerificationReport {
    /// Returns true if every check passed.
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Checks that did not pass.
    pub fn failures(&self) -> Vec<&Check> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Looks up a check by name.
    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }
}

pub const AGENT_SUCCEEDED: &str = "agent completed without error";
pub const BRANCH_CREATED: &str = "issue branch created";
pub const PR_OPENED: &str = "pull request opened";
pub const CHECKS_COMPLETED: &str = "CI checks completed";
pub const PR_REVIEWED: &str = "pull request reviewed";
pub const ISSUE_TOUCHED: &str = "tracker issue updated";
pub const ISSUE_NOT_DONE: &str = "tracker issue not marked done";

/// Verifies the resolve-issue scenario against a provisioned fixture.
pub struct Verifier<'a> {
    tracker: &'a dyn IssueTracker,
    scm: &'a dyn SourceControl,
    checks_poll: PollOptions,
}

impl<'a> Verifier<'a> {
    /// Creates a verifier that waits up to five minutes for CI, polling every 15 s.
    pub fn new(tracker: &'a dyn IssueTracker, scm: &'a dyn SourceControl) -> Self {
        Self {
            tracker,
            scm,
            checks_poll: PollOptions::new("CI checks to complete")
                .with_interval(Duration::from_secs(15))
                .with_timeout(Duration::from_secs(300)),
        }
    }

    /// Overrides the CI polling schedule.
    pub fn with_checks_poll(mut self, opts: PollOptions) -> Self {
        self.checks_poll = opts;
        self
    }

    /// Runs every check for the manifest's primary issue.
    pub async fn verify(&self, manifest: &Manifest, run: &AgentRunResult) -> Result<VerificationReport> {
        let issue = manifest
            .primary_issue()
            .ok_or_else(|| Error::Config("manifest lists no issues".to_string()))?;

        let mut report = VerificationReport::default();
        report.checks.push(agent_check(run));

        match manifest.github_repo.as_deref() {
            Some(repo) => {
                report.checks.push(self.branch_check(repo, issue));
                let pr = self.scm.find_pr_for(repo, &issue.identifier);
                report.checks.push(pr_check(pr.as_ref(), issue));
                report.checks.push(self.ci_check(repo, pr.as_ref()).await);
                report.checks.push(self.review_check(repo, pr.as_ref()));
            }
            None => {
                for name in [BRANCH_CREATED, PR_OPENED, CHECKS_COMPLETED, PR_REVIEWED] {
                    report
                        .checks
                        .push(Check::fail(name, "no remote repository recorded"));
                }
            }
        }

        report.checks.extend(self.issue_checks(issue).await);

        for check in &report.checks {
            if check.passed {
                tracing::info!("{}", check);
            } else {
                tracing::warn!("{}", check);
            }
        }
        Ok(report)
    }

    fn branch_check(&self, repo: &str, issue: &ManifestIssue) -> Check {
        let pattern = issue.identifier.to_lowercase();
        Check::from_bool(
            BRANCH_CREATED,
            self.scm.branch_exists(repo, &pattern),
            format!("remote branch containing \"{}\"", pattern),
        )
    }

    async fn ci_check(&self, repo: &str, pr: Option<&PullRequestInfo>) -> Check {
        let Some(pr) = pr else {
            return Check::fail(CHECKS_COMPLETED, "no pull request to check");
        };

        match poll_until(
            || async move { self.scm.pr_checks(repo, pr.number) },
            |checks| checks_completed(checks),
            &self.checks_poll,
        )
        .await
        {
            Ok(checks) => {
                let summary: Vec<_> = checks
                    .iter()
                    .map(|c| format!("{}={}", c.name, c.state))
                    .collect();
                Check::pass(CHECKS_COMPLETED, summary.join(", "))
            }
            Err(e) => Check::fail(CHECKS_COMPLETED, e.to_string()),
        }
    }

    fn review_check(&self, repo: &str, pr: Option<&PullRequestInfo>) -> Check {
        let Some(pr) = pr else {
            return Check::fail(PR_REVIEWED, "no pull request to check");
        };

        let comments = self.scm.pr_comments(repo, pr.number);
        match comments.iter().find(|c| is_review_comment(&c.body)) {
            Some(comment) => Check::pass(
                PR_REVIEWED,
                format!("review comment by {}", comment.author.login),
            ),
            None => Check::fail(
                PR_REVIEWED,
                format!("no review-like comment among {} comment(s)", comments.len()),
            ),
        }
    }

    async fn issue_checks(&self, issue: &ManifestIssue) -> Vec<Check> {
        let state = match self.tracker.issue_state(&issue.id).await {
            Ok(state) => state,
            Err(e) => {
                return vec![
                    Check::fail(ISSUE_TOUCHED, e.to_string()),
                    Check::fail(ISSUE_NOT_DONE, e.to_string()),
                ]
            }
        };
        let comments = match self.tracker.issue_comments(&issue.id).await {
            Ok(comments) => comments.len(),
            Err(e) => {
                tracing::debug!(error = %e, "failed to fetch issue comments");
                0
            }
        };

        let started = StateKind::Started.matches(&state);
        let detail = format!(
            "state {} ({}), {} comment(s)",
            state.name, state.state_type, comments
        );
        vec![
            Check::from_bool(ISSUE_TOUCHED, started || comments > 0, detail.clone()),
            Check::from_bool(ISSUE_NOT_DONE, !StateKind::Completed.matches(&state), detail),
        ]
    }
}

fn agent_check(run: &AgentRunResult) -> Check {
    let detail = match &run.terminal {
        Some(t) => format!(
            "exit code {:?}, is_error {}, {} turn(s)",
            run.exit_code,
            t.is_error,
            t.num_turns.map_or("?".to_string(), |n| n.to_string())
        ),
        None => format!("exit code {:?}, no result record", run.exit_code),
    };
    Check::from_bool(AGENT_SUCCEEDED, run.succeeded(), detail)
}

fn pr_check(pr: Option<&PullRequestInfo>, issue: &ManifestIssue) -> Check {
    match pr {
        Some(pr) => Check::pass(PR_OPENED, format!("#{} from {}", pr.number, pr.head_ref_name)),
        None => Check::fail(
            PR_OPENED,
            format!("no pull request from a branch containing {}", issue.identifier),
        ),
    }
}

/// Returns true if a comment body reads like a review.
pub fn is_review_comment(body: &str) -> bool {
    REVIEW_MARKERS.iter().any(|m| body.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSourceControl, FakeTracker};
    use crate::tracker::{NewIssue, TrackedIssue};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    async fn fixture(tracker: &FakeTracker) -> (Manifest, TrackedIssue) {
        let issue = tracker
            .create_issue(&NewIssue {
                title: "Add GET /health endpoint".to_string(),
                description: String::new(),
                team_id: "team-eng".to_string(),
                project_id: "proj-1".to_string(),
                priority: 2,
                state_id: Some("st-backlog".to_string()),
            })
            .await
            .unwrap();

        let manifest = Manifest {
            created_at: chrono::Utc::now(),
            project_id: "proj-1".to_string(),
            project_name: "p".to_string(),
            team_id: "team-eng".to_string(),
            team_key: "ENG".to_string(),
            issues: vec![ManifestIssue {
                key: "S".to_string(),
                id: issue.id.clone(),
                identifier: issue.identifier.clone(),
                title: issue.title.clone(),
                wave: 0,
                blocked_by_keys: vec![],
            }],
            dependency_map: BTreeMap::new(),
            waves: BTreeMap::new(),
            test_repo_path: PathBuf::from("/tmp/repo"),
            github_repo: Some("org/repo".to_string()),
            pg_container_id: None,
            database_url: None,
        };
        (manifest, issue)
    }

    fn fast_poll() -> PollOptions {
        PollOptions::new("CI checks to complete")
            .with_interval(Duration::from_secs(15))
            .with_timeout(Duration::from_secs(60))
    }

    fn run(exit_code: i32) -> AgentRunResult {
        crate::runner::AgentRunResult {
            exit_code: Some(exit_code),
            terminal: None,
            raw_stdout: String::new(),
            duration: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_run_passes_every_check() {
        let tracker = FakeTracker::new();
        let scm = FakeSourceControl::new();
        let (manifest, issue) = fixture(&tracker).await;
        let branch = format!("{}-add-health-endpoint", issue.identifier.to_lowercase());

        scm.add_branch("main");
        scm.add_branch(&branch);
        scm.add_pr(4, &branch);
        scm.push_checks(&[("test", "PENDING")]);
        scm.push_checks(&[("test", "SUCCESS")]);
        scm.add_comment(4, "pr-reviewer", "## Verdict\nApprove");
        tracker.set_state_by_name(&issue.id, "In Progress");

        let report = Verifier::new(&tracker, &scm)
            .with_checks_poll(fast_poll())
            .verify(&manifest, &run(0))
            .await
            .unwrap();

        assert!(report.all_passed(), "{:#?}", report.failures());
        assert_eq!(report.checks.len(), 7);
        assert_eq!(scm.check_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_reported_per_check() {
        let tracker = FakeTracker::new();
        let scm = FakeSourceControl::new();
        let (manifest, issue) = fixture(&tracker).await;
        tracker.set_state_by_name(&issue.id, "Done");

        let report = Verifier::new(&tracker, &scm)
            .with_checks_poll(fast_poll())
            .verify(&manifest, &run(1))
            .await
            .unwrap();

        assert!(!report.all_passed());
        assert!(!report.check(AGENT_SUCCEEDED).unwrap().passed);
        assert!(!report.check(BRANCH_CREATED).unwrap().passed);
        assert!(!report.check(PR_OPENED).unwrap().passed);
        assert!(!report.check(CHECKS_COMPLETED).unwrap().passed);
        // Done is a completed state, which also counts as not started
        assert!(!report.check(ISSUE_TOUCHED).unwrap().passed);
        assert!(!report.check(ISSUE_NOT_DONE).unwrap().passed);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_checks_time_out_with_label() {
        let tracker = FakeTracker::new();
        let scm = FakeSourceControl::new();
        let (manifest, issue) = fixture(&tracker).await;
        let branch = issue.identifier.to_lowercase();
        scm.add_branch(&branch);
        scm.add_pr(1, &branch);
        scm.push_checks(&[("test", "QUEUED")]);

        let report = Verifier::new(&tracker, &scm)
            .with_checks_poll(fast_poll())
            .verify(&manifest, &run(0))
            .await
            .unwrap();

        let ci = report.check(CHECKS_COMPLETED).unwrap();
        assert!(!ci.passed);
        assert!(ci.detail.contains("CI checks to complete"));
        assert!(report.check(PR_OPENED).unwrap().passed);
    }

    #[tokio::test]
    async fn issue_comments_count_as_interaction() {
        let tracker = FakeTracker::new();
        let scm = FakeSourceControl::new();
        let (mut manifest, issue) = fixture(&tracker).await;
        manifest.github_repo = None;
        tracker.create_comment(&issue.id, "Starting work").await.unwrap();

        let report = Verifier::new(&tracker, &scm)
            .verify(&manifest, &run(0))
            .await
            .unwrap();

        assert!(report.check(ISSUE_TOUCHED).unwrap().passed);
        assert!(report.check(ISSUE_NOT_DONE).unwrap().passed);
        assert_eq!(
            report.check(BRANCH_CREATED).unwrap().detail,
            "no remote repository recorded"
        );
    }

    #[test]
    fn review_markers() {
        assert!(is_review_comment("## Summary\nlooks fine"));
        assert!(is_review_comment("LGTM"));
        assert!(is_review_comment("I approve this"));
        assert!(!is_review_comment("please fix the tests"));
    }
}
