//! Best-effort reverse teardown.
//!
//! Teardown is driven only by the manifest. Each step runs regardless of how
//! earlier steps went; the only fatal condition is a missing manifest.

use std::fmt;

use crate::container::ContainerRuntime;
use crate::error::Result;
use crate::manifest::{Manifest, ManifestStore};
use crate::scm::SourceControl;
use crate::tracker::{IssueTracker, StateKind};

/// Everything teardown needs.
pub struct TeardownContext<'a> {
    pub store: &'a ManifestStore,
    pub tracker: &'a dyn IssueTracker,
    pub scm: &'a dyn SourceControl,
    pub containers: &'a dyn ContainerRuntime,
}

/// One independent teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    CancelIssues,
    ArchiveProject,
    DeleteRemoteRepo,
    RemoveContainer,
    RemoveLocalRepo,
    DeleteManifest,
}

impl TeardownStep {
    /// All steps in execution order.
    pub const ALL: [TeardownStep; 6] = [
        TeardownStep::CancelIssues,
        TeardownStep::ArchiveProject,
        TeardownStep::DeleteRemoteRepo,
        TeardownStep::RemoveContainer,
        TeardownStep::RemoveLocalRepo,
        TeardownStep::DeleteManifest,
    ];
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStep::CancelIssues => "cancel issues",
            TeardownStep::ArchiveProject => "archive project",
            TeardownStep::DeleteRemoteRepo => "delete remote repository",
            TeardownStep::RemoveContainer => "remove database container",
            TeardownStep::RemoveLocalRepo => "remove local repository",
            TeardownStep::DeleteManifest => "delete manifest",
        };
        f.write_str(name)
    }
}

/// What happened in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done(String),
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// Per-step outcomes of one teardown.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    pub steps: Vec<(TeardownStep, StepOutcome)>,
}

impl TeardownReport {
    /// Returns true if no step failed.
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|(_, o)| !o.is_failed())
    }

    /// Steps that failed, with their messages.
    pub fn failures(&self) -> Vec<(TeardownStep, &str)> {
        self.steps
            .iter()
            .filter_map(|(step, outcome)| match outcome {
                StepOutcome::Failed(msg) => Some((*step, msg.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Outcome of a given step.
    pub fn outcome(&self, step: TeardownStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }
}

/// Removes every resource the manifest lists, then the manifest itself.
///
/// Fails only when no manifest exists. Step failures are logged and
/// recorded in the report.
pub async fn teardown(ctx: &TeardownContext<'_>) -> Result<TeardownReport> {
    let manifest = ctx.store.read()?;
    tracing::info!(project = %manifest.project_name, "tearing down fixture");

    let mut report = TeardownReport::default();
    for step in TeardownStep::ALL {
        let outcome = run_step(ctx, &manifest, step).await;
        match &outcome {
            StepOutcome::Done(msg) => tracing::info!(step = %step, "{}", msg),
            StepOutcome::Skipped(msg) => tracing::info!(step = %step, "skipped: {}", msg),
            StepOutcome::Failed(msg) => tracing::warn!(step = %step, "failed: {}", msg),
        }
        report.steps.push((step, outcome));
    }

    if report.is_clean() {
        tracing::info!("teardown complete");
    } else {
        tracing::warn!(failed = report.failures().len(), "teardown finished with failures");
    }
    Ok(report)
}

async fn run_step(ctx: &TeardownContext<'_>, manifest: &Manifest, step: TeardownStep) -> StepOutcome {
    match step {
        TeardownStep::CancelIssues => cancel_issues(ctx, manifest).await,
        TeardownStep::ArchiveProject => match ctx.tracker.archive_project(&manifest.project_id).await {
            Ok(()) => StepOutcome::Done(format!("archived {}", manifest.project_name)),
            Err(e) => StepOutcome::Failed(e.to_string()),
        },
        TeardownStep::DeleteRemoteRepo => match &manifest.github_repo {
            None => StepOutcome::Skipped("no remote repository recorded".to_string()),
            Some(repo) => match ctx.scm.delete_repo(repo) {
                Ok(()) => StepOutcome::Done(format!("deleted {}", repo)),
                Err(e) => StepOutcome::Failed(e.to_string()),
            },
        },
        TeardownStep::RemoveContainer => match &manifest.pg_container_id {
            None => StepOutcome::Skipped("no container recorded".to_string()),
            Some(id) => match ctx.containers.remove(id).await {
                Ok(()) => StepOutcome::Done(format!("removed {}", id)),
                Err(e) => StepOutcome::Failed(e.to_string()),
            },
        },
        TeardownStep::RemoveLocalRepo => {
            let path = &manifest.test_repo_path;
            if !path.exists() {
                return StepOutcome::Skipped(format!("{} does not exist", path.display()));
            }
            match std::fs::remove_dir_all(path) {
                Ok(()) => StepOutcome::Done(format!("removed {}", path.display())),
                Err(e) => StepOutcome::Failed(format!("{}: {}", path.display(), e)),
            }
        }
        TeardownStep::DeleteManifest => match ctx.store.delete() {
            Ok(()) => StepOutcome::Done("deleted manifest".to_string()),
            Err(e) => StepOutcome::Failed(e.to_string()),
        },
    }
}

async fn cancel_issues(ctx: &TeardownContext<'_>, manifest: &Manifest) -> StepOutcome {
    if manifest.issues.is_empty() {
        return StepOutcome::Skipped("no issues recorded".to_string());
    }

    let canceled = match ctx.tracker.state_id(&manifest.team_id, StateKind::Canceled).await {
        Ok(Some(id)) => id,
        Ok(None) => return StepOutcome::Skipped("team has no canceled state".to_string()),
        Err(e) => return StepOutcome::Failed(e.to_string()),
    };

    let mut failed = Vec::new();
    for issue in &manifest.issues {
        match ctx.tracker.update_issue_state(&issue.id, &canceled).await {
            Ok(()) => tracing::debug!(issue = %issue.identifier, "canceled issue"),
            Err(e) => {
                tracing::warn!(issue = %issue.identifier, error = %e, "failed to cancel issue");
                failed.push(issue.identifier.clone());
            }
        }
    }

    if failed.is_empty() {
        StepOutcome::Done(format!("canceled {} issue(s)", manifest.issues.len()))
    } else {
        StepOutcome::Failed(format!("could not cancel {}", failed.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestIssue;
    use crate::testing::{FakeContainers, FakeSourceControl, FakeTracker};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn manifest(repo: &std::path::Path) -> Manifest {
        Manifest {
            created_at: chrono::Utc::now(),
            project_id: "proj-1".to_string(),
            project_name: "[Test] resolve-linear-issue".to_string(),
            team_id: "team-eng".to_string(),
            team_key: "ENG".to_string(),
            issues: vec![ManifestIssue {
                key: "S".to_string(),
                id: "issue-unknown".to_string(),
                identifier: "ENG-99".to_string(),
                title: "Add GET /health endpoint".to_string(),
                wave: 0,
                blocked_by_keys: vec![],
            }],
            dependency_map: BTreeMap::new(),
            waves: BTreeMap::new(),
            test_repo_path: repo.to_path_buf(),
            github_repo: None,
            pg_container_id: Some("cid".to_string()),
            database_url: None,
        }
    }

    #[tokio::test]
    async fn failed_cancel_names_issue_and_later_steps_run() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path());
        store.write(&manifest(&temp.path().join("missing-repo"))).unwrap();

        let tracker = FakeTracker::new();
        let scm = FakeSourceControl::new();
        let containers = FakeContainers::new();
        let ctx = TeardownContext {
            store: &store,
            tracker: &tracker,
            scm: &scm,
            containers: &containers,
        };

        let report = teardown(&ctx).await.unwrap();
        assert_eq!(
            report.outcome(TeardownStep::CancelIssues),
            Some(&StepOutcome::Failed("could not cancel ENG-99".to_string()))
        );
        assert!(matches!(
            report.outcome(TeardownStep::RemoveLocalRepo),
            Some(StepOutcome::Skipped(_))
        ));
        assert_eq!(containers.removed(), vec!["cid"]);
        assert_eq!(tracker.archived_projects(), vec!["proj-1"]);
        assert!(!store.exists());
        assert_eq!(report.failures().len(), 1);
    }

    #[tokio::test]
    async fn failed_container_removal_is_reported() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path());
        store.write(&manifest(&temp.path().join("missing-repo"))).unwrap();

        let tracker = FakeTracker::new();
        let scm = FakeSourceControl::new();
        let containers = FakeContainers::new();
        containers.fail_remove();
        let ctx = TeardownContext {
            store: &store,
            tracker: &tracker,
            scm: &scm,
            containers: &containers,
        };

        let report = teardown(&ctx).await.unwrap();
        assert!(matches!(
            report.outcome(TeardownStep::RemoveContainer),
            Some(StepOutcome::Failed(msg)) if msg.contains("cid")
        ));
        assert!(!store.exists());
    }

    #[test]
    fn steps_display_in_order() {
        let names: Vec<String> = TeardownStep::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(names.first().map(String::as_str), Some("cancel issues"));
        assert_eq!(names.last().map(String::as_str), Some("delete manifest"));
    }
}
