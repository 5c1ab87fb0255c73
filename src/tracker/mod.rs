//! Issue tracker adapter.
//!
//! The orchestrator talks to the tracker only through [`IssueTracker`], so
//! lifecycle code can be exercised against an in-memory fake. Workflow states
//! are looked up by semantic name or type because their ids differ between
//! workspaces.

mod linear;

pub use linear::{LinearClient, LINEAR_GRAPHQL_ENDPOINT};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A tracker team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub key: String,
}

/// A tracker project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// A team's workflow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub name: String,
    /// Category such as "backlog", "started", "completed", "canceled".
    #[serde(rename = "type")]
    pub state_type: String,
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub team_id: String,
    pub project_id: String,
    /// 0 = none, 1 = urgent ... 4 = low.
    pub priority: u8,
    /// Initial workflow state; the team default applies when `None`.
    pub state_id: Option<String>,
}

/// An issue as returned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedIssue {
    pub id: String,
    pub identifier: String,
    pub title: String,
}

/// Semantic workflow states the harness needs to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Not yet started.
    Backlog,
    /// Work in progress.
    Started,
    /// Done.
    Completed,
    /// Abandoned.
    Canceled,
}

impl StateKind {
    /// Returns true if `state` is this kind.
    pub fn matches(&self, state: &WorkflowState) -> bool {
        match self {
            StateKind::Backlog => state.name == "Backlog" || state.state_type == "backlog",
            StateKind::Started => state.name == "In Progress" || state.state_type == "started",
            StateKind::Completed => state.state_type == "completed",
            StateKind::Canceled => {
                state.name == "Canceled"
                    || state.state_type == "canceled"
                    || state.state_type == "cancelled"
            }
        }
    }
}

/// Finds the first state of the given kind.
pub fn find_state(states: &[WorkflowState], kind: StateKind) -> Option<&WorkflowState> {
    states.iter().find(|s| kind.matches(s))
}

/// Narrow operation set over the issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Resolves a team by key, or the first team in the workspace when `key` is `None`.
    async fn resolve_team(&self, key: Option<&str>) -> Result<Team>;

    /// Creates a project owned by `team_id`.
    async fn create_project(&self, name: &str, content: &str, team_id: &str) -> Result<Project>;

    /// Archives a project.
    async fn archive_project(&self, project_id: &str) -> Result<()>;

    /// Creates an issue.
    async fn create_issue(&self, issue: &NewIssue) -> Result<TrackedIssue>;

    /// Records that `blocker_id` blocks `blocked_id`.
    async fn create_blocks_relation(&self, blocked_id: &str, blocker_id: &str) -> Result<()>;

    /// Moves an issue to a workflow state.
    async fn update_issue_state(&self, issue_id: &str, state_id: &str) -> Result<()>;

    /// Lists the workflow states of a team.
    async fn workflow_states(&self, team_id: &str) -> Result<Vec<WorkflowState>>;

    /// Returns an issue's current workflow state.
    async fn issue_state(&self, issue_id: &str) -> Result<WorkflowState>;

    /// Lists the comments on an issue.
    async fn issue_comments(&self, issue_id: &str) -> Result<Vec<Comment>>;

    /// Adds a comment to an issue.
    async fn create_comment(&self, issue_id: &str, body: &str) -> Result<()>;

    /// Lists the issues in a project.
    async fn project_issues(&self, project_id: &str) -> Result<Vec<TrackedIssue>>;

    /// Returns the id of the team's first state of `kind`, if any.
    async fn state_id(&self, team_id: &str, kind: StateKind) -> Result<Option<String>> {
        let states = self.workflow_states(team_id).await?;
        Ok(find_state(&states, kind).map(|s| s.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: &str, name: &str, state_type: &str) -> WorkflowState {
        WorkflowState {
            id: id.to_string(),
            name: name.to_string(),
            state_type: state_type.to_string(),
        }
    }

    fn team_states() -> Vec<WorkflowState> {
        vec![
            state("s1", "Triage", "triage"),
            state("s2", "Icebox", "backlog"),
            state("s3", "Todo", "unstarted"),
            state("s4", "Doing", "started"),
            state("s5", "Done", "completed"),
            state("s6", "Won't do", "canceled"),
        ]
    }

    #[test]
    fn finds_states_by_type_when_names_differ() {
        let states = team_states();
        assert_eq!(find_state(&states, StateKind::Backlog).unwrap().id, "s2");
        assert_eq!(find_state(&states, StateKind::Started).unwrap().id, "s4");
        assert_eq!(find_state(&states, StateKind::Completed).unwrap().id, "s5");
        assert_eq!(find_state(&states, StateKind::Canceled).unwrap().id, "s6");
    }

    #[test]
    fn finds_states_by_name() {
        let states = vec![
            state("a", "In Progress", "custom"),
            state("b", "Canceled", "custom"),
            state("c", "Backlog", "custom"),
        ];
        assert_eq!(find_state(&states, StateKind::Started).unwrap().id, "a");
        assert_eq!(find_state(&states, StateKind::Canceled).unwrap().id, "b");
        assert_eq!(find_state(&states, StateKind::Backlog).unwrap().id, "c");
    }

    #[test]
    fn accepts_both_canceled_spellings() {
        assert!(StateKind::Canceled.matches(&state("x", "Closed", "cancelled")));
        assert!(StateKind::Canceled.matches(&state("x", "Closed", "canceled")));
    }

    #[test]
    fn missing_kind_returns_none() {
        let states = vec![state("a", "Todo", "unstarted")];
        assert!(find_state(&states, StateKind::Canceled).is_none());
    }
}
