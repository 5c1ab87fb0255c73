//! In-memory adapters for exercising lifecycle code without external systems.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::container::{database_url, ContainerRuntime, PgContainer};
use crate::error::{Error, Result};
use crate::runner::{AgentRunConfig, AgentRunResult, AgentRunner, TerminalResult};
use crate::scm::{CheckRun, CommentAuthor, PrComment, PullRequestInfo, SourceControl};
use crate::tracker::{
    Comment, IssueTracker, NewIssue, Project, Team, TrackedIssue, WorkflowState,
};

fn state(id: &str, name: &str, state_type: &str) -> WorkflowState {
    WorkflowState {
        id: id.to_string(),
        name: name.to_string(),
        state_type: state_type.to_string(),
    }
}

/// An issue held by [`FakeTracker`].
#[derive(Debug, Clone)]
pub struct FakeIssue {
    pub issue: TrackedIssue,
    pub description: String,
    pub project_id: String,
    pub priority: u8,
    pub state_id: String,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Default)]
struct TrackerState {
    teams: Vec<Team>,
    states: Vec<WorkflowState>,
    projects: Vec<Project>,
    archived: Vec<String>,
    issues: Vec<FakeIssue>,
    /// (blocked, blocker)
    relations: Vec<(String, String)>,
    next_number: u32,
}

/// In-memory issue tracker with one team and a conventional workflow.
pub struct FakeTracker {
    state: Mutex<TrackerState>,
    failing: Mutex<HashSet<&'static str>>,
}

impl Default for FakeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTracker {
    /// Creates a tracker with team `ENG` and Backlog, Todo, In Progress, Done
    /// and Canceled states.
    pub fn new() -> Self {
        let state = TrackerState {
            teams: vec![Team {
                id: "team-eng".to_string(),
                key: "ENG".to_string(),
            }],
            states: vec![
                state("st-backlog", "Backlog", "backlog"),
                state("st-todo", "Todo", "unstarted"),
                state("st-progress", "In Progress", "started"),
                state("st-done", "Done", "completed"),
                state("st-canceled", "Canceled", "canceled"),
            ],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Replaces the team's workflow states.
    pub fn with_states(self, states: Vec<WorkflowState>) -> Self {
        self.state.lock().unwrap().states = states;
        self
    }

    /// Makes the named operation fail, e.g. `"archive_project"`.
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(Error::Tracker(format!("{} failed (injected)", operation)));
        }
        Ok(())
    }

    /// All issues created so far.
    pub fn issues(&self) -> Vec<FakeIssue> {
        self.state.lock().unwrap().issues.clone()
    }

    /// All blocks relations as (blocked id, blocker id).
    pub fn relations(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().relations.clone()
    }

    /// Ids of archived projects.
    pub fn archived_projects(&self) -> Vec<String> {
        self.state.lock().unwrap().archived.clone()
    }

    /// Name of an issue's current state.
    pub fn state_name_of(&self, issue_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        let issue = state.issues.iter().find(|i| i.issue.id == issue_id)?;
        state
            .states
            .iter()
            .find(|s| s.id == issue.state_id)
            .map(|s| s.name.clone())
    }

    /// Moves an issue to the state named `name`, as the agent would.
    pub fn set_state_by_name(&self, issue_id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let Some(state_id) = state.states.iter().find(|s| s.name == name).map(|s| s.id.clone())
        else {
            return;
        };
        if let Some(issue) = state.issues.iter_mut().find(|i| i.issue.id == issue_id) {
            issue.state_id = state_id;
        }
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn resolve_team(&self, key: Option<&str>) -> Result<Team> {
        self.check("resolve_team")?;
        let state = self.state.lock().unwrap();
        match key {
            Some(key) => state.teams.iter().find(|t| t.key == key).cloned().ok_or_else(|| {
                Error::Tracker(format!("team with key \"{}\" not found", key))
            }),
            None => state
                .teams
                .first()
                .cloned()
                .ok_or_else(|| Error::Tracker("no teams found in workspace".to_string())),
        }
    }

    async fn create_project(&self, name: &str, _content: &str, _team_id: &str) -> Result<Project> {
        self.check("create_project")?;
        let mut state = self.state.lock().unwrap();
        let project = Project {
            id: format!("proj-{}", state.projects.len() + 1),
            name: name.to_string(),
        };
        state.projects.push(project.clone());
        Ok(project)
    }

    async fn archive_project(&self, project_id: &str) -> Result<()> {
        self.check("archive_project")?;
        self.state.lock().unwrap().archived.push(project_id.to_string());
        Ok(())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<TrackedIssue> {
        self.check("create_issue")?;
        let mut state = self.state.lock().unwrap();
        state.next_number += 1;
        let team_key = state
            .teams
            .iter()
            .find(|t| t.id == issue.team_id)
            .map(|t| t.key.clone())
            .unwrap_or_else(|| "ENG".to_string());

        let tracked = TrackedIssue {
            id: format!("issue-{}", state.next_number),
            identifier: format!("{}-{}", team_key, state.next_number),
            title: issue.title.clone(),
        };
        let default_state = state.states.first().map(|s| s.id.clone()).unwrap_or_default();
        state.issues.push(FakeIssue {
            issue: tracked.clone(),
            description: issue.description.clone(),
            project_id: issue.project_id.clone(),
            priority: issue.priority,
            state_id: issue.state_id.clone().unwrap_or(default_state),
            comments: Vec::new(),
        });
        Ok(tracked)
    }

    async fn create_blocks_relation(&self, blocked_id: &str, blocker_id: &str) -> Result<()> {
        self.check("create_blocks_relation")?;
        self.state
            .lock()
            .unwrap()
            .relations
            .push((blocked_id.to_string(), blocker_id.to_string()));
        Ok(())
    }

    async fn update_issue_state(&self, issue_id: &str, state_id: &str) -> Result<()> {
        self.check("update_issue_state")?;
        let mut state = self.state.lock().unwrap();
        let issue = state
            .issues
            .iter_mut()
            .find(|i| i.issue.id == issue_id)
            .ok_or_else(|| Error::Tracker(format!("issue {} not found", issue_id)))?;
        issue.state_id = state_id.to_string();
        Ok(())
    }

    async fn workflow_states(&self, _team_id: &str) -> Result<Vec<WorkflowState>> {
        self.check("workflow_states")?;
        Ok(self.state.lock().unwrap().states.clone())
    }

    async fn issue_state(&self, issue_id: &str) -> Result<WorkflowState> {
        self.check("issue_state")?;
        let state = self.state.lock().unwrap();
        let issue = state
            .issues
            .iter()
            .find(|i| i.issue.id == issue_id)
            .ok_or_else(|| Error::Tracker(format!("issue {} not found", issue_id)))?;
        state
            .states
            .iter()
            .find(|s| s.id == issue.state_id)
            .cloned()
            .ok_or_else(|| Error::Tracker(format!("state {} not found", issue.state_id)))
    }

    async fn issue_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        self.check("issue_comments")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .issues
            .iter()
            .find(|i| i.issue.id == issue_id)
            .map(|i| i.comments.clone())
            .unwrap_or_default())
    }

    async fn create_comment(&self, issue_id: &str, body: &str) -> Result<()> {
        self.check("create_comment")?;
        let mut state = self.state.lock().unwrap();
        let issue = state
            .issues
            .iter_mut()
            .find(|i| i.issue.id == issue_id)
            .ok_or_else(|| Error::Tracker(format!("issue {} not found", issue_id)))?;
        issue.comments.push(Comment {
            body: body.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn project_issues(&self, project_id: &str) -> Result<Vec<TrackedIssue>> {
        self.check("project_issues")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .issues
            .iter()
            .filter(|i| i.project_id == project_id)
            .map(|i| i.issue.clone())
            .collect())
    }
}

#[derive(Debug, Default)]
struct ScmState {
    created: Vec<(String, PathBuf)>,
    pushed: Vec<String>,
    deleted: Vec<String>,
    branches: Vec<String>,
    prs: Vec<PullRequestInfo>,
    comments: HashMap<u64, Vec<PrComment>>,
    /// Successive check observations; the last one repeats.
    checks: VecDeque<Vec<CheckRun>>,
    check_calls: usize,
}

/// In-memory source-control host.
#[derive(Default)]
pub struct FakeSourceControl {
    state: Mutex<ScmState>,
    failing: Mutex<HashSet<&'static str>>,
}

impl FakeSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named operation fail, e.g. `"delete_repo"`.
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(Error::GitHub(format!("{} failed (injected)", operation)));
        }
        Ok(())
    }

    /// Adds a remote branch.
    pub fn add_branch(&self, name: &str) {
        self.state.lock().unwrap().branches.push(name.to_string());
    }

    /// Adds an open pull request from `head`.
    pub fn add_pr(&self, number: u64, head: &str) {
        self.state.lock().unwrap().prs.push(PullRequestInfo {
            number,
            title: format!("PR {}", number),
            state: "OPEN".to_string(),
            head_ref_name: head.to_string(),
            url: format!("https://github.com/org/repo/pull/{}", number),
        });
    }

    /// Adds a conversation comment to a pull request.
    pub fn add_comment(&self, number: u64, author: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .comments
            .entry(number)
            .or_default()
            .push(PrComment {
                author: CommentAuthor {
                    login: author.to_string(),
                },
                body: body.to_string(),
                created_at: Utc::now(),
            });
    }

    /// Queues one observation of check runs as (name, state) pairs.
    pub fn push_checks(&self, checks: &[(&str, &str)]) {
        self.state.lock().unwrap().checks.push_back(
            checks
                .iter()
                .map(|(name, state)| CheckRun {
                    name: name.to_string(),
                    state: state.to_string(),
                    bucket: None,
                })
                .collect(),
        );
    }

    /// Number of times checks were observed.
    pub fn check_calls(&self) -> usize {
        self.state.lock().unwrap().check_calls
    }

    /// Repositories created, as (full name, local path).
    pub fn created_repos(&self) -> Vec<(String, PathBuf)> {
        self.state.lock().unwrap().created.clone()
    }

    /// Repositories pushed to.
    pub fn pushed_repos(&self) -> Vec<String> {
        self.state.lock().unwrap().pushed.clone()
    }

    /// Repositories deleted.
    pub fn deleted_repos(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

impl SourceControl for FakeSourceControl {
    fn create_repo(&self, org: &str, name: &str, local_path: &Path) -> Result<String> {
        self.check("create_repo")?;
        let full_name = format!("{}/{}", org, name);
        self.state
            .lock()
            .unwrap()
            .created
            .push((full_name.clone(), local_path.to_path_buf()));
        Ok(full_name)
    }

    fn push(&self, full_name: &str, _local_path: &Path) -> Result<()> {
        self.check("push")?;
        self.state.lock().unwrap().pushed.push(full_name.to_string());
        Ok(())
    }

    fn delete_repo(&self, full_name: &str) -> Result<()> {
        self.check("delete_repo")?;
        self.state.lock().unwrap().deleted.push(full_name.to_string());
        Ok(())
    }

    fn list_prs(&self, _repo: &str) -> Vec<PullRequestInfo> {
        if self.check("list_prs").is_err() {
            return Vec::new();
        }
        self.state.lock().unwrap().prs.clone()
    }

    fn pr_details(&self, _repo: &str, number: u64) -> Option<PullRequestInfo> {
        self.state
            .lock()
            .unwrap()
            .prs
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
    }

    fn pr_comments(&self, _repo: &str, number: u64) -> Vec<PrComment> {
        if self.check("pr_comments").is_err() {
            return Vec::new();
        }
        self.state
            .lock()
            .unwrap()
            .comments
            .get(&number)
            .cloned()
            .unwrap_or_default()
    }

    fn pr_checks(&self, _repo: &str, _number: u64) -> Vec<CheckRun> {
        let mut state = self.state.lock().unwrap();
        state.check_calls += 1;
        if state.checks.len() > 1 {
            state.checks.pop_front().unwrap_or_default()
        } else {
            state.checks.front().cloned().unwrap_or_default()
        }
    }

    fn list_branches(&self, _repo: &str) -> Vec<String> {
        if self.check("list_branches").is_err() {
            return Vec::new();
        }
        self.state.lock().unwrap().branches.clone()
    }
}

/// In-memory container runtime.
#[derive(Default)]
pub struct FakeContainers {
    started: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    fail_start: Mutex<bool>,
    fail_remove: Mutex<bool>,
}

impl FakeContainers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next start fail with a readiness timeout.
    pub fn fail_start(&self) {
        *self.fail_start.lock().unwrap() = true;
    }

    /// Makes removal fail.
    pub fn fail_remove(&self) {
        *self.fail_remove.lock().unwrap() = true;
    }

    /// Names of started containers.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Ids of removed containers.
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeContainers {
    async fn start_postgres(&self, run_id: &str) -> Result<PgContainer> {
        if *self.fail_start.lock().unwrap() {
            return Err(Error::Timeout {
                label: "database to become ready".to_string(),
                after: Duration::from_secs(30),
            });
        }
        let name = format!("test-pg-{}", run_id);
        self.started.lock().unwrap().push(name);
        Ok(PgContainer {
            container_id: "fake-container".to_string(),
            port: 55432,
            database_url: database_url(55432),
        })
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        if *self.fail_remove.lock().unwrap() {
            return Err(Error::Container(format!("no such container: {}", container_id)));
        }
        self.removed.lock().unwrap().push(container_id.to_string());
        Ok(())
    }
}

/// Agent runner that returns a canned result.
pub struct FakeAgentRunner {
    result: AgentRunResult,
    calls: Mutex<Vec<AgentRunConfig>>,
}

impl FakeAgentRunner {
    /// A runner whose agent exits 0 with a successful result record.
    pub fn succeeding() -> Self {
        let raw = "{\"type\":\"result\",\"is_error\":false,\"result\":\"done\"}\n";
        Self::with_result(AgentRunResult {
            exit_code: Some(0),
            terminal: Some(TerminalResult {
                record_type: "result".to_string(),
                result: Some("done".to_string()),
                ..Default::default()
            }),
            raw_stdout: raw.to_string(),
            duration: Duration::from_secs(1),
        })
    }

    /// A runner returning `result`.
    pub fn with_result(result: AgentRunResult) -> Self {
        Self {
            result,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Configs passed to `run`.
    pub fn calls(&self) -> Vec<AgentRunConfig> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRunner for FakeAgentRunner {
    async fn run(&self, config: &AgentRunConfig) -> Result<AgentRunResult> {
        self.calls.lock().unwrap().push(config.clone());
        Ok(self.result.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
