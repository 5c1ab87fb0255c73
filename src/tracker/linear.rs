//! Linear GraphQL client.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

use super::{Comment, IssueTracker, NewIssue, Project, Team, TrackedIssue, WorkflowState};

/// Public Linear GraphQL endpoint.
pub const LINEAR_GRAPHQL_ENDPOINT: &str = "https://api.linear.app/graphql";

const TEAMS_QUERY: &str = "query Teams($filter: TeamFilter) { teams(filter: $filter) { nodes { id key } } }";

const PROJECT_CREATE: &str = "mutation ProjectCreate($input: ProjectCreateInput!) { projectCreate(input: $input) { success project { id name } } }";

const PROJECT_ARCHIVE: &str =
    "mutation ProjectArchive($id: String!) { projectArchive(id: $id) { success } }";

const ISSUE_CREATE: &str = "mutation IssueCreate($input: IssueCreateInput!) { issueCreate(input: $input) { success issue { id identifier title } } }";

const ISSUE_RELATION_CREATE: &str = "mutation IssueRelationCreate($input: IssueRelationCreateInput!) { issueRelationCreate(input: $input) { success } }";

const ISSUE_UPDATE: &str = "mutation IssueUpdate($id: String!, $input: IssueUpdateInput!) { issueUpdate(id: $id, input: $input) { success } }";

const WORKFLOW_STATES_QUERY: &str = "query WorkflowStates($teamId: ID!) { workflowStates(filter: { team: { id: { eq: $teamId } } }) { nodes { id name type } } }";

const ISSUE_STATE_QUERY: &str =
    "query IssueState($id: String!) { issue(id: $id) { state { id name type } } }";

const ISSUE_COMMENTS_QUERY: &str =
    "query IssueComments($id: String!) { issue(id: $id) { comments { nodes { body createdAt } } } }";

const COMMENT_CREATE: &str = "mutation CommentCreate($input: CommentCreateInput!) { commentCreate(input: $input) { success } }";

const PROJECT_ISSUES_QUERY: &str = "query ProjectIssues($id: String!) { project(id: $id) { issues { nodes { id identifier title } } } }";

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct Connection<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize)]
struct TeamsData {
    teams: Connection<Team>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectCreateData {
    project_create: ProjectPayload,
}

#[derive(Deserialize)]
struct ProjectPayload {
    success: bool,
    project: Option<Project>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCreateData {
    issue_create: IssuePayload,
}

#[derive(Deserialize)]
struct IssuePayload {
    success: bool,
    issue: Option<TrackedIssue>,
}

#[derive(Deserialize)]
struct SuccessPayload {
    success: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowStatesData {
    workflow_states: Connection<WorkflowState>,
}

#[derive(Deserialize)]
struct IssueData<T> {
    issue: Option<T>,
}

#[derive(Deserialize)]
struct IssueStateNode {
    state: Option<WorkflowState>,
}

#[derive(Deserialize)]
struct IssueCommentsNode {
    comments: Connection<Comment>,
}

#[derive(Deserialize)]
struct ProjectData {
    project: Option<ProjectIssuesNode>,
}

#[derive(Deserialize)]
struct ProjectIssuesNode {
    issues: Connection<TrackedIssue>,
}

/// Client for the Linear GraphQL API.
///
/// Construct once per lifecycle and pass by reference.
pub struct LinearClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl LinearClient {
    /// Creates a client authenticated with a personal API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: LINEAR_GRAPHQL_ENDPOINT.to_string(),
        }
    }

    /// Points the client at a different GraphQL endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|e| Error::Tracker(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tracker(format!("HTTP {}: {}", status, body)));
        }

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Tracker(format!("failed to parse response: {}", e)))?;

        if !body.errors.is_empty() {
            let messages: Vec<_> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(Error::Tracker(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| Error::Tracker("response contained no data".to_string()))
    }

    async fn mutate_success(&self, query: &str, field: &str, variables: Value) -> Result<()> {
        let data: Value = self.graphql(query, variables).await?;
        let payload: SuccessPayload = serde_json::from_value(data[field].clone())
            .map_err(|e| Error::Tracker(format!("unexpected {} payload: {}", field, e)))?;

        if payload.success {
            Ok(())
        } else {
            Err(Error::Tracker(format!("{} reported failure", field)))
        }
    }
}

#[async_trait]
impl IssueTracker for LinearClient {
    async fn resolve_team(&self, key: Option<&str>) -> Result<Team> {
        let filter = match key {
            Some(key) => json!({ "key": { "eq": key } }),
            None => Value::Null,
        };

        let data: TeamsData = self.graphql(TEAMS_QUERY, json!({ "filter": filter })).await?;

        data.teams.nodes.into_iter().next().ok_or_else(|| match key {
            Some(key) => Error::Tracker(format!("team with key \"{}\" not found", key)),
            None => Error::Tracker("no teams found in workspace".to_string()),
        })
    }

    async fn create_project(&self, name: &str, content: &str, team_id: &str) -> Result<Project> {
        let data: ProjectCreateData = self
            .graphql(
                PROJECT_CREATE,
                json!({ "input": { "name": name, "content": content, "teamIds": [team_id] } }),
            )
            .await?;

        match data.project_create {
            ProjectPayload {
                success: true,
                project: Some(project),
            } => {
                tracing::info!(project_id = %project.id, name = %project.name, "created tracker project");
                Ok(project)
            }
            _ => Err(Error::Tracker("failed to create project".to_string())),
        }
    }

    async fn archive_project(&self, project_id: &str) -> Result<()> {
        self.mutate_success(PROJECT_ARCHIVE, "projectArchive", json!({ "id": project_id }))
            .await
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<TrackedIssue> {
        let mut input = json!({
            "title": issue.title,
            "description": issue.description,
            "teamId": issue.team_id,
            "projectId": issue.project_id,
            "priority": issue.priority,
        });
        if let Some(state_id) = &issue.state_id {
            input["stateId"] = json!(state_id);
        }

        let data: IssueCreateData = self.graphql(ISSUE_CREATE, json!({ "input": input })).await?;

        match data.issue_create {
            IssuePayload {
                success: true,
                issue: Some(created),
            } => {
                tracing::info!(identifier = %created.identifier, "created tracker issue");
                Ok(created)
            }
            _ => Err(Error::Tracker(format!(
                "failed to create issue: {}",
                issue.title
            ))),
        }
    }

    async fn create_blocks_relation(&self, blocked_id: &str, blocker_id: &str) -> Result<()> {
        self.mutate_success(
            ISSUE_RELATION_CREATE,
            "issueRelationCreate",
            json!({
                "input": {
                    "issueId": blocked_id,
                    "relatedIssueId": blocker_id,
                    "type": "blocks",
                }
            }),
        )
        .await
    }

    async fn update_issue_state(&self, issue_id: &str, state_id: &str) -> Result<()> {
        self.mutate_success(
            ISSUE_UPDATE,
            "issueUpdate",
            json!({ "id": issue_id, "input": { "stateId": state_id } }),
        )
        .await
    }

    async fn workflow_states(&self, team_id: &str) -> Result<Vec<WorkflowState>> {
        let data: WorkflowStatesData = self
            .graphql(WORKFLOW_STATES_QUERY, json!({ "teamId": team_id }))
            .await?;
        Ok(data.workflow_states.nodes)
    }

    async fn issue_state(&self, issue_id: &str) -> Result<WorkflowState> {
        let data: IssueData<IssueStateNode> = self
            .graphql(ISSUE_STATE_QUERY, json!({ "id": issue_id }))
            .await?;

        data.issue
            .and_then(|i| i.state)
            .ok_or_else(|| Error::Tracker(format!("no state found for issue {}", issue_id)))
    }

    async fn issue_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let data: IssueData<IssueCommentsNode> = self
            .graphql(ISSUE_COMMENTS_QUERY, json!({ "id": issue_id }))
            .await?;

        data.issue
            .map(|i| i.comments.nodes)
            .ok_or_else(|| Error::Tracker(format!("issue {} not found", issue_id)))
    }

    async fn create_comment(&self, issue_id: &str, body: &str) -> Result<()> {
        self.mutate_success(
            COMMENT_CREATE,
            "commentCreate",
            json!({ "input": { "issueId": issue_id, "body": body } }),
        )
        .await
    }

    async fn project_issues(&self, project_id: &str) -> Result<Vec<TrackedIssue>> {
        let data: ProjectData = self
            .graphql(PROJECT_ISSUES_QUERY, json!({ "id": project_id }))
            .await?;

        data.project
            .map(|p| p.issues.nodes)
            .ok_or_else(|| Error::Tracker(format!("project {} not found", project_id)))
    }
}
