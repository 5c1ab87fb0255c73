//! Declarative fixture catalog.
//!
//! Issue definitions live in `fixtures/issues.yaml` and are embedded at
//! build time. A [`FixtureSelector`] picks either one issue from the single
//! catalog or the full project graph.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::config::{Validate, ValidationResult};
use crate::error::{Error, Result};

const BUILTIN_CATALOG: &str = include_str!("../fixtures/issues.yaml");

/// One issue to create in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueDef {
    pub key: String,
    pub title: String,
    pub wave: u32,
    /// 1 = urgent ... 4 = low.
    pub priority: u8,
    #[serde(default)]
    pub blocked_by_keys: Vec<String>,
    /// Whether resolving this issue requires a database.
    #[serde(default)]
    pub needs_db: bool,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SingleCatalog {
    title: String,
    default_key: String,
    issues: Vec<IssueDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProjectCatalog {
    title: String,
    issues: Vec<IssueDef>,
}

/// All known fixtures.
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    single: SingleCatalog,
    project: ProjectCatalog,
}

/// Which fixture to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureSelector {
    /// One issue by key; the catalog default when `None`.
    Single(Option<String>),
    /// The full dependency graph.
    Project,
}

/// Kind of a resolved fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureKind {
    Single,
    Project,
}

/// A resolved fixture: what setup will create.
#[derive(Debug, Clone)]
pub struct FixturePlan {
    pub kind: FixtureKind,
    /// Used in the project name.
    pub title: String,
    pub issues: Vec<IssueDef>,
}

impl Catalog {
    /// Loads the catalog embedded in the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    /// Parses a catalog from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid fixture catalog: {}", e)))
    }

    /// Keys selectable as single-issue fixtures.
    pub fn single_keys(&self) -> Vec<&str> {
        self.single.issues.iter().map(|i| i.key.as_str()).collect()
    }

    /// Resolves a selector into a plan.
    pub fn plan(&self, selector: &FixtureSelector) -> Result<FixturePlan> {
        match selector {
            FixtureSelector::Single(key) => {
                let key = key
                    .as_deref()
                    .unwrap_or(&self.single.default_key)
                    .trim()
                    .to_uppercase();

                let def = self
                    .single
                    .issues
                    .iter()
                    .find(|i| i.key == key)
                    .ok_or_else(|| Error::UnknownFixture {
                        key: key.clone(),
                        available: self.single_keys().join(", "),
                    })?;

                Ok(FixturePlan {
                    kind: FixtureKind::Single,
                    title: self.single.title.clone(),
                    issues: vec![def.clone()],
                })
            }
            FixtureSelector::Project => Ok(FixturePlan {
                kind: FixtureKind::Project,
                title: self.project.title.clone(),
                issues: self.project.issues.clone(),
            }),
        }
    }
}

fn validate_issues(issues: &[IssueDef], catalog: &str, result: &mut ValidationResult) {
    let mut seen: Vec<&str> = Vec::new();
    for issue in issues {
        if seen.contains(&issue.key.as_str()) {
            result.add_error(format!("{}: duplicate issue key {}", catalog, issue.key));
        }
        for blocker in &issue.blocked_by_keys {
            if !seen.contains(&blocker.as_str()) {
                result.add_error(format!(
                    "{}: {} is blocked by {} which is not declared before it",
                    catalog, issue.key, blocker
                ));
            }
        }
        if issue.priority > 4 {
            result.add_warning(format!("{}: {} has priority {} (> 4)", catalog, issue.key, issue.priority));
        }
        seen.push(&issue.key);
    }
}

impl Validate for Catalog {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        validate_issues(&self.single.issues, "single", &mut result);
        validate_issues(&self.project.issues, "project", &mut result);

        if !self.single.issues.iter().any(|i| i.key == self.single.default_key) {
            result.add_error(format!(
                "single: default key {} is not in the catalog",
                self.single.default_key
            ));
        }
        result
    }
}

impl FixturePlan {
    /// Returns true if any issue needs a database.
    pub fn needs_db(&self) -> bool {
        self.issues.iter().any(|i| i.needs_db)
    }

    /// Whether setup pushes a remote repository and hands the agent credentials.
    pub fn provisions_remote(&self) -> bool {
        self.kind == FixtureKind::Single
    }

    /// Tracker project name for a run.
    pub fn project_name(&self, stamp: &RunStamp) -> String {
        format!("[Test] {} - {}", self.title, stamp.iso())
    }

    /// Tracker project description, if any.
    pub fn project_content(&self) -> Option<String> {
        match (self.kind, self.issues.first()) {
            (FixtureKind::Single, Some(issue)) => Some(format!(
                "E2E test for {} skill. Issue {}: {}",
                self.title, issue.key, issue.title
            )),
            _ => None,
        }
    }

    /// Issue key -> blocking keys, for issues with at least one blocker.
    pub fn dependency_map(&self) -> BTreeMap<String, Vec<String>> {
        dependency_map(&self.issues)
    }

    /// Wave -> issue keys in declaration order.
    pub fn wave_map(&self) -> BTreeMap<u32, Vec<String>> {
        wave_map(&self.issues)
    }
}

/// Maps each blocked issue to its blockers. Unblocked issues are omitted.
pub fn dependency_map(issues: &[IssueDef]) -> BTreeMap<String, Vec<String>> {
    issues
        .iter()
        .filter(|i| !i.blocked_by_keys.is_empty())
        .map(|i| (i.key.clone(), i.blocked_by_keys.clone()))
        .collect()
}

/// Groups issue keys by wave, preserving declaration order within a wave.
pub fn wave_map(issues: &[IssueDef]) -> BTreeMap<u32, Vec<String>> {
    let mut waves: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for issue in issues {
        waves.entry(issue.wave).or_default().push(issue.key.clone());
    }
    waves
}

/// Timestamp shared by every resource name in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp(pub DateTime<Utc>);

impl RunStamp {
    /// Stamp for the current instant.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// RFC 3339 with millisecond precision, e.g. `2026-03-01T12:30:45.123Z`.
    pub fn iso(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Filesystem and repository safe form of [`RunStamp::iso`].
    pub fn slug(&self) -> String {
        self.iso().replace([':', '.'], "-")
    }

    /// Local repository directory name.
    pub fn repo_dir_name(&self) -> String {
        format!("task-manager-api-{}", self.slug())
    }

    /// Remote repository name.
    pub fn remote_repo_name(&self) -> String {
        format!("test-task-manager-api-{}", self.slug())
    }
}
