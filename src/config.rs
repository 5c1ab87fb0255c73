//! Harness configuration.
//!
//! Settings come from an optional `harness.toml` in the tests directory and
//! are then overridden from the environment. Secrets are only ever read from
//! the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::optional_env;
use crate::error::{Error, Result};

/// File name of the optional configuration file inside the tests directory.
pub const CONFIG_FILE_NAME: &str = "harness.toml";

/// Environment variable holding the tracker API key.
pub const LINEAR_API_KEY_VAR: &str = "LINEAR_API_KEY";
/// Environment variable selecting the tracker team by key.
pub const LINEAR_TEAM_KEY_VAR: &str = "LINEAR_TEAM_KEY";
/// Environment variable naming the GitHub organization for ephemeral repos.
pub const GITHUB_TEST_ORG_VAR: &str = "GITHUB_TEST_ORG";

/// Configuration for a fixture lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Root of the test suite; the manifest and scaffolded repos live here.
    #[serde(skip)]
    pub tests_dir: PathBuf,

    /// Fixture templates, relative to `tests_dir` unless absolute.
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: PathBuf,

    /// Plugin under test, relative to `tests_dir` unless absolute.
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,

    /// GitHub organization that owns ephemeral repositories.
    #[serde(default = "default_github_org")]
    pub github_org: String,

    /// Tracker team key; the first team in the workspace is used when unset.
    #[serde(default)]
    pub team_key: Option<String>,

    /// Agent CLI binary.
    #[serde(default = "default_agent_cli")]
    pub agent_cli: String,

    /// Maximum agent turns.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Agent wall-clock timeout in seconds.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout: u64,

    /// Shell command that installs scaffold dependencies. Empty skips install.
    #[serde(default = "default_install_command")]
    pub install_command: String,

    /// Database container image.
    #[serde(default = "default_database_image")]
    pub database_image: String,

    /// Database readiness deadline in seconds.
    #[serde(default = "default_db_ready_timeout")]
    pub db_ready_timeout: u64,

    /// Tracker API key, populated from the environment only.
    #[serde(skip)]
    pub linear_api_key: Option<String>,
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from("fixtures")
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("../plugins/linear-pm")
}

fn default_github_org() -> String {
    "theailaunchpad".to_string()
}

fn default_agent_cli() -> String {
    "claude".to_string()
}

fn default_max_turns() -> u32 {
    100
}

fn default_agent_timeout() -> u64 {
    20 * 60
}

fn default_install_command() -> String {
    "bun install".to_string()
}

fn default_database_image() -> String {
    "postgres:16-alpine".to_string()
}

fn default_db_ready_timeout() -> u64 {
    30
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tests_dir: PathBuf::from("."),
            fixtures_dir: default_fixtures_dir(),
            plugin_dir: default_plugin_dir(),
            github_org: default_github_org(),
            team_key: None,
            agent_cli: default_agent_cli(),
            max_turns: default_max_turns(),
            agent_timeout: default_agent_timeout(),
            install_command: default_install_command(),
            database_image: default_database_image(),
            db_ready_timeout: default_db_ready_timeout(),
            linear_api_key: None,
        }
    }
}

impl HarnessConfig {
    /// Loads configuration for the given tests directory.
    ///
    /// Reads `harness.toml` when present, then applies environment overrides.
    pub fn load(tests_dir: impl Into<PathBuf>) -> Result<Self> {
        let tests_dir = tests_dir.into();
        let path = tests_dir.join(CONFIG_FILE_NAME);

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };

        config.tests_dir = tests_dir;
        config.apply_env();
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", CONFIG_FILE_NAME, e)))
    }

    /// Applies environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        if let Some(org) = optional_env(GITHUB_TEST_ORG_VAR) {
            self.github_org = org;
        }
        if let Some(team) = optional_env(LINEAR_TEAM_KEY_VAR) {
            self.team_key = Some(team);
        }
        self.linear_api_key = optional_env(LINEAR_API_KEY_VAR);
    }

    /// Returns the tracker API key or a precondition error.
    pub fn api_key(&self) -> Result<&str> {
        self.linear_api_key
            .as_deref()
            .ok_or_else(|| Error::MissingEnv(LINEAR_API_KEY_VAR.to_string()))
    }

    /// Resolved fixtures directory.
    pub fn fixtures_dir(&self) -> PathBuf {
        self.resolve(&self.fixtures_dir)
    }

    /// Resolved plugin directory.
    pub fn plugin_dir(&self) -> PathBuf {
        self.resolve(&self.plugin_dir)
    }

    /// Directory that holds scaffolded repositories.
    pub fn repos_dir(&self) -> PathBuf {
        self.tests_dir.join(".test-repos")
    }

    /// Agent timeout as a Duration.
    pub fn agent_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.agent_timeout)
    }

    /// Database readiness timeout as a Duration.
    pub fn db_ready_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.db_ready_timeout)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.tests_dir.join(path)
        }
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for HarnessConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.github_org.trim().is_empty() {
            result.add_error("github_org cannot be empty");
        }

        if self.agent_cli.trim().is_empty() {
            result.add_error("agent_cli cannot be empty");
        }

        if self.max_turns == 0 {
            result.add_error("max_turns must be at least 1");
        }

        if self.agent_timeout == 0 {
            result.add_error("agent_timeout must be greater than zero");
        }

        if self.db_ready_timeout == 0 {
            result.add_error("db_ready_timeout must be greater than zero");
        }

        if self.linear_api_key.is_none() {
            result.add_warning(format!("{} is not set", LINEAR_API_KEY_VAR));
        }

        if self.agent_timeout > 2 * 60 * 60 {
            result.add_warning("agent_timeout over 2 hours may indicate a misconfiguration");
        }

        if !self.plugin_dir().exists() {
            result.add_warning(format!(
                "plugin_dir '{}' does not exist",
                self.plugin_dir().display()
            ));
        }

        result
    }
}
