//! Transport credentials for the agent and redaction of secret values.
//!
//! The credential file is written into the scaffolded repository only after
//! the initial commit, so the token never lands in version history.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// File name of the MCP server configuration inside the scaffolded repository.
pub const MCP_CONFIG_FILE_NAME: &str = ".mcp.json";

/// Remote MCP endpoint for the tracker.
pub const LINEAR_MCP_URL: &str = "https://mcp.linear.app/mcp";

/// One MCP server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
    #[serde(rename = "type")]
    pub transport: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

/// Top-level MCP configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    pub mcp_servers: BTreeMap<String, McpServer>,
}

impl McpConfig {
    /// Builds a configuration with a single bearer-authenticated tracker server.
    pub fn linear(api_key: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", api_key));

        let mut mcp_servers = BTreeMap::new();
        mcp_servers.insert(
            "linear".to_string(),
            McpServer {
                transport: "http".to_string(),
                url: LINEAR_MCP_URL.to_string(),
                headers,
            },
        );

        Self { mcp_servers }
    }
}

/// Writes the tracker credential file into `repo_dir` and returns its path.
pub fn write_mcp_config(repo_dir: &Path, api_key: &str) -> Result<PathBuf> {
    let path = repo_dir.join(MCP_CONFIG_FILE_NAME);
    let mut json = serde_json::to_string_pretty(&McpConfig::linear(api_key))?;
    json.push('\n');
    std::fs::write(&path, json)?;

    tracing::debug!(path = ?path, "wrote credential file");
    Ok(path)
}

/// Replaces known secret values in text before it is logged.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// (name, value), longest value first.
    secrets: Vec<(String, String)>,
}

impl Redactor {
    /// Creates an empty redactor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a secret. Empty values are ignored.
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() || self.secrets.iter().any(|(_, v)| *v == value) {
            return self;
        }

        self.secrets.push((name.into(), value));
        // Longer values first so a secret containing another is fully masked.
        self.secrets.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        self
    }

    /// Returns true if any secrets are registered.
    pub fn has_secrets(&self) -> bool {
        !self.secrets.is_empty()
    }

    /// Replaces each secret value with `[REDACTED:<name>]`.
    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (name, value) in &self.secrets {
            result = result.replace(value, &format!("[REDACTED:{}]", name));
        }
        result
    }
}
