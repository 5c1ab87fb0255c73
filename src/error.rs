//! Error types for fixture orchestration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for fixture lifecycle operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A manifest is already present, so a previous fixture was never torn down.
    #[error("manifest already exists at {0}; run teardown first")]
    ManifestExists(PathBuf),

    /// No manifest is present, so there is nothing provisioned.
    #[error("manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    /// A required environment variable is not set.
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    /// The fixture selector does not name a known issue definition.
    #[error("unknown issue key \"{key}\"; available: {available}")]
    UnknownFixture { key: String, available: String },

    /// Harness configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A bounded wait ran past its deadline.
    #[error("timed out waiting for {label} after {}ms", .after.as_millis())]
    Timeout { label: String, after: Duration },

    /// Issue tracker operation failed.
    #[error("tracker operation failed: {0}")]
    Tracker(String),

    /// GitHub operation failed.
    #[error("GitHub operation failed: {0}")]
    GitHub(String),

    /// Git operation failed.
    #[error("git operation failed: {0}")]
    Git(String),

    /// Container runtime operation failed.
    #[error("container operation failed: {0}")]
    Container(String),

    /// The agent subprocess could not be launched or awaited.
    #[error("agent process failed: {0}")]
    Agent(String),

    /// Copying or preparing the scaffolded repository failed.
    #[error("scaffold failed: {0}")]
    Scaffold(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for errors raised before any external resource is touched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::ManifestExists(_)
                | Error::ManifestNotFound(_)
                | Error::MissingEnv(_)
                | Error::UnknownFixture { .. }
                | Error::Config(_)
        )
    }

    /// Returns true if this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Result type alias for fixture operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_carries_label() {
        let err = Error::Timeout {
            label: "CI checks to complete".to_string(),
            after: Duration::from_secs(300),
        };
        assert_eq!(
            err.to_string(),
            "timed out waiting for CI checks to complete after 300000ms"
        );
        assert!(err.is_timeout());
        assert!(!err.is_precondition());
    }

    #[test]
    fn manifest_errors_are_preconditions() {
        assert!(Error::ManifestExists(PathBuf::from("m.json")).is_precondition());
        assert!(Error::ManifestNotFound(PathBuf::from("m.json")).is_precondition());
        assert!(!Error::GitHub("boom".into()).is_precondition());
    }
}
