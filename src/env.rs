//! Environment loading.
//!
//! Values from a `KEY=VALUE` file are merged into the process environment,
//! but anything already set in the environment wins.

use std::path::Path;

use crate::error::{Error, Result};

/// Name of the local override file inside the tests directory.
pub const ENV_FILE_NAME: &str = ".env.local";

/// Loads `path` into the process environment without clobbering pre-set values.
///
/// Returns `Ok(false)` when the file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    if !path.exists() {
        tracing::debug!(path = ?path, "no env file, skipping");
        return Ok(false);
    }

    dotenvy::from_path(path)
        .map_err(|e| Error::Config(format!("failed to load {}: {}", path.display(), e)))?;

    tracing::debug!(path = ?path, "loaded env file");
    Ok(true)
}

/// Returns the value of `key`, falling back to `fallback` when unset or empty.
pub fn require_env(key: &str, fallback: Option<&str>) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => fallback
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::MissingEnv(key.to_string())),
    }
}

/// Returns the value of `key` if set and non-empty.
pub fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_env_file_does_not_override_existing_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(ENV_FILE_NAME);
        std::fs::write(
            &path,
            "# comment\nFH_TEST_PRESET=from-file\nFH_TEST_FRESH=fresh\n",
        )
        .unwrap();

        std::env::set_var("FH_TEST_PRESET", "from-process");
        assert!(load_env_file(&path).unwrap());

        assert_eq!(std::env::var("FH_TEST_PRESET").unwrap(), "from-process");
        assert_eq!(std::env::var("FH_TEST_FRESH").unwrap(), "fresh");
    }

    #[test]
    fn load_env_file_missing_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(!load_env_file(&temp.path().join("absent")).unwrap());
    }

    #[test]
    fn require_env_uses_fallback() {
        std::env::remove_var("FH_TEST_UNSET_WITH_FALLBACK");
        let value = require_env("FH_TEST_UNSET_WITH_FALLBACK", Some("theailaunchpad")).unwrap();
        assert_eq!(value, "theailaunchpad");
    }

    #[test]
    fn require_env_missing_is_precondition_error() {
        std::env::remove_var("FH_TEST_DEFINITELY_UNSET");
        let err = require_env("FH_TEST_DEFINITELY_UNSET", None).unwrap_err();
        assert!(matches!(err, Error::MissingEnv(ref k) if k == "FH_TEST_DEFINITELY_UNSET"));
        assert!(err.is_precondition());
    }
}
