//! Thin wrapper over the `git` CLI.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Runs `git <args>` in `cwd` and returns trimmed stdout.
pub fn run_git(cwd: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .map_err(|e| Error::Git(format!("failed to run git {}: {}", args.join(" "), e)))?;

    if !output.status.success() {
        return Err(Error::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Initializes a repository in `path` and commits everything on `main`.
///
/// Returns the commit hash.
pub fn init_and_commit(path: &Path, message: &str) -> Result<String> {
    run_git(path, &["init"])?;
    run_git(path, &["add", "-A"])?;
    commit(path, message)?;

    // git may default to master
    run_git(path, &["branch", "-M", "main"])?;

    run_git(path, &["rev-parse", "HEAD"])
}

/// Commits staged changes, supplying a fallback identity when none is configured.
fn commit(path: &Path, message: &str) -> Result<()> {
    match run_git(path, &["commit", "-m", message]) {
        Ok(_) => Ok(()),
        Err(Error::Git(msg)) if msg.contains("Please tell me who you are") => run_git(
            path,
            &[
                "-c",
                "user.name=Fixture Harness",
                "-c",
                "user.email=fixture-harness@localhost",
                "commit",
                "-m",
                message,
            ],
        )
        .map(|_| ()),
        Err(e) => Err(e),
    }
}

/// Lists paths tracked by the repository at `path`.
pub fn tracked_files(path: &Path) -> Result<Vec<String>> {
    let out = run_git(path, &["ls-files"])?;
    Ok(out.lines().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_and_commit_creates_main_branch() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("README.md"), "# Test\n").unwrap();

        let hash = init_and_commit(temp.path(), "Initial scaffold").unwrap();
        assert_eq!(hash.len(), 40);

        let branch = run_git(temp.path(), &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap();
        assert_eq!(branch, "main");
        assert_eq!(tracked_files(temp.path()).unwrap(), vec!["README.md"]);
    }

    #[test]
    fn failing_command_reports_git_error() {
        let temp = TempDir::new().unwrap();
        let err = run_git(temp.path(), &["rev-parse", "HEAD"]).unwrap_err();
        assert!(matches!(err, Error::Git(_)));
    }
}
