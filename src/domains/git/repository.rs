use crate::errors::SproutError;
use crate::utils::paths;
use crate::utils::process;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Resolve the repository root of the current working directory, or the
/// "not inside a repository" sentinel.
pub fn require_repo() -> Result<PathBuf> {
    match process::run_capture(None, "git", &["rev-parse", "--show-toplevel"]) {
        Ok(out) => Ok(PathBuf::from(out.trim())),
        Err(_) => Err(anyhow::Error::new(SproutError::NotGitRepo)),
    }
}

/// Canonical repository name. The common git dir is shared by every
/// worktree, so naming off its parent keeps session names identical no
/// matter which working copy we are invoked from.
pub fn repo_name(repo_root: &Path) -> String {
    if let Ok(out) = process::run_capture(
        Some(repo_root),
        "git",
        &["rev-parse", "--path-format=absolute", "--git-common-dir"],
    ) {
        let common_dir = PathBuf::from(out.trim());
        if let Some(parent) = common_dir.parent() {
            if let Some(name) = parent.file_name() {
                return name.to_string_lossy().into_owned();
            }
        }
    }
    repo_root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| paths::path_to_string(repo_root))
}

/// Short symbolic name of HEAD; empty on detached HEAD.
pub fn current_branch(repo_root: &Path) -> String {
    match process::run_capture(
        Some(repo_root),
        "git",
        &["symbolic-ref", "--quiet", "--short", "HEAD"],
    ) {
        Ok(out) => out.trim().to_string(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
pub mod testutil {
    use std::path::{Path, PathBuf};
    use std::process::Command;

    pub fn git(dir: &Path, args: &[&str]) {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("failed to spawn git");
        assert!(
            out.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
    }

    /// Initialize a repo with one commit on `main` and return its path.
    pub fn init_repo(dir: &Path) -> PathBuf {
        let repo = dir.join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        git(&repo, &["init", "-b", "main"]);
        git(&repo, &["config", "user.email", "test@example.com"]);
        git(&repo, &["config", "user.name", "Test User"]);
        std::fs::write(repo.join("README.md"), "hello\n").unwrap();
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "-m", "init"]);
        repo
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{git, init_repo};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn repo_name_is_stable_across_worktrees() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        assert_eq!(repo_name(&repo), "repo");

        let wt = tmp.path().join("side");
        git(&repo, &["worktree", "add", "-b", "side", wt.to_str().unwrap()]);
        assert_eq!(repo_name(&wt), "repo");
    }

    #[test]
    fn current_branch_reports_head() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        assert_eq!(current_branch(&repo), "main");

        git(&repo, &["checkout", "--detach"]);
        assert_eq!(current_branch(&repo), "");
    }
}
