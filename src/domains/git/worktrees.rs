use super::branches::branch_exists;
use crate::errors::SproutError;
use crate::utils::paths;
use crate::utils::process;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 45;
const MIN_TIMEOUT_SECONDS: u64 = 5;
const MAX_TIMEOUT_SECONDS: u64 = 600;

/// One record from `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Empty on detached HEAD.
    pub branch: String,
}

pub fn parse_worktree_list(repo_root: &Path) -> Result<Vec<WorktreeEntry>> {
    let out = process::run_capture(
        Some(repo_root),
        "git",
        &["worktree", "list", "--porcelain"],
    )?;

    let mut entries = Vec::new();
    let mut cur_path = String::new();
    let mut cur_branch = String::new();

    let flush = |path: &mut String, branch: &mut String, entries: &mut Vec<WorktreeEntry>| {
        if !path.is_empty() {
            entries.push(WorktreeEntry {
                path: PathBuf::from(std::mem::take(path)),
                branch: std::mem::take(branch),
            });
        } else {
            path.clear();
            branch.clear();
        }
    };

    for line in out.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            flush(&mut cur_path, &mut cur_branch, &mut entries);
            continue;
        }
        if let Some(rest) = line.strip_prefix("worktree ") {
            cur_path = rest.to_string();
        } else if let Some(rest) = line.strip_prefix("branch refs/heads/") {
            cur_branch = rest.to_string();
        } else if let Some(rest) = line.strip_prefix("branch ") {
            cur_branch = rest.to_string();
        }
    }
    flush(&mut cur_path, &mut cur_branch, &mut entries);
    Ok(entries)
}

/// Timeout for `git worktree add`/`remove`, clamped to [5, 600] seconds
/// and overridable via `SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS`.
pub fn worktree_command_timeout() -> Duration {
    let raw = std::env::var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Duration::from_secs(DEFAULT_TIMEOUT_SECONDS);
    }
    let seconds: u64 = match raw.parse() {
        Ok(value) => value,
        Err(_) => DEFAULT_TIMEOUT_SECONDS,
    };
    Duration::from_secs(seconds.clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS))
}

/// Worktree metadata can go stale when a path was removed behind git's
/// back; these failure texts are worth one prune-and-retry.
pub fn should_retry_worktree_add(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("timed out")
        || msg.contains("already checked out")
        || msg.contains("already exists")
        || msg.contains("already registered")
        || msg.contains("unable to create")
        || msg.contains("cannot lock")
}

pub fn should_retry_worktree_remove(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("timed out")
        || msg.contains("is locked")
        || msg.contains("cannot remove")
        || msg.contains("cannot lock")
}

pub fn prune_worktrees(repo_root: &Path) {
    let _ = process::run_quiet(Some(repo_root), "git", &["worktree", "prune"]);
}

fn run_worktree_add(repo_root: &Path, args: &[&str]) -> Result<()> {
    let mut full_args = vec!["worktree", "add"];
    full_args.extend_from_slice(args);
    let timeout = worktree_command_timeout();
    match process::run_quiet_timeout(Some(repo_root), timeout, "git", &full_args) {
        Ok(()) => Ok(()),
        Err(err) => {
            if !should_retry_worktree_add(&err) {
                return Err(err);
            }
            log::warn!("worktree add failed, pruning and retrying once: {err}");
            prune_worktrees(repo_root);
            process::run_quiet_timeout(Some(repo_root), timeout, "git", &full_args)
        }
    }
}

pub fn run_worktree_remove(repo_root: &Path, worktree_path: &Path, force: bool) -> Result<()> {
    let path = paths::path_to_string(worktree_path);
    let mut args = vec!["worktree", "remove"];
    if force {
        args.push("--force");
    }
    args.push(&path);
    let timeout = worktree_command_timeout();
    process::run_quiet_timeout(Some(repo_root), timeout, "git", &args)
}

/// Add a worktree that creates branch `branch` from `base`. Both the
/// branch-exists and path-exists preconditions are checked before git is
/// invoked.
pub fn create_worktree_with_branch(
    repo_root: &Path,
    branch: &str,
    worktree_path: &Path,
    base: &str,
) -> Result<()> {
    if branch_exists(repo_root, branch) {
        return Err(anyhow::Error::new(SproutError::BranchExists {
            branch: branch.to_string(),
        }));
    }
    match worktree_path.symlink_metadata() {
        Ok(_) => {
            return Err(anyhow::Error::new(SproutError::TargetPathExists {
                path: paths::path_to_string(worktree_path),
            }));
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let path = paths::path_to_string(worktree_path);
    run_worktree_add(repo_root, &["-b", branch, &path, base])
}

/// Add a worktree for an existing local or remote-tracking branch. Remote
/// branches resolve through git's --guess-remote default.
pub fn create_worktree_from_existing(
    repo_root: &Path,
    branch: &str,
    worktree_path: &Path,
) -> Result<()> {
    match worktree_path.symlink_metadata() {
        Ok(_) => {
            return Err(anyhow::Error::new(SproutError::TargetPathExists {
                path: paths::path_to_string(worktree_path),
            }));
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let path = paths::path_to_string(worktree_path);
    run_worktree_add(repo_root, &[&path, branch])
}

#[cfg(test)]
mod tests {
    use super::super::repository::testutil::{git, init_repo};
    use super::*;
    use crate::errors::SproutError;
    use tempfile::TempDir;

    struct TimeoutEnvGuard {
        original: Option<String>,
    }

    impl TimeoutEnvGuard {
        fn set(value: &str) -> Self {
            let original = std::env::var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS").ok();
            std::env::set_var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS", value);
            TimeoutEnvGuard { original }
        }
    }

    impl Drop for TimeoutEnvGuard {
        fn drop(&mut self) {
            match self.original.take() {
                Some(value) => {
                    std::env::set_var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS", value)
                }
                None => std::env::remove_var("SPROUT_GIT_WORKTREE_TIMEOUT_SECONDS"),
            }
        }
    }

    #[test]
    fn timeout_clamps_to_documented_range() {
        {
            let _guard = TimeoutEnvGuard::set("2");
            assert_eq!(worktree_command_timeout(), Duration::from_secs(5));
        }
        {
            let _guard = TimeoutEnvGuard::set("120");
            assert_eq!(worktree_command_timeout(), Duration::from_secs(120));
        }
        {
            let _guard = TimeoutEnvGuard::set("10000");
            assert_eq!(worktree_command_timeout(), Duration::from_secs(600));
        }
        {
            let _guard = TimeoutEnvGuard::set("not-a-number");
            assert_eq!(worktree_command_timeout(), Duration::from_secs(45));
        }
    }

    #[test]
    fn retry_predicates_match_documented_substrings() {
        let add_retry = [
            "git worktree add timed out after 45s",
            "fatal: branch is already checked out at '/tmp/wt'",
            "fatal: '/tmp/wt' already exists",
            "fatal: '/tmp/wt' is already registered",
            "fatal: unable to create '/tmp/wt'",
            "fatal: cannot lock ref",
        ];
        for msg in add_retry {
            assert!(
                should_retry_worktree_add(&anyhow::anyhow!(msg.to_string())),
                "expected retry for {msg:?}"
            );
        }
        assert!(!should_retry_worktree_add(&anyhow::anyhow!(
            "fatal: invalid reference"
        )));

        let remove_retry = [
            "git worktree remove timed out after 45s",
            "fatal: '/tmp/wt' is locked",
            "fatal: cannot remove worktree",
            "fatal: cannot lock ref",
        ];
        for msg in remove_retry {
            assert!(
                should_retry_worktree_remove(&anyhow::anyhow!(msg.to_string())),
                "expected retry for {msg:?}"
            );
        }
        assert!(!should_retry_worktree_remove(&anyhow::anyhow!(
            "fatal: not a working tree"
        )));
    }

    #[test]
    fn parse_worktree_list_reads_porcelain_records() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        let side = tmp.path().join("side-wt");
        git(
            &repo,
            &["worktree", "add", "-b", "feat/side", side.to_str().unwrap()],
        );

        let entries = parse_worktree_list(&repo).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].branch, "main");
        assert_eq!(entries[1].branch, "feat/side");
        assert!(entries[1].path.ends_with("side-wt"));
    }

    #[test]
    fn create_with_branch_checks_preconditions_first() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        // Existing branch is rejected before git worktree add runs.
        git(&repo, &["branch", "feat/taken"]);
        let err = create_worktree_with_branch(
            &repo,
            "feat/taken",
            &tmp.path().join("wt1"),
            "main",
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SproutError>(),
            Some(SproutError::BranchExists { .. })
        ));

        // Existing target path likewise.
        let occupied = tmp.path().join("occupied");
        std::fs::create_dir_all(&occupied).unwrap();
        let err =
            create_worktree_with_branch(&repo, "feat/fresh", &occupied, "main").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SproutError>(),
            Some(SproutError::TargetPathExists { .. })
        ));

        // Happy path creates the branch and the directory.
        let target = tmp.path().join("nested").join("wt2");
        create_worktree_with_branch(&repo, "feat/fresh", &target, "main").unwrap();
        assert!(target.join("README.md").is_file());
        assert!(branch_exists(&repo, "feat/fresh"));
    }

    #[test]
    fn create_from_existing_checks_out_the_branch() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        git(&repo, &["branch", "feature/existing"]);

        let target = tmp.path().join("existing-wt");
        create_worktree_from_existing(&repo, "feature/existing", &target).unwrap();
        let entries = parse_worktree_list(&repo).unwrap();
        assert!(entries.iter().any(|e| e.branch == "feature/existing"));
    }

    #[test]
    fn remove_deletes_the_worktree() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        let target = tmp.path().join("short-lived");
        create_worktree_with_branch(&repo, "feat/short", &target, "main").unwrap();

        run_worktree_remove(&repo, &target, false).unwrap();
        assert!(!target.exists());
        let entries = parse_worktree_list(&repo).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
