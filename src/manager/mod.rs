pub mod agents;
pub mod doctor;

use crate::config::Config;
use crate::domains::copier::{self, CancelFlag, CopyProgress, DeleteProgress, ExcludeSet};
use crate::domains::git;
use crate::domains::sessions::{coordinator, naming};
use crate::errors::SproutError;
use crate::utils::paths;
use crate::utils::process;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Sentinel states for the tmux/agent columns when the multiplexer binary
/// is not installed.
pub const STATE_NA: &str = "n/a";
pub const STATE_NO: &str = "no";
pub const STATE_YES: &str = "yes";

/// One working copy of the repository, re-derived on every list call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Worktree {
    pub path: PathBuf,
    pub branch: String,
    pub current: bool,
    pub dirty: bool,
    pub tmux_state: String,
    pub agent_state: String,
}

impl Worktree {
    /// Branch name, or the path basename on detached HEAD. Used wherever a
    /// human-facing token for the worktree is needed.
    pub fn branch_or_name(&self) -> String {
        if !self.branch.is_empty() {
            return self.branch.clone();
        }
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewOptions {
    /// Explicit branch name; wins over type+name.
    pub branch: String,
    pub branch_type: String,
    pub name: String,
    /// Base ref for new-branch mode; empty resolves via config.
    pub base_branch: String,
    /// Existing local or remote-tracking branch to check out instead of
    /// creating a new one.
    pub from_branch: String,
    pub launch: bool,
    pub skip_copy_untracked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GoOptions {
    pub target: String,
    pub launch: bool,
    pub attach: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub target: String,
    pub no_attach: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub target: String,
    pub attach: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    pub target: String,
    pub force: bool,
    pub delete_branch: bool,
}

/// The public façade. Owns the frozen configuration and composes the
/// repository gateway, tree copier, and session coordinator; callers (CLI
/// handlers, dashboard) never touch those directly.
#[derive(Debug, Clone)]
pub struct Manager {
    pub cfg: Config,
    excludes: ExcludeSet,
}

impl Manager {
    pub fn new(cfg: Config) -> Self {
        let excludes = ExcludeSet::compile(&cfg.copy_untracked_exclude);
        Manager { cfg, excludes }
    }

    pub fn excludes(&self) -> &ExcludeSet {
        &self.excludes
    }

    pub fn require_repo(&self) -> Result<PathBuf> {
        git::require_repo()
    }

    pub fn repo_name(&self, repo_root: &Path) -> String {
        git::repo_name(repo_root)
    }

    /// Expand the worktree root template for this repository.
    pub fn worktree_root_dir(&self, repo_root: &Path) -> PathBuf {
        let repo_name = self.repo_name(repo_root);
        let expanded = self
            .cfg
            .worktree_root_template
            .replace("{repo}", &repo_name);
        let expanded_path = PathBuf::from(&expanded);
        if expanded_path.is_absolute() {
            paths::clean_path(&expanded_path)
        } else {
            paths::abs_path(&repo_root.join(expanded_path))
        }
    }

    pub fn repo_session_name(&self, repo_root: &Path) -> String {
        naming::session_name_for_repo(&self.cfg.session_prefix, &self.repo_name(repo_root))
    }

    pub fn worktree_session_name(&self, repo_root: &Path, wt: &Worktree) -> String {
        self.worktree_session_name_from(repo_root, &wt.branch, &wt.path)
    }

    pub fn worktree_session_name_from(
        &self,
        repo_root: &Path,
        branch: &str,
        worktree_path: &Path,
    ) -> String {
        naming::worktree_session_name(
            &self.cfg.session_prefix,
            &self.repo_name(repo_root),
            branch,
            worktree_path,
        )
    }

    /// All working copies: current first, then by path. Tmux and agent
    /// state probes are suppressed to "n/a" when tmux is missing.
    pub fn list_worktrees(&self) -> Result<Vec<Worktree>> {
        let repo_root = self.require_repo()?;
        let entries = git::parse_worktree_list(&repo_root)?;
        let current = paths::abs_path(&repo_root);
        let has_tmux = process::command_exists("tmux");

        let mut items: Vec<Worktree> = entries
            .into_iter()
            .map(|entry| {
                let path = paths::abs_path(&entry.path);
                let mut wt = Worktree {
                    current: path == current,
                    dirty: git::worktree_dirty(&path),
                    tmux_state: STATE_NA.to_string(),
                    agent_state: STATE_NA.to_string(),
                    branch: entry.branch,
                    path,
                };
                if has_tmux {
                    wt.tmux_state = STATE_NO.to_string();
                    wt.agent_state = STATE_NO.to_string();
                    let session = self.worktree_session_name(&repo_root, &wt);
                    if coordinator::has_session(&session) {
                        wt.tmux_state = STATE_YES.to_string();
                        let agent_window = naming::agent_window_name(&wt.branch_or_name());
                        if coordinator::window_exists(&session, &agent_window) {
                            wt.agent_state = STATE_YES.to_string();
                        }
                    }
                }
                wt
            })
            .collect();

        items.sort_by(|a, b| {
            b.current
                .cmp(&a.current)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(items)
    }

    /// Resolve a target string against branch name, absolute path, real
    /// path of an existing directory, or path basename.
    pub fn find_worktree(&self, target: &str) -> Result<Worktree> {
        let items = self.list_worktrees()?;
        Self::match_worktree(items, target)
    }

    /// Same resolution, but without dirty/session probes; used by the
    /// high-frequency pane operations.
    pub fn find_worktree_lite(&self, repo_root: &Path, target: &str) -> Result<Worktree> {
        let entries = git::parse_worktree_list(repo_root)?;
        let items = entries
            .into_iter()
            .map(|entry| Worktree {
                path: paths::abs_path(&entry.path),
                branch: entry.branch,
                current: false,
                dirty: false,
                tmux_state: STATE_NA.to_string(),
                agent_state: STATE_NA.to_string(),
            })
            .collect();
        Self::match_worktree(items, target)
    }

    fn match_worktree(items: Vec<Worktree>, target: &str) -> Result<Worktree> {
        let target_path = Path::new(target);
        let target_abs = if target_path.is_dir() {
            Some(paths::abs_path(target_path))
        } else {
            None
        };
        let target_real = target_path.canonicalize().ok();

        for item in items {
            let matches_abs = target_abs.as_deref() == Some(item.path.as_path())
                || target_real.as_deref() == Some(item.path.as_path());
            let basename = item
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if target == item.branch
                || Path::new(target) == item.path
                || matches_abs
                || target == basename
            {
                return Ok(item);
            }
        }
        Err(anyhow::Error::new(SproutError::WorktreeNotFound {
            target: target.to_string(),
        }))
    }

    pub fn branch_checked_out_anywhere(&self, branch: &str) -> bool {
        let repo_root = match self.require_repo() {
            Ok(root) => root,
            Err(_) => return false,
        };
        match git::parse_worktree_list(&repo_root) {
            Ok(entries) => entries.iter().any(|entry| entry.branch == branch),
            Err(_) => false,
        }
    }

    /// Branches available for a new worktree: everything not already
    /// checked out somewhere.
    pub fn list_branches(&self) -> Result<Vec<git::BranchInfo>> {
        let repo_root = self.require_repo()?;
        let mut in_use = HashSet::new();
        if let Ok(entries) = git::parse_worktree_list(&repo_root) {
            for entry in entries {
                if !entry.branch.is_empty() {
                    in_use.insert(entry.branch);
                }
            }
        }
        Ok(git::list_branches(&repo_root, &in_use))
    }

    /// Create a working copy. New-branch mode synthesizes or takes an
    /// explicit branch and requires it to be fresh; existing-branch mode is
    /// idempotent and returns the already-checked-out path when one exists.
    pub fn new_worktree(
        &self,
        opts: &NewOptions,
        progress: Option<&mut dyn FnMut(CopyProgress)>,
        cancel: &CancelFlag,
    ) -> Result<(String, PathBuf)> {
        let repo_root = self.require_repo()?;

        let is_existing = !opts.from_branch.is_empty();
        let mut branch = opts.branch.trim().to_string();
        if is_existing {
            branch = opts.from_branch.clone();
        }
        if branch.is_empty() {
            branch = git::make_branch_name(&opts.branch_type, &opts.name)?;
        }
        log::debug!(
            "new worktree repo={} branch={branch} launch={} existing={is_existing}",
            repo_root.display(),
            opts.launch
        );

        if is_existing {
            let entries = git::parse_worktree_list(&repo_root)?;
            if let Some(existing) = entries.iter().find(|entry| entry.branch == branch) {
                return Ok((branch, paths::abs_path(&existing.path)));
            }
        }

        let worktree_root = self.worktree_root_dir(&repo_root);
        let worktree_path = paths::abs_path(&worktree_root.join(&branch));

        if is_existing {
            git::create_worktree_from_existing(&repo_root, &branch, &worktree_path)?;
        } else {
            let base =
                git::resolve_base_branch(&repo_root, &opts.base_branch, &self.cfg.base_branch)?;
            git::create_worktree_with_branch(&repo_root, &branch, &worktree_path, &base)?;
        }

        if !opts.skip_copy_untracked {
            copier::copy_untracked_and_ignored(
                &repo_root,
                &worktree_path,
                &self.excludes,
                progress,
                cancel,
            )?;
        }

        if opts.launch {
            self.launch_or_focus(&repo_root, &branch, &worktree_path, true)?;
        }

        Ok((branch, worktree_path))
    }

    pub fn path(&self, target: &str) -> Result<PathBuf> {
        Ok(self.find_worktree(target)?.path)
    }

    /// Resolve a target and optionally make its session live and focused.
    /// Returns the worktree path for the shell hook's cd marker.
    pub fn go(&self, opts: &GoOptions) -> Result<PathBuf> {
        let repo_root = self.require_repo()?;
        let wt = self.find_worktree(&opts.target)?;
        let branch = wt.branch_or_name();

        if opts.launch && process::command_exists("tmux") {
            let attach_outside = !coordinator::inside_tmux() && opts.attach;
            self.launch_or_focus(&repo_root, &branch, &wt.path, attach_outside)?;
        }
        Ok(wt.path)
    }

    pub fn launch(&self, opts: &LaunchOptions) -> Result<PathBuf> {
        let repo_root = self.require_repo()?;
        let wt = self.find_worktree(&opts.target)?;
        if !process::command_exists("tmux") {
            return Err(anyhow::Error::new(SproutError::tmux_missing("launch/go")));
        }

        let attach = !opts.no_attach && !coordinator::inside_tmux();
        let branch = wt.branch_or_name();

        let session = self.worktree_session_name_from(&repo_root, &branch, &wt.path);
        let (session, window) = coordinator::ensure_worktree_session(
            &session,
            &wt.path,
            &branch,
            &self.repo_name(&repo_root),
            &self.agent_command(),
            &self.cfg,
        )?;
        if attach {
            coordinator::focus_window(&session, &window, true)?;
        }
        Ok(wt.path)
    }

    /// Kill the worktree's session, reporting whether one was alive.
    pub fn detach(&self, target: &str) -> Result<(PathBuf, bool)> {
        let repo_root = self.require_repo()?;
        let wt = self.find_worktree(target)?;
        if !process::command_exists("tmux") {
            return Err(anyhow::Error::new(SproutError::tmux_missing("detach")));
        }

        let session = self.worktree_session_name(&repo_root, &wt);
        if !coordinator::has_session(&session) {
            return Ok((wt.path, false));
        }
        coordinator::kill_session(&session)?;
        Ok((wt.path, true))
    }

    /// Remove a working copy. A dirty tree is refused without force. The
    /// session dies first so it cannot hold file handles; the dashboard
    /// passes a delete-progress sink, which routes the tree removal through
    /// the scan/act deleter before pruning the metadata.
    pub fn remove(
        &self,
        opts: &RemoveOptions,
        delete_progress: Option<&mut dyn FnMut(DeleteProgress)>,
        cancel: &CancelFlag,
    ) -> Result<(PathBuf, Vec<String>)> {
        let repo_root = self.require_repo()?;
        let wt = self.find_worktree(&opts.target)?;

        if !opts.force && git::worktree_dirty(&wt.path) {
            return Err(anyhow::Error::new(SproutError::DirtyWorktree {
                path: paths::path_to_string(&wt.path),
            }));
        }

        let mut warnings = Vec::new();
        let mut session = String::new();
        if process::command_exists("tmux") {
            session = self.worktree_session_name(&repo_root, &wt);
            if coordinator::has_session(&session) {
                if let Err(err) = coordinator::kill_session(&session) {
                    warnings.push(format!(
                        "unable to stop tmux session {session} before removal: {err}"
                    ));
                }
            }
        }

        if let Some(sink) = delete_progress {
            copier::delete_tree(&wt.path, Some(sink), cancel)?;
            git::prune_worktrees(&repo_root);
        } else if let Err(err) = git::run_worktree_remove(&repo_root, &wt.path, opts.force) {
            if git::should_retry_worktree_remove(&err) {
                git::prune_worktrees(&repo_root);
                if !session.is_empty() && coordinator::has_session(&session) {
                    let _ = coordinator::kill_session(&session);
                }
                git::run_worktree_remove(&repo_root, &wt.path, opts.force)?;
                warnings.push("worktree removal required a retry after cleanup".to_string());
            } else {
                return Err(err);
            }
        }

        if opts.delete_branch && !wt.branch.is_empty() {
            if self.branch_checked_out_anywhere(&wt.branch) {
                warnings.push(format!(
                    "branch still checked out in another worktree, not deleting: {}",
                    wt.branch
                ));
            } else {
                git::delete_branch(&repo_root, &wt.branch, opts.force)?;
            }
        }

        Ok((wt.path, warnings))
    }

    /// Ensure the worktree's session exists and focus it, attaching from
    /// outside tmux when requested.
    pub fn launch_or_focus(
        &self,
        repo_root: &Path,
        branch: &str,
        worktree_path: &Path,
        attach_outside: bool,
    ) -> Result<()> {
        if !process::command_exists("tmux") {
            return Err(anyhow::Error::new(SproutError::tmux_missing("launch/go")));
        }
        let session = self.worktree_session_name_from(repo_root, branch, worktree_path);
        let (session, window) = coordinator::ensure_worktree_session(
            &session,
            worktree_path,
            branch,
            &self.repo_name(repo_root),
            &self.agent_command(),
            &self.cfg,
        )?;
        coordinator::focus_window(&session, &window, attach_outside)
    }

    pub fn worktree_diff(&self, path: &Path, width: usize) -> Result<String> {
        git::worktree_diff(path, width)
    }

    pub fn worktree_diff_files(&self, path: &Path) -> Result<Vec<git::DiffFile>> {
        git::worktree_diff_files(path)
    }

    pub fn worktree_diff_for_file(
        &self,
        path: &Path,
        file: &git::DiffFile,
        width: usize,
    ) -> Result<String> {
        git::worktree_diff_for_file(path, file, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::repository::testutil::{git as run_git, init_repo};
    use once_cell::sync::Lazy;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Manager operations resolve the repository from the process cwd, so
    // tests that chdir must not interleave.
    static CWD_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    struct CwdGuard {
        original: PathBuf,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    impl CwdGuard {
        fn enter(dir: &Path) -> Self {
            let lock = CWD_LOCK.lock().unwrap_or_else(|p| p.into_inner());
            let original = std::env::current_dir().unwrap();
            std::env::set_current_dir(dir).unwrap();
            CwdGuard {
                original,
                _lock: lock,
            }
        }
    }

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.original);
        }
    }

    fn manager() -> Manager {
        let mut cfg = Config::default();
        cfg.base_branch = "main".to_string();
        Manager::new(cfg)
    }

    #[test]
    fn worktree_root_dir_expands_template() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        let mgr = manager();
        let root = mgr.worktree_root_dir(&repo);
        assert_eq!(root, paths::abs_path(&tmp.path().join("repo.worktrees")));

        let mut cfg = Config::default();
        cfg.worktree_root_template = "/abs/{repo}-wt".to_string();
        let mgr = Manager::new(cfg);
        assert_eq!(mgr.worktree_root_dir(&repo), PathBuf::from("/abs/repo-wt"));
    }

    #[test]
    fn new_worktree_creates_branch_and_copies_untracked() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        std::fs::write(repo.join("notes.txt"), "untracked notes\n").unwrap();
        let _cwd = CwdGuard::enter(&repo);
        let mgr = manager();

        let opts = NewOptions {
            branch_type: "feat".to_string(),
            name: "my feature".to_string(),
            ..NewOptions::default()
        };
        let (branch, path) = mgr
            .new_worktree(&opts, None, &CancelFlag::new())
            .unwrap();

        assert_eq!(branch, "feat/my-feature");
        assert_eq!(
            path,
            paths::abs_path(&tmp.path().join("repo.worktrees/feat/my-feature"))
        );
        assert!(path.join("README.md").is_file());
        assert!(path.join("notes.txt").is_file());

        let items = mgr.list_worktrees().unwrap();
        assert!(items.iter().any(|w| w.branch == "feat/my-feature"));
    }

    #[test]
    fn new_worktree_from_existing_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        run_git(&repo, &["branch", "feature/existing"]);
        let existing = tmp.path().join("existing-worktree");
        run_git(
            &repo,
            &[
                "worktree",
                "add",
                existing.to_str().unwrap(),
                "feature/existing",
            ],
        );
        let _cwd = CwdGuard::enter(&repo);
        let mgr = manager();

        let opts = NewOptions {
            from_branch: "feature/existing".to_string(),
            skip_copy_untracked: true,
            ..NewOptions::default()
        };
        let (branch, first) = mgr.new_worktree(&opts, None, &CancelFlag::new()).unwrap();
        assert_eq!(branch, "feature/existing");
        assert_eq!(first, paths::abs_path(&existing));

        let (_, second) = mgr.new_worktree(&opts, None, &CancelFlag::new()).unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn find_worktree_resolves_branch_path_and_basename() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        let side = tmp.path().join("side-wt");
        run_git(
            &repo,
            &["worktree", "add", "-b", "feat/side", side.to_str().unwrap()],
        );
        let _cwd = CwdGuard::enter(&repo);
        let mgr = manager();

        for target in ["feat/side", side.to_str().unwrap(), "side-wt"] {
            let wt = mgr.find_worktree(target).unwrap();
            assert_eq!(wt.branch, "feat/side", "target {target:?}");
        }

        let err = mgr.find_worktree("missing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SproutError>(),
            Some(SproutError::WorktreeNotFound { .. })
        ));
    }

    #[test]
    fn list_marks_current_and_dirty() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        let side = tmp.path().join("clean-wt");
        run_git(
            &repo,
            &["worktree", "add", "-b", "feat/clean", side.to_str().unwrap()],
        );
        std::fs::write(repo.join("u.txt"), "dirty\n").unwrap();
        let _cwd = CwdGuard::enter(&repo);
        let mgr = manager();

        let items = mgr.list_worktrees().unwrap();
        assert_eq!(items.len(), 2);
        // Current worktree sorts first.
        assert!(items[0].current);
        assert_eq!(items[0].branch, "main");
        assert!(items[0].dirty);
        assert!(!items[1].current);
        assert!(!items[1].dirty);
    }

    #[test]
    fn remove_refuses_dirty_without_force() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        let side = tmp.path().join("dirty-wt");
        run_git(
            &repo,
            &["worktree", "add", "-b", "feat/dirty", side.to_str().unwrap()],
        );
        std::fs::write(side.join("junk.txt"), "junk").unwrap();
        let _cwd = CwdGuard::enter(&repo);
        let mgr = manager();

        let opts = RemoveOptions {
            target: "feat/dirty".to_string(),
            ..RemoveOptions::default()
        };
        let err = mgr.remove(&opts, None, &CancelFlag::new()).unwrap_err();
        assert!(err.to_string().contains("uncommitted changes"));
        assert!(side.exists());

        let opts = RemoveOptions {
            target: "feat/dirty".to_string(),
            force: true,
            ..RemoveOptions::default()
        };
        let (path, _warnings) = mgr.remove(&opts, None, &CancelFlag::new()).unwrap();
        assert_eq!(path, paths::abs_path(&side));
        assert!(!side.exists());
    }

    #[test]
    fn remove_can_delete_the_branch() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        let side = tmp.path().join("del-wt");
        run_git(
            &repo,
            &["worktree", "add", "-b", "feat/del", side.to_str().unwrap()],
        );
        let _cwd = CwdGuard::enter(&repo);
        let mgr = manager();

        let opts = RemoveOptions {
            target: "feat/del".to_string(),
            delete_branch: true,
            ..RemoveOptions::default()
        };
        mgr.remove(&opts, None, &CancelFlag::new()).unwrap();
        assert!(!git::branch_exists(&repo, "feat/del"));
    }

    #[test]
    fn json_fields_use_pascal_case() {
        let wt = Worktree {
            path: PathBuf::from("/tmp/x"),
            branch: "feat/x".to_string(),
            current: true,
            dirty: false,
            tmux_state: STATE_NA.to_string(),
            agent_state: STATE_NA.to_string(),
        };
        let json = serde_json::to_value(&wt).unwrap();
        assert_eq!(json["Path"], "/tmp/x");
        assert_eq!(json["Branch"], "feat/x");
        assert_eq!(json["Current"], true);
        assert_eq!(json["Dirty"], false);
        assert_eq!(json["TmuxState"], "n/a");
        assert_eq!(json["AgentState"], "n/a");
    }
}
