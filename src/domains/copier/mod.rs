//! Bulk filesystem carry-over between working copies. Git only materializes
//! tracked files in a fresh worktree; build caches, IDE state, and installed
//! dependencies have to be copied across explicitly, and removing a worktree
//! from the dashboard needs the same scan-then-act shape so progress can be
//! reported meaningfully.

use crate::utils::paths;
use crate::utils::process;
use anyhow::{anyhow, Context, Result};
use filetime::FileTime;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(120);

/// Cooperative cancellation shared between the UI and a worker thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(anyhow!("operation cancelled"))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Act,
}

#[derive(Debug, Clone)]
pub struct CopyProgress {
    pub phase: Phase,
    pub total_files: u64,
    pub total_bytes: u64,
    pub copied_files: u64,
    pub copied_bytes: u64,
    pub current_path: String,
}

#[derive(Debug, Clone)]
pub struct DeleteProgress {
    pub phase: Phase,
    pub total_files: u64,
    pub total_bytes: u64,
    pub deleted_files: u64,
    pub deleted_bytes: u64,
    pub current_path: String,
}

/// Compiled exclusion pattern. Four classes cover the config surface; the
/// dispatch is explicit rather than a full glob engine.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExcludePattern {
    /// `build` — the root-level entry and everything below it.
    Exact(String),
    /// `dist/**` — everything below the prefix, and the prefix itself.
    Subtree(String),
    /// `*.log` — file-name suffix match anywhere in the tree.
    Extension(String),
    /// `tmp/` — same as Exact, spelled with a trailing slash.
    Dir(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeSet {
    patterns: Vec<ExcludePattern>,
}

impl ExcludeSet {
    pub fn compile(raw: &[String]) -> Self {
        let mut patterns = Vec::with_capacity(raw.len());
        for pattern in raw {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            if let Some(prefix) = pattern.strip_suffix("/**") {
                patterns.push(ExcludePattern::Subtree(prefix.to_string()));
            } else if let Some(ext) = pattern.strip_prefix("*.") {
                patterns.push(ExcludePattern::Extension(format!(".{ext}")));
            } else if let Some(prefix) = pattern.strip_suffix('/') {
                patterns.push(ExcludePattern::Dir(prefix.to_string()));
            } else {
                patterns.push(ExcludePattern::Exact(pattern.to_string()));
            }
        }
        ExcludeSet { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Match a slash-separated path relative to the copy root.
    pub fn matches(&self, rel: &str) -> bool {
        let rel = rel.trim_matches('/');
        if rel.is_empty() {
            return false;
        }
        for pattern in &self.patterns {
            let hit = match pattern {
                ExcludePattern::Exact(p) | ExcludePattern::Subtree(p) | ExcludePattern::Dir(p) => {
                    rel == p || rel.starts_with(&format!("{p}/"))
                }
                ExcludePattern::Extension(suffix) => rel
                    .rsplit('/')
                    .next()
                    .map(|name| name.ends_with(suffix.as_str()))
                    .unwrap_or(false),
            };
            if hit {
                return true;
            }
        }
        false
    }
}

struct Throttled<'a, T> {
    sink: Option<&'a mut dyn FnMut(T)>,
    last: Option<Instant>,
}

impl<'a, T: Clone> Throttled<'a, T> {
    fn new(sink: Option<&'a mut dyn FnMut(T)>) -> Self {
        Throttled { sink, last: None }
    }

    /// Emit at most every ~120 ms; `force` bypasses the throttle for phase
    /// boundaries and completion.
    fn emit(&mut self, event: T, force: bool) {
        let sink = match self.sink.as_mut() {
            Some(sink) => sink,
            None => return,
        };
        let now = Instant::now();
        if !force {
            if let Some(last) = self.last {
                if now.duration_since(last) < PROGRESS_INTERVAL {
                    return;
                }
            }
        }
        self.last = Some(now);
        sink(event);
    }
}

/// Relative paths git reports as untracked (`?`) or ignored (`!`), sorted
/// and de-duplicated, with the metadata directory filtered out.
pub fn collect_copy_candidates(source_root: &Path) -> Result<Vec<String>> {
    let out = process::run_capture_bytes(
        Some(source_root),
        "git",
        &[
            "status",
            "--porcelain=v2",
            "-z",
            "--untracked-files=all",
            "--ignored=matching",
        ],
    )?;

    let mut set = BTreeSet::new();
    for record in out.split(|b| *b == 0) {
        if record.len() < 3 {
            continue;
        }
        let line = String::from_utf8_lossy(record);
        let rest = if let Some(rest) = line.strip_prefix("? ") {
            rest
        } else if let Some(rest) = line.strip_prefix("! ") {
            rest
        } else {
            continue;
        };
        let path = rest.trim().trim_end_matches('/');
        if path.is_empty() || path == ".git" || path.starts_with(".git/") {
            continue;
        }
        set.insert(path.to_string());
    }
    Ok(set.into_iter().collect())
}

fn rel_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|rel| rel.to_string_lossy().into_owned())
        .unwrap_or_else(|_| paths::path_to_string(path))
}

/// Count files and bytes under `path` (which may itself be a file or
/// symlink), skipping excluded entries relative to `source_root`.
fn scan_path(
    source_root: &Path,
    path: &Path,
    excludes: &ExcludeSet,
    cancel: &CancelFlag,
) -> Result<(u64, u64)> {
    let meta = match path.symlink_metadata() {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(err) => return Err(err.into()),
    };

    if !meta.is_dir() {
        return Ok((1, meta.len()));
    }

    let mut files = 0u64;
    let mut bytes = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        cancel.check()?;
        let entry = entry?;
        let rel = rel_display(source_root, entry.path());
        if excludes.matches(&rel) {
            continue;
        }
        let entry_meta = entry.metadata()?;
        if entry_meta.is_dir() {
            continue;
        }
        files += 1;
        bytes += entry_meta.len();
    }
    Ok((files, bytes))
}

/// Totals for a standalone tree, used by the deleter's scan phase.
pub fn estimate_tree(root: &Path) -> Result<(u64, u64)> {
    scan_path(root, root, &ExcludeSet::default(), &CancelFlag::new())
}

#[cfg(unix)]
fn apply_mode(path: &Path, meta: &std::fs::Metadata) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(meta.permissions().mode());
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _meta: &std::fs::Metadata) -> Result<()> {
    Ok(())
}

fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = std::fs::read_link(src)?;
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(dst);
    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, dst)?;
    #[cfg(not(unix))]
    return Err(anyhow!("symlink copy is not supported on this platform"));
    Ok(())
}

fn copy_file(src: &Path, dst: &Path, meta: &std::fs::Metadata) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst)?;
    apply_mode(dst, meta)?;
    filetime::set_file_mtime(dst, FileTime::from_last_modification_time(meta))?;
    Ok(())
}

struct CopyState<'a, 'b> {
    source_root: &'a Path,
    target_root: &'a Path,
    excludes: &'a ExcludeSet,
    cancel: &'a CancelFlag,
    progress: Throttled<'b, CopyProgress>,
    total_files: u64,
    total_bytes: u64,
    copied_files: u64,
    copied_bytes: u64,
}

impl CopyState<'_, '_> {
    fn report(&mut self, current: &str, force: bool) {
        let event = CopyProgress {
            phase: Phase::Act,
            total_files: self.total_files,
            total_bytes: self.total_bytes,
            copied_files: self.copied_files,
            copied_bytes: self.copied_bytes,
            current_path: current.to_string(),
        };
        self.progress.emit(event, force);
    }

    fn copy_one(&mut self, src: &Path, dst: &Path) -> Result<()> {
        self.cancel.check()?;
        let rel = rel_display(self.source_root, src);
        if self.excludes.matches(&rel) {
            return Ok(());
        }
        let meta = match src.symlink_metadata() {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        if meta.file_type().is_symlink() {
            copy_symlink(src, dst).with_context(|| format!("copy {rel}"))?;
            self.copied_files += 1;
            self.report(&rel, false);
            return Ok(());
        }

        if meta.is_dir() {
            std::fs::create_dir_all(dst).with_context(|| format!("copy {rel}"))?;
            apply_mode(dst, &meta)?;
            let entries: Vec<_> = std::fs::read_dir(src)
                .with_context(|| format!("copy {rel}"))?
                .collect::<std::io::Result<_>>()?;
            for entry in entries {
                let child_src = entry.path();
                let child_dst = dst.join(entry.file_name());
                self.copy_one(&child_src, &child_dst)?;
            }
            return Ok(());
        }

        copy_file(src, dst, &meta).with_context(|| format!("copy {rel}"))?;
        self.copied_files += 1;
        self.copied_bytes += meta.len();
        self.report(&rel, false);
        Ok(())
    }
}

/// Carry untracked and ignored files from one working copy to another.
/// SCAN totals everything first so the ACT phase can report meaningful
/// progress; errors abort and leave the partial copy in place for
/// inspection.
pub fn copy_untracked_and_ignored(
    source_root: &Path,
    target_root: &Path,
    excludes: &ExcludeSet,
    progress: Option<&mut dyn FnMut(CopyProgress)>,
    cancel: &CancelFlag,
) -> Result<()> {
    let candidates = collect_copy_candidates(source_root)?;
    let mut sink = Throttled::new(progress);

    sink.emit(
        CopyProgress {
            phase: Phase::Scan,
            total_files: 0,
            total_bytes: 0,
            copied_files: 0,
            copied_bytes: 0,
            current_path: String::new(),
        },
        true,
    );

    let mut total_files = 0u64;
    let mut total_bytes = 0u64;
    for rel in &candidates {
        if excludes.matches(rel) {
            continue;
        }
        let (files, bytes) = scan_path(source_root, &source_root.join(rel), excludes, cancel)?;
        total_files += files;
        total_bytes += bytes;
        sink.emit(
            CopyProgress {
                phase: Phase::Scan,
                total_files,
                total_bytes,
                copied_files: 0,
                copied_bytes: 0,
                current_path: rel.clone(),
            },
            false,
        );
    }

    let mut state = CopyState {
        source_root,
        target_root,
        excludes,
        cancel,
        progress: sink,
        total_files,
        total_bytes,
        copied_files: 0,
        copied_bytes: 0,
    };

    for rel in &candidates {
        let src = source_root.join(rel);
        let dst = state.target_root.join(rel);
        state.copy_one(&src, &dst)?;
    }
    state.report("", true);
    Ok(())
}

/// Remove a worktree directory bottom-up with the same scan/act progress
/// contract as the copier.
pub fn delete_tree(
    root: &Path,
    progress: Option<&mut dyn FnMut(DeleteProgress)>,
    cancel: &CancelFlag,
) -> Result<()> {
    let mut sink = Throttled::new(progress);
    sink.emit(
        DeleteProgress {
            phase: Phase::Scan,
            total_files: 0,
            total_bytes: 0,
            deleted_files: 0,
            deleted_bytes: 0,
            current_path: String::new(),
        },
        true,
    );

    let (total_files, total_bytes) = estimate_tree(root)?;
    sink.emit(
        DeleteProgress {
            phase: Phase::Scan,
            total_files,
            total_bytes,
            deleted_files: 0,
            deleted_bytes: 0,
            current_path: String::new(),
        },
        true,
    );

    let mut deleted_files = 0u64;
    let mut deleted_bytes = 0u64;
    for entry in WalkDir::new(root).follow_links(false).contents_first(true) {
        cancel.check()?;
        let entry = entry?;
        let rel = rel_display(root, entry.path());
        let meta = entry.metadata()?;
        if meta.is_dir() {
            std::fs::remove_dir(entry.path())
                .with_context(|| format!("delete {rel}"))?;
            continue;
        }
        let size = meta.len();
        std::fs::remove_file(entry.path()).with_context(|| format!("delete {rel}"))?;
        deleted_files += 1;
        deleted_bytes += size;
        let done = deleted_files == total_files;
        sink.emit(
            DeleteProgress {
                phase: Phase::Act,
                total_files,
                total_bytes,
                deleted_files,
                deleted_bytes,
                current_path: rel,
            },
            done,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::git::repository::testutil::{git, init_repo};
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn exclude_set() -> ExcludeSet {
        ExcludeSet::compile(&[
            "build".to_string(),
            "dist/**".to_string(),
            "*.log".to_string(),
            "tmp/".to_string(),
        ])
    }

    #[test]
    fn exclusion_classes_dispatch_correctly() {
        let set = exclude_set();
        let excluded = [
            "build",
            "build/output/app",
            "dist/assets/x",
            "tmp/cache",
            "logs/app.log",
        ];
        for rel in excluded {
            assert!(set.matches(rel), "expected exclusion for {rel:?}");
        }
        let kept = ["notes/logs.txt", "src/build/output", "builds/app", "src/build-ing"];
        for rel in kept {
            assert!(!set.matches(rel), "expected {rel:?} to be kept");
        }
    }

    #[test]
    fn estimate_counts_files_and_bytes() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "hello").unwrap();
        std::fs::create_dir_all(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested/b.txt"), "world!").unwrap();

        let (files, bytes) = estimate_tree(tmp.path()).unwrap();
        assert_eq!(files, 2);
        assert!(bytes >= 11, "got {bytes}");
    }

    #[test]
    fn copy_carries_untracked_and_ignored_but_not_excluded() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        std::fs::write(repo.join(".gitignore"), "ignored-dir/\n").unwrap();
        git(&repo, &["add", ".gitignore"]);
        git(&repo, &["commit", "-m", "ignore"]);

        std::fs::write(repo.join("notes.txt"), "untracked\n").unwrap();
        std::fs::create_dir_all(repo.join("ignored-dir")).unwrap();
        std::fs::write(repo.join("ignored-dir/cache.bin"), "blob").unwrap();
        std::fs::create_dir_all(repo.join("build/output")).unwrap();
        std::fs::write(repo.join("build/output/app"), "bin").unwrap();
        std::fs::create_dir_all(repo.join("notes")).unwrap();
        std::fs::write(repo.join("notes/logs.txt"), "keep").unwrap();
        std::fs::write(repo.join("app.log"), "drop").unwrap();

        let target = tmp.path().join("target");
        std::fs::create_dir_all(&target).unwrap();

        let mut events = Vec::new();
        let mut on_progress = |p: CopyProgress| events.push(p);
        copy_untracked_and_ignored(
            &repo,
            &target,
            &exclude_set(),
            Some(&mut on_progress),
            &CancelFlag::new(),
        )
        .unwrap();

        assert!(target.join("notes.txt").is_file());
        assert!(target.join("ignored-dir/cache.bin").is_file());
        assert!(target.join("notes/logs.txt").is_file());
        assert!(!target.join("build").exists());
        assert!(!target.join("app.log").exists());
        assert!(!target.join(".git").exists());

        assert!(events.iter().any(|p| p.phase == Phase::Scan));
        let last_act = events.iter().rev().find(|p| p.phase == Phase::Act).unwrap();
        assert_eq!(last_act.copied_files, last_act.total_files);
    }

    #[test]
    fn copy_preserves_symlink_targets() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        std::os::unix::fs::symlink("README.md", repo.join("link-to-readme")).unwrap();

        let target = tmp.path().join("target");
        std::fs::create_dir_all(&target).unwrap();
        copy_untracked_and_ignored(
            &repo,
            &target,
            &ExcludeSet::default(),
            None,
            &CancelFlag::new(),
        )
        .unwrap();

        let link = target.join("link-to-readme");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            PathBuf::from("README.md")
        );
    }

    #[test]
    fn cancelled_copy_unwinds_cleanly() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        std::fs::write(repo.join("u.txt"), "x").unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = copy_untracked_and_ignored(
            &repo,
            &tmp.path().join("target"),
            &ExcludeSet::default(),
            None,
            &cancel,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn delete_tree_removes_everything_with_progress() {
        let tmp = TempDir::new().unwrap();
        let victim = tmp.path().join("victim");
        std::fs::create_dir_all(victim.join("deep/deeper")).unwrap();
        std::fs::write(victim.join("a"), "1").unwrap();
        std::fs::write(victim.join("deep/b"), "22").unwrap();
        std::fs::write(victim.join("deep/deeper/c"), "333").unwrap();

        let mut events = Vec::new();
        let mut on_progress = |p: DeleteProgress| events.push(p);
        delete_tree(&victim, Some(&mut on_progress), &CancelFlag::new()).unwrap();

        assert!(!victim.exists());
        let last = events.last().unwrap();
        assert_eq!(last.deleted_files, 3);
        assert_eq!(last.total_files, 3);
        assert_eq!(last.total_bytes, 6);
    }
}
