use super::repository::current_branch;
use crate::errors::SproutError;
use crate::utils::process;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

static TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(feat|fix|chore|docs|refactor|test)$").unwrap());
static SLUG_BAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9/-]+").unwrap());
static SLASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/+").unwrap());
static DASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

/// Normalize a human title into a branch-path slug: lowercase, `[a-z0-9/-]`
/// only, no run of dashes or slashes, trimmed at both ends.
pub fn slugify(input: &str) -> Result<String> {
    let slug = input.to_lowercase().replace(['_', ' '], "-");
    let slug = SLUG_BAD_RE.replace_all(&slug, "-");
    let slug = SLASH_RE.replace_all(&slug, "/");
    let slug = DASH_RE.replace_all(&slug, "-");
    let slug = slug.trim_matches(|c| c == '-' || c == '/');
    if slug.is_empty() {
        return Err(anyhow::Error::new(SproutError::EmptySlug));
    }
    Ok(slug.to_string())
}

pub fn make_branch_name(branch_type: &str, name: &str) -> Result<String> {
    if !TYPE_RE.is_match(branch_type) {
        return Err(anyhow::Error::new(SproutError::InvalidBranchType {
            given: branch_type.to_string(),
        }));
    }
    let slug = slugify(name)?;
    Ok(format!("{branch_type}/{slug}"))
}

pub fn branch_exists(repo_root: &Path, branch: &str) -> bool {
    process::run_capture(
        Some(repo_root),
        "git",
        &[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ],
    )
    .is_ok()
}

/// Pick the base branch for a new worktree: an explicit request must
/// exist, otherwise the configured default when present, otherwise the
/// current branch.
pub fn resolve_base_branch(
    repo_root: &Path,
    requested: &str,
    configured: &str,
) -> Result<String> {
    if !requested.is_empty() {
        if !branch_exists(repo_root, requested) {
            return Err(anyhow::Error::new(SproutError::BaseBranchMissing {
                branch: requested.to_string(),
            }));
        }
        return Ok(requested.to_string());
    }

    if branch_exists(repo_root, configured) {
        return Ok(configured.to_string());
    }

    let current = current_branch(repo_root);
    if current.is_empty() {
        return Err(anyhow::anyhow!(
            "unable to infer base branch (detached HEAD and '{configured}' missing)"
        ));
    }
    Ok(current)
}

/// A branch available for creating a new worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    /// Only available as a remote-tracking ref.
    pub remote: bool,
}

/// All local branches plus remote-tracking branches (remote prefix
/// stripped) that are not checked out in any worktree, sorted by name.
pub fn list_branches(repo_root: &Path, in_use: &HashSet<String>) -> Vec<BranchInfo> {
    let mut local_set = HashSet::new();
    let mut result = Vec::new();

    let local_out = process::run_capture(
        Some(repo_root),
        "git",
        &["branch", "--format=%(refname:short)"],
    )
    .unwrap_or_default();
    for name in local_out.lines() {
        let name = name.trim();
        if name.is_empty() || in_use.contains(name) {
            continue;
        }
        local_set.insert(name.to_string());
        result.push(BranchInfo {
            name: name.to_string(),
            remote: false,
        });
    }

    let remote_out = process::run_capture(
        Some(repo_root),
        "git",
        &["branch", "-r", "--format=%(refname:short)"],
    )
    .unwrap_or_default();
    for reference in remote_out.lines() {
        let reference = reference.trim();
        if reference.is_empty() {
            continue;
        }
        let name = match reference.split_once('/') {
            Some((_, rest)) => rest,
            None => reference,
        };
        if name.contains("HEAD") || local_set.contains(name) || in_use.contains(name) {
            continue;
        }
        result.push(BranchInfo {
            name: name.to_string(),
            remote: true,
        });
    }

    result.sort_by(|a, b| a.name.cmp(&b.name));
    result
}

pub fn delete_branch(repo_root: &Path, branch: &str, force: bool) -> Result<()> {
    let flag = if force { "-D" } else { "-d" };
    process::run_quiet(Some(repo_root), "git", &["branch", flag, branch])
}

#[cfg(test)]
mod tests {
    use super::super::repository::testutil::{git, init_repo};
    use super::*;
    use crate::errors::SproutError;
    use tempfile::TempDir;

    #[test]
    fn slugify_normalizes() {
        assert_eq!(slugify("Checkout Redesign_v2").unwrap(), "checkout-redesign-v2");
        assert_eq!(slugify("api//v2  cleanup").unwrap(), "api/v2-cleanup");
        assert_eq!(slugify("--weird--/input--").unwrap(), "weird");
        assert!(slugify("!!!").is_err());
    }

    #[test]
    fn slugify_is_idempotent_and_closed() {
        let inputs = [
            "Checkout Redesign_v2",
            "UPPER case / With Slash",
            "a_b c-d/e",
            "trailing-/",
            "émoji ☃ name",
        ];
        for input in inputs {
            let once = match slugify(input) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let twice = slugify(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {input:?}");
            assert!(!once.is_empty());
            assert!(once.chars().all(|c| c.is_ascii_lowercase()
                || c.is_ascii_digit()
                || c == '-'
                || c == '/'));
            assert!(!once.contains("--"));
            assert!(!once.contains("//"));
            assert!(!once.starts_with(['-', '/']));
            assert!(!once.ends_with(['-', '/']));
        }
    }

    #[test]
    fn make_branch_name_validates_type() {
        assert_eq!(make_branch_name("feat", "my feature").unwrap(), "feat/my-feature");
        let err = make_branch_name("unknown", "x").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SproutError>(),
            Some(SproutError::InvalidBranchType { .. })
        ));
    }

    #[test]
    fn branch_existence_and_base_resolution() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());

        assert!(branch_exists(&repo, "main"));
        assert!(!branch_exists(&repo, "nope"));

        assert_eq!(resolve_base_branch(&repo, "", "main").unwrap(), "main");
        // Configured default missing falls back to the current branch.
        assert_eq!(resolve_base_branch(&repo, "", "trunk").unwrap(), "main");
        let err = resolve_base_branch(&repo, "ghost", "main").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SproutError>(),
            Some(SproutError::BaseBranchMissing { .. })
        ));
    }

    #[test]
    fn list_branches_skips_in_use_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let repo = init_repo(tmp.path());
        git(&repo, &["branch", "zeta"]);
        git(&repo, &["branch", "alpha"]);

        let mut in_use = std::collections::HashSet::new();
        in_use.insert("main".to_string());
        let branches = list_branches(&repo, &in_use);
        let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(branches.iter().all(|b| !b.remote));
    }
}
