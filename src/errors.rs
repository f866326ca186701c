use std::fmt;

/// Domain error kinds the CLI and dashboard distinguish. Subprocess
/// failures stay as enriched `anyhow` errors from the process runner; only
/// conditions a caller can act on get a variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SproutError {
    NotGitRepo,
    WorktreeNotFound {
        target: String,
    },
    InvalidBranchType {
        given: String,
    },
    EmptySlug,
    BaseBranchMissing {
        branch: String,
    },
    BranchExists {
        branch: String,
    },
    TargetPathExists {
        path: String,
    },
    DirtyWorktree {
        path: String,
    },
    BranchInUse {
        branch: String,
    },
    TmuxMissing {
        workflow: String,
    },
    UnsupportedShell {
        shell: String,
    },
    ConfigParse {
        file: String,
        line: usize,
        message: String,
    },
}

impl SproutError {
    pub fn tmux_missing(workflow: &str) -> Self {
        SproutError::TmuxMissing {
            workflow: workflow.to_string(),
        }
    }

    pub fn config_parse(file: impl ToString, line: usize, message: impl ToString) -> Self {
        SproutError::ConfigParse {
            file: file.to_string(),
            line,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for SproutError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotGitRepo => {
                write!(f, "run this command inside a git worktree")
            }
            Self::WorktreeNotFound { target } => {
                write!(f, "worktree not found for target: {target}")
            }
            Self::InvalidBranchType { given } => {
                write!(
                    f,
                    "invalid type '{given}' (expected: feat|fix|chore|docs|refactor|test)"
                )
            }
            Self::EmptySlug => {
                write!(f, "feature name resolves to empty slug")
            }
            Self::BaseBranchMissing { branch } => {
                write!(f, "base branch not found: {branch}")
            }
            Self::BranchExists { branch } => {
                write!(f, "branch already exists: {branch}")
            }
            Self::TargetPathExists { path } => {
                write!(f, "target path already exists: {path}")
            }
            Self::DirtyWorktree { path } => {
                write!(
                    f,
                    "worktree has uncommitted changes: {path} (use --force to override)"
                )
            }
            Self::BranchInUse { branch } => {
                write!(f, "branch still checked out in another worktree: {branch}")
            }
            Self::TmuxMissing { workflow } => {
                write!(f, "tmux is required for {workflow} workflows")
            }
            Self::UnsupportedShell { shell } => {
                write!(f, "unsupported shell: {shell}")
            }
            Self::ConfigParse {
                file,
                line,
                message,
            } => {
                write!(f, "{file}:{line} {message}")
            }
        }
    }
}

impl std::error::Error for SproutError {}

/// True when `err` is the "not inside a repository" sentinel, wherever it
/// sits in the anyhow chain.
pub fn is_not_git_repo(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<SproutError>(),
        Some(SproutError::NotGitRepo)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_cli_wording() {
        assert_eq!(
            SproutError::NotGitRepo.to_string(),
            "run this command inside a git worktree"
        );
        assert_eq!(
            SproutError::InvalidBranchType {
                given: "wip".into()
            }
            .to_string(),
            "invalid type 'wip' (expected: feat|fix|chore|docs|refactor|test)"
        );
        assert_eq!(
            SproutError::DirtyWorktree {
                path: "/tmp/wt".into()
            }
            .to_string(),
            "worktree has uncommitted changes: /tmp/wt (use --force to override)"
        );
    }

    #[test]
    fn sentinel_survives_anyhow_wrapping() {
        let err = anyhow::Error::new(SproutError::NotGitRepo);
        assert!(is_not_git_repo(&err));
        let other = anyhow::anyhow!("boom");
        assert!(!is_not_git_repo(&other));
    }
}
