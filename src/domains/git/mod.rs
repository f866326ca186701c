pub mod branches;
pub mod diff;
pub mod repository;
pub mod worktrees;

pub use branches::{
    branch_exists, delete_branch, list_branches, make_branch_name, resolve_base_branch, slugify,
    BranchInfo,
};
pub use diff::{
    parse_porcelain_status, worktree_diff, worktree_diff_files, worktree_diff_for_file,
    worktree_dirty, DiffFile,
};
pub use repository::{current_branch, repo_name, require_repo};
pub use worktrees::{
    create_worktree_from_existing, create_worktree_with_branch, parse_worktree_list,
    prune_worktrees, run_worktree_remove, should_retry_worktree_add,
    should_retry_worktree_remove, worktree_command_timeout, WorktreeEntry,
};
