//! Deterministic tmux naming. Two sprout processes looking at the same
//! repository state must compute identical session and window names, so
//! everything here is a pure function of its inputs.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

static SAFE_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());
static DASH_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

pub const MAX_SESSION_NAME_LEN: usize = 100;
pub const MAX_WINDOW_NAME_LEN: usize = 60;

/// Reduce an arbitrary string to tmux-safe characters: `[A-Za-z0-9._-]`,
/// no dash runs, trimmed; empty input becomes "default".
pub fn safe_name(value: &str) -> String {
    let name = SAFE_NAME_RE.replace_all(value, "-");
    let name = DASH_RUN_RE.replace_all(&name, "-");
    let name = name.trim_matches('-');
    if name.is_empty() {
        "default".to_string()
    } else {
        name.to_string()
    }
}

fn truncate_ascii(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut cut = max;
    while cut > 0 && !value.is_char_boundary(cut) {
        cut -= 1;
    }
    value[..cut].to_string()
}

/// `<prefix>-<repo>` or just `<repo>` when the prefix is empty.
pub fn session_name_for_repo(session_prefix: &str, repo_name: &str) -> String {
    let repo = safe_name(repo_name);
    let prefix = session_prefix.trim();
    if prefix.is_empty() {
        return repo;
    }
    format!("{}-{repo}", safe_name(prefix))
}

/// Session name for one worktree: repo session name plus the branch (or
/// the path basename on detached HEAD), capped at 100 characters.
pub fn worktree_session_name(
    session_prefix: &str,
    repo_name: &str,
    branch: &str,
    worktree_path: &Path,
) -> String {
    let base = session_name_for_repo(session_prefix, repo_name);
    let token = branch.trim();
    let token = if token.is_empty() {
        worktree_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        token.to_string()
    };
    let suffix = safe_name(&token);
    let name = format!("{base}-{suffix}");
    truncate_ascii(&name, MAX_SESSION_NAME_LEN)
}

pub fn main_window_name(branch: &str) -> String {
    truncate_ascii(&safe_name(branch), MAX_WINDOW_NAME_LEN)
}

pub fn agent_window_name(branch: &str) -> String {
    truncate_ascii(&format!("agent-{}", safe_name(branch)), MAX_WINDOW_NAME_LEN)
}

pub fn lazygit_window_name(branch: &str) -> String {
    truncate_ascii(&format!("git-{}", safe_name(branch)), MAX_WINDOW_NAME_LEN)
}

/// First token of a command line, basename only.
pub fn command_executable_name(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .map(|token| {
            Path::new(token)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| token.to_string())
        })
        .unwrap_or_default()
}

/// Windows that run a real tool keep their pane around after exit so the
/// operator can read failure output; plain shells exit silently.
pub fn command_should_remain_on_exit(command: &str) -> bool {
    let exec_name = command_executable_name(command).trim().to_lowercase();
    if exec_name.is_empty() {
        return false;
    }
    !matches!(
        exec_name.as_str(),
        "bash" | "zsh" | "fish" | "sh" | "dash" | "ksh" | "csh" | "tcsh"
    )
}

pub fn default_shell_command() -> String {
    match std::env::var("SHELL") {
        Ok(shell) if !shell.is_empty() => shell,
        _ => "bash".to_string(),
    }
}

/// Window name for an arbitrary session tool: `tool-<executable>`.
pub fn custom_tool_window_name(command: &str) -> String {
    let mut exec_name = safe_name(&command_executable_name(command));
    if exec_name == "default" {
        exec_name = "tool".to_string();
    }
    trim_window_name(&format!("tool-{exec_name}"))
}

pub fn trim_window_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return "main".to_string();
    }
    truncate_ascii(name, MAX_WINDOW_NAME_LEN)
}

/// Dedup window names within one session with `-2`, `-3`, ... suffixes,
/// shortening the stem so the cap still holds.
pub fn next_window_name(base: &str, seen: &mut HashSet<String>) -> String {
    let name = trim_window_name(base);
    if seen.insert(name.clone()) {
        return name;
    }
    for counter in 2.. {
        let suffix = format!("-{counter}");
        let max_stem = MAX_WINDOW_NAME_LEN.saturating_sub(suffix.len()).max(1);
        let candidate = format!("{}{suffix}", truncate_ascii(&name, max_stem));
        if seen.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!("window name counter exhausted")
}
