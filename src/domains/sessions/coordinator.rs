use super::capture;
use super::naming::{
    agent_window_name, command_should_remain_on_exit, custom_tool_window_name,
    default_shell_command, lazygit_window_name, main_window_name, next_window_name,
    trim_window_name,
};
use crate::config::{Config, SessionLayout, WindowConfig};
use crate::utils::paths;
use crate::utils::process;
use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A window to create, already named and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub name: String,
    pub command: String,
}

/// True when this process runs inside a tmux client.
pub fn inside_tmux() -> bool {
    std::env::var("TMUX").map(|v| !v.is_empty()).unwrap_or(false)
}

pub fn has_session(session: &str) -> bool {
    process::run_capture(None, "tmux", &["has-session", "-t", session]).is_ok()
}

pub fn window_exists(session: &str, window: &str) -> bool {
    let target = format!("{session}:{window}");
    process::run_capture(None, "tmux", &["has-session", "-t", &target]).is_ok()
}

pub fn kill_session(session: &str) -> Result<()> {
    process::run_quiet(None, "tmux", &["kill-session", "-t", session])
}

pub fn kill_window(session: &str, window: &str) -> Result<()> {
    let target = format!("{session}:{window}");
    process::run_quiet(None, "tmux", &["kill-window", "-t", &target])
}

fn set_remain_on_exit(session: &str, window: &str) -> Result<()> {
    let target = format!("{session}:{window}");
    process::run_quiet(
        None,
        "tmux",
        &["set-window-option", "-t", &target, "remain-on-exit", "on"],
    )
}

/// Idempotent `new-session -d`. Non-shell start commands keep their pane
/// on exit so failures stay readable.
pub fn ensure_session(
    session: &str,
    start_dir: &Path,
    initial_window: &str,
    initial_command: &str,
) -> Result<()> {
    if has_session(session) {
        return Ok(());
    }
    let window = {
        let trimmed = initial_window.trim();
        if trimmed.is_empty() {
            "main".to_string()
        } else {
            trimmed.to_string()
        }
    };
    let command = {
        let trimmed = initial_command.trim();
        if trimmed.is_empty() {
            default_shell_command()
        } else {
            trimmed.to_string()
        }
    };
    let dir = paths::path_to_string(start_dir);
    process::run_quiet(
        None,
        "tmux",
        &[
            "new-session", "-d", "-s", session, "-n", &window, "-c", &dir, &command,
        ],
    )?;
    if command_should_remain_on_exit(&command) {
        set_remain_on_exit(session, &window)?;
    }
    Ok(())
}

/// Idempotent `new-window -d` with the same remain-on-exit rule.
pub fn ensure_window(session: &str, window: &str, dir: &Path, command: &str) -> Result<()> {
    if window_exists(session, window) {
        return Ok(());
    }
    let command = {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            default_shell_command()
        } else {
            trimmed.to_string()
        }
    };
    let dir = paths::path_to_string(dir);
    process::run_quiet(
        None,
        "tmux",
        &[
            "new-window", "-d", "-t", session, "-n", window, "-c", &dir, &command,
        ],
    )?;
    if command_should_remain_on_exit(&command) {
        set_remain_on_exit(session, window)?;
    }
    Ok(())
}

/// Select the window, then either switch the current client (when already
/// inside tmux) or attach from outside, handing over the terminal.
pub fn focus_window(session: &str, window: &str, attach_outside: bool) -> Result<()> {
    let target = format!("{session}:{window}");
    process::run_quiet(None, "tmux", &["select-window", "-t", &target])?;

    if inside_tmux() {
        return process::run_quiet(None, "tmux", &["switch-client", "-t", session]);
    }
    if attach_outside {
        return process::run_inherit(None, "tmux", &["attach-session", "-t", session]);
    }
    Ok(())
}

/// Resolve a pane dir spec. `None` means "use the worktree root".
///   - `~` / `~/...` expand to the home directory
///   - `{worktree}` / `{worktree}/...` resolve against the worktree
///   - anything else passes through; tmux resolves relative paths itself
pub fn resolve_pane_dir(dir: &str, worktree_path: &Path) -> Option<PathBuf> {
    let dir = dir.trim();
    if dir.is_empty() {
        return None;
    }
    if dir == "~" {
        return paths::home_dir().or_else(|| Some(PathBuf::from(dir)));
    }
    if let Some(rest) = dir.strip_prefix("~/") {
        return match paths::home_dir() {
            Some(home) => Some(home.join(rest)),
            None => Some(PathBuf::from(dir)),
        };
    }
    if let Some(rest) = dir.strip_prefix("{worktree}") {
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            return Some(worktree_path.to_path_buf());
        }
        return Some(worktree_path.join(rest));
    }
    Some(PathBuf::from(dir))
}

/// Horizontal layouts split left/right; everything else stacks.
pub fn split_flag(layout: &str) -> &'static str {
    match layout.trim().to_lowercase().as_str() {
        "even-horizontal" | "main-vertical" => "-h",
        _ => "-v",
    }
}

/// Window list derived from the configured session tools. Builtins that
/// are not installed are filtered out; unknown entries run as-is in a
/// tool-named window.
pub fn configured_windows(
    cfg: &Config,
    branch: &str,
    agent_command: &str,
    has_command: &dyn Fn(&str) -> bool,
) -> Vec<WindowSpec> {
    if cfg.session_tools.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut windows = Vec::with_capacity(cfg.session_tools.len());
    for tool in &cfg.session_tools {
        let (command, window_base) = match tool.trim().to_lowercase().as_str() {
            "agent" => (agent_command.trim().to_string(), agent_window_name(branch)),
            "lazygit" => {
                if !has_command("lazygit") {
                    continue;
                }
                ("lazygit -p .".to_string(), lazygit_window_name(branch))
            }
            "nvim" | "neovim" => {
                if !has_command("nvim") {
                    continue;
                }
                ("nvim .".to_string(), main_window_name(branch))
            }
            _ => {
                let command = tool.trim().to_string();
                let window = custom_tool_window_name(&command);
                (command, window)
            }
        };
        if command.is_empty() {
            continue;
        }
        windows.push(WindowSpec {
            name: next_window_name(&window_base, &mut seen),
            command,
        });
    }
    windows
}

/// Build a session from structured `[[windows]]` config. Idempotent: an
/// existing session gets ensure calls only, and panes are never re-split.
pub fn launch_windowed_session(
    session: &str,
    worktree_path: &Path,
    windows: &[WindowConfig],
) -> Result<(String, String)> {
    let session_is_new = !has_session(session);

    for (idx, win) in windows.iter().enumerate() {
        let mut win_name = trim_window_name(&win.name);
        if win.name.trim().is_empty() {
            win_name = format!("window-{}", idx + 1);
        }

        let mut pane0_dir = worktree_path.to_path_buf();
        let mut pane0_cmd = default_shell_command();
        if let Some(first) = win.panes.first() {
            if let Some(dir) = resolve_pane_dir(&first.dir, worktree_path) {
                pane0_dir = dir;
            }
            let run = first.run.trim();
            if !run.is_empty() {
                pane0_cmd = run.to_string();
            }
        }

        if idx == 0 && session_is_new {
            ensure_session(session, &pane0_dir, &win_name, &pane0_cmd)?;
        } else {
            ensure_window(session, &win_name, &pane0_dir, &pane0_cmd)?;
        }

        if !session_is_new {
            continue;
        }

        let flag = split_flag(&win.layout);
        let target = format!("{session}:{win_name}");
        for pane in win.panes.iter().skip(1) {
            let pane_dir = resolve_pane_dir(&pane.dir, worktree_path)
                .unwrap_or_else(|| worktree_path.to_path_buf());
            let dir = paths::path_to_string(&pane_dir);
            let mut args = vec!["split-window", flag, "-t", target.as_str(), "-c", dir.as_str()];
            if !pane.run.is_empty() {
                args.push(&pane.run);
            }
            process::run_quiet(None, "tmux", &args)?;
        }

        let mut layout = win.layout.clone();
        if layout.is_empty() && win.panes.len() > 1 {
            layout = "even-horizontal".to_string();
        }
        if !layout.is_empty() && win.panes.len() > 1 {
            let _ = process::run_quiet(None, "tmux", &["select-layout", "-t", &target, &layout]);
        }
    }

    let first_window = windows
        .first()
        .map(|win| {
            let name = trim_window_name(&win.name);
            if win.name.trim().is_empty() {
                "window-1".to_string()
            } else {
                name
            }
        })
        .unwrap_or_else(|| "main".to_string());
    Ok((session.to_string(), first_window))
}

/// Build a session from a legacy `layout_*` table: windows stacked
/// vertically, commands typed into panes.
fn launch_legacy_layout(
    session: &str,
    worktree_path: &Path,
    layout: &SessionLayout,
) -> Result<(String, String)> {
    let session_is_new = !has_session(session);

    for (idx, win) in layout.windows.iter().enumerate() {
        let win_name = trim_window_name(&win.name);
        if idx == 0 && session_is_new {
            let initial_cmd = win
                .panes
                .first()
                .map(|p| p.command.clone())
                .unwrap_or_default();
            ensure_session(session, worktree_path, &win_name, &initial_cmd)?;
        } else {
            ensure_window(session, &win_name, worktree_path, "")?;
        }

        if !session_is_new {
            continue;
        }

        let target = format!("{session}:{win_name}");
        for (pane_idx, pane) in win.panes.iter().enumerate() {
            if pane_idx == 0 {
                // Pane 0 came with the window; the first window's pane 0
                // already runs its command from session creation.
                if idx != 0 && !pane.command.is_empty() {
                    capture::send_pane_command(&format!("{target}.0"), &pane.command)?;
                }
                continue;
            }
            let dir = paths::path_to_string(worktree_path);
            let mut args = vec!["split-window", "-v", "-t", target.as_str(), "-c", dir.as_str()];
            if !pane.command.is_empty() {
                args.push(&pane.command);
            }
            process::run_quiet(None, "tmux", &args)?;
        }
        if win.panes.len() > 1 {
            let _ = process::run_quiet(
                None,
                "tmux",
                &["select-layout", "-t", &target, "even-vertical"],
            );
        }
    }

    let first_window = layout
        .windows
        .first()
        .map(|w| trim_window_name(&w.name))
        .unwrap_or_else(|| "main".to_string());
    Ok((session.to_string(), first_window))
}

/// Build or refresh the session for one worktree. Priority: structured
/// `[[windows]]`, then the repo's legacy layout table, then the global
/// `"*"` layout, then the session-tool list, then a bare login shell.
pub fn ensure_worktree_session(
    session: &str,
    worktree_path: &Path,
    branch: &str,
    repo_name: &str,
    agent_command: &str,
    cfg: &Config,
) -> Result<(String, String)> {
    if !cfg.windows.is_empty() {
        return launch_windowed_session(session, worktree_path, &cfg.windows);
    }

    let legacy = cfg
        .session_layouts
        .get(repo_name)
        .or_else(|| cfg.session_layouts.get("*"));
    if let Some(layout) = legacy {
        if !layout.windows.is_empty() {
            return launch_legacy_layout(session, worktree_path, layout);
        }
    }

    let mut windows = configured_windows(cfg, branch, agent_command, &process::command_exists);
    if windows.is_empty() {
        windows.push(WindowSpec {
            name: main_window_name(branch),
            command: default_shell_command(),
        });
    }

    let initial = windows[0].clone();
    if !has_session(session) {
        ensure_session(session, worktree_path, &initial.name, &initial.command)?;
    }
    for window in &windows {
        ensure_window(session, &window.name, worktree_path, &window.command)?;
    }
    Ok((session.to_string(), initial.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::default_session_tools;

    fn test_config() -> Config {
        Config {
            session_tools: default_session_tools(),
            ..Config::default()
        }
    }

    #[test]
    fn pane_dir_resolution() {
        let worktree = Path::new("/tmp/repo.worktrees/feat/x");

        assert_eq!(
            resolve_pane_dir("src/apps/web", worktree),
            Some(PathBuf::from("src/apps/web"))
        );
        assert_eq!(
            resolve_pane_dir("{worktree}/src/apis", worktree),
            Some(PathBuf::from("/tmp/repo.worktrees/feat/x/src/apis"))
        );
        assert_eq!(
            resolve_pane_dir("{worktree}", worktree),
            Some(worktree.to_path_buf())
        );
        assert_eq!(
            resolve_pane_dir("/opt/tools", worktree),
            Some(PathBuf::from("/opt/tools"))
        );
        assert_eq!(resolve_pane_dir("", worktree), None);
        if let Some(home) = crate::utils::paths::home_dir() {
            assert_eq!(resolve_pane_dir("~", worktree), Some(home.clone()));
            assert_eq!(
                resolve_pane_dir("~/projects", worktree),
                Some(home.join("projects"))
            );
        }
    }

    #[test]
    fn split_flag_per_layout() {
        assert_eq!(split_flag("even-horizontal"), "-h");
        assert_eq!(split_flag("main-vertical"), "-h");
        assert_eq!(split_flag("even-vertical"), "-v");
        assert_eq!(split_flag(""), "-v");
        assert_eq!(split_flag("tiled"), "-v");
    }

    #[test]
    fn configured_windows_filter_missing_builtins() {
        let mut cfg = test_config();
        cfg.session_tools = vec![
            "agent".to_string(),
            "lazygit".to_string(),
            "nvim".to_string(),
            "pnpm dev".to_string(),
        ];

        let windows = configured_windows(&cfg, "feat/my feature", "codex --full-auto", &|name| {
            name == "nvim"
        });

        assert_eq!(windows.len(), 3);
        assert!(windows[0].name.starts_with("agent-"));
        assert_eq!(windows[0].command, "codex --full-auto");
        assert_eq!(windows[1].command, "nvim .");
        assert_eq!(windows[2].name, "tool-pnpm");
        assert_eq!(windows[2].command, "pnpm dev");
    }

    #[test]
    fn configured_windows_dedupe_names() {
        let mut cfg = test_config();
        cfg.session_tools = vec!["npm run dev".to_string(), "npm test".to_string()];

        let windows = configured_windows(&cfg, "feat/x", "codex", &|_| true);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].name, "tool-npm");
        assert_eq!(windows[1].name, "tool-npm-2");
    }

    #[test]
    fn empty_tool_list_yields_no_windows() {
        let mut cfg = test_config();
        cfg.session_tools.clear();
        assert!(configured_windows(&cfg, "feat/x", "codex", &|_| true).is_empty());
    }
}
