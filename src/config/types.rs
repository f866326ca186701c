use serde::Deserialize;
use std::collections::HashMap;

/// A tmux window described by the structured `[[windows]]` config.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WindowConfig {
    #[serde(default)]
    pub name: String,
    /// tmux layout hint: even-horizontal, even-vertical, tiled,
    /// main-horizontal, main-vertical.
    #[serde(default)]
    pub layout: String,
    #[serde(default)]
    pub panes: Vec<PaneConfig>,
}

/// A single pane within a structured window.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PaneConfig {
    /// Working dir: absolute, `~/...`, `{worktree}/...`, or empty for the
    /// worktree root.
    #[serde(default)]
    pub dir: String,
    /// Command to execute; empty means the login shell.
    #[serde(default)]
    pub run: String,
}

/// Legacy `layout_<repo>_win_<name>_pane_<N>` tables, kept for configs that
/// predate `[[windows]]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLayout {
    pub windows: Vec<WindowLayout>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowLayout {
    pub name: String,
    pub panes: Vec<PaneLayout>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaneLayout {
    pub command: String,
}

/// Frozen process-wide configuration. Built once by `config::load` and
/// never mutated afterwards; carried by value into the manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub base_branch: String,
    /// Worktree root template with a `{repo}` placeholder; relative paths
    /// resolve against the repository root.
    pub worktree_root_template: String,
    pub auto_launch: bool,
    pub auto_start_agent: bool,
    /// Ordered, deduplicated session tool list ("agent", "lazygit", "nvim",
    /// or an arbitrary command).
    pub session_tools: Vec<String>,
    pub agent_command: String,
    pub default_agent_type: String,
    pub agent_commands: HashMap<String, String>,
    pub session_prefix: String,
    pub copy_untracked_exclude: Vec<String>,
    pub update_check: bool,
    pub emit_cd_marker: bool,
    /// Legacy layouts keyed by repo name; `"*"` holds global window tables.
    pub session_layouts: HashMap<String, SessionLayout>,
    /// Structured windows, already scoped to the current repo.
    pub windows: Vec<WindowConfig>,
}

pub fn default_session_tools() -> Vec<String> {
    vec!["agent".to_string(), "lazygit".to_string(), "nvim".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        let mut agent_commands = HashMap::new();
        for agent in ["codex", "aider", "claude", "gemini"] {
            agent_commands.insert(agent.to_string(), agent.to_string());
        }
        Config {
            base_branch: "main".to_string(),
            worktree_root_template: "../{repo}.worktrees".to_string(),
            auto_launch: true,
            auto_start_agent: true,
            session_tools: default_session_tools(),
            agent_command: "codex".to_string(),
            default_agent_type: "codex".to_string(),
            agent_commands,
            session_prefix: "sprout".to_string(),
            copy_untracked_exclude: Vec::new(),
            update_check: true,
            emit_cd_marker: false,
            session_layouts: HashMap::new(),
            windows: Vec::new(),
        }
    }
}
