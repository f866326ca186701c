pub mod flat;
pub mod types;

pub use types::{Config, PaneConfig, SessionLayout, WindowConfig};

use crate::errors::SproutError;
use crate::utils::paths;
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Build the frozen per-process configuration: defaults, then the global
/// file, then the repo-local `.sprout.toml`, then environment overrides.
pub fn load() -> Result<Config> {
    let mut cfg = Config::default();

    // Repo name scopes the structured windows tables in the global file.
    let repo_root = find_git_root(Path::new("."));
    let repo_name = repo_root
        .as_deref()
        .and_then(|root| root.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(global_path) = global_config_path() {
        if global_path.is_file() {
            apply_file(&global_path, &mut cfg, FileScope::Global { repo_name: &repo_name })?;
        }
    }

    if let Some(root) = repo_root {
        let repo_config = root.join(".sprout.toml");
        if repo_config.is_file() {
            apply_file(&repo_config, &mut cfg, FileScope::Repo)?;
        }
    }

    apply_env_overrides(&mut cfg);
    if std::env::var("SPROUT_EMIT_CD_MARKER").as_deref() == Ok("1") {
        cfg.emit_cd_marker = true;
    }
    Ok(cfg)
}

pub fn global_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SPROUT_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    paths::config_dir().map(|dir| dir.join("config.toml"))
}

/// Walk upward until a directory containing a `.git` entry (dir for the
/// main checkout, file for linked worktrees) is found.
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut current = paths::abs_path(start);
    loop {
        if current.join(".git").exists() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

enum FileScope<'a> {
    Repo,
    Global { repo_name: &'a str },
}

fn apply_file(path: &Path, cfg: &mut Config, scope: FileScope) -> Result<()> {
    let contents = std::fs::read_to_string(path).map_err(|err| {
        anyhow::Error::new(SproutError::config_parse(path.display(), 0, err))
    })?;
    flat::apply_flat_file(path, &contents, cfg)?;
    apply_structured(path, &contents, cfg, scope)
}

#[derive(Debug, Default, Deserialize)]
struct RawRepoTable {
    #[serde(default)]
    windows: Vec<WindowConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStructuredFile {
    #[serde(default)]
    windows: Vec<WindowConfig>,
    #[serde(default)]
    repos: HashMap<String, RawRepoTable>,
}

/// Decode the structured `[[windows]]` tables with a real TOML parser. The
/// flat layer has already consumed the scalar keys; this pass only looks at
/// the window tables, top-level for repo configs and under
/// `[repos.<name>]` for the global one.
fn apply_structured(path: &Path, contents: &str, cfg: &mut Config, scope: FileScope) -> Result<()> {
    let raw: RawStructuredFile = toml::from_str(contents).map_err(|err| {
        let line = err
            .span()
            .map(|span| contents[..span.start.min(contents.len())].lines().count())
            .unwrap_or(0);
        anyhow::Error::new(SproutError::config_parse(
            path.display(),
            line,
            err.message(),
        ))
    })?;

    match scope {
        FileScope::Repo => {
            if !raw.windows.is_empty() {
                cfg.windows = raw.windows;
            }
        }
        FileScope::Global { repo_name } => {
            if !repo_name.is_empty() {
                if let Some(repo_table) = raw.repos.get(repo_name) {
                    if !repo_table.windows.is_empty() {
                        cfg.windows = repo_table.windows.clone();
                    }
                }
            }
        }
    }
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(v) = env_var("SPROUT_BASE_BRANCH") {
        cfg.base_branch = v;
    }
    if let Some(v) = env_var("SPROUT_WORKTREE_ROOT_TEMPLATE") {
        cfg.worktree_root_template = v;
    }
    if let Some(v) = env_var("SPROUT_AUTO_LAUNCH") {
        if let Ok(b) = flat::parse_bool(&v) {
            cfg.auto_launch = b;
        }
    }
    if let Some(v) = env_var("SPROUT_AUTO_START_AGENT") {
        if let Ok(b) = flat::parse_bool(&v) {
            cfg.auto_start_agent = b;
        }
    }
    if let Some(v) = env_var("SPROUT_UPDATE_CHECK") {
        if let Ok(b) = flat::parse_bool(&v) {
            cfg.update_check = b;
        }
    }
    if let Some(v) = env_var("SPROUT_LAUNCH_NVIM") {
        if let Ok(b) = flat::parse_bool(&v) {
            cfg.session_tools = flat::set_legacy_session_tool(&cfg.session_tools, "nvim", b);
        }
    }
    if let Some(v) = env_var("SPROUT_LAUNCH_LAZYGIT") {
        if let Ok(b) = flat::parse_bool(&v) {
            cfg.session_tools = flat::set_legacy_session_tool(&cfg.session_tools, "lazygit", b);
        }
    }
    if let Some(v) = env_var("SPROUT_SESSION_TOOLS") {
        if let Ok(tools) = flat::parse_array_env(&v) {
            cfg.session_tools = flat::normalize_session_tools(&tools);
        }
    }
    if let Some(v) = env_var("SPROUT_COPY_UNTRACKED_EXCLUDE") {
        if let Ok(patterns) = flat::parse_array_env(&v) {
            cfg.copy_untracked_exclude = patterns;
        }
    }
    if let Some(v) = env_var("SPROUT_AGENT_COMMAND") {
        cfg.agent_command = v;
    }
    if let Some(v) = env_var("SPROUT_DEFAULT_AGENT_TYPE") {
        cfg.default_agent_type = v.trim().to_lowercase();
    }
    for (key, value) in std::env::vars() {
        if let Some(agent_type) = key.strip_prefix("SPROUT_AGENT_COMMAND_") {
            let agent_type = agent_type.trim().to_lowercase();
            if !agent_type.is_empty() {
                cfg.agent_commands.insert(agent_type, value);
            }
        }
    }
    if let Some(v) = env_var("SPROUT_SESSION_PREFIX") {
        cfg.session_prefix = v;
    }
}
