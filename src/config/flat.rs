//! Flat key=value layer of the config format. This layer predates the
//! structured `[[windows]]` tables, so scalars, arrays, and the magic
//! prefixed keys are parsed line by line here while `toml` handles the
//! structured layer.

use super::types::{Config, PaneLayout, WindowLayout};
use crate::errors::SproutError;
use anyhow::Result;
use std::path::Path;

pub fn apply_flat_file(path: &Path, contents: &str, cfg: &mut Config) -> Result<()> {
    let file = path.display().to_string();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line_num = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let line = strip_comment(line);
        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => continue,
        };

        let fail = |what: &str, err: String| {
            anyhow::Error::new(SproutError::config_parse(
                &file,
                line_num,
                format!("invalid {what}: {err}"),
            ))
        };

        match key {
            "base_branch" => {
                cfg.base_branch = parse_string(value).map_err(|e| fail(key, e))?;
            }
            "worktree_root_template" => {
                cfg.worktree_root_template = parse_string(value).map_err(|e| fail(key, e))?;
            }
            "auto_launch" => {
                cfg.auto_launch = parse_bool(value).map_err(|e| fail(key, e))?;
            }
            "auto_start_agent" => {
                cfg.auto_start_agent = parse_bool(value).map_err(|e| fail(key, e))?;
            }
            "update_check" => {
                cfg.update_check = parse_bool(value).map_err(|e| fail(key, e))?;
            }
            "session_tools" => {
                let tools = parse_string_array(value).map_err(|e| fail(key, e))?;
                cfg.session_tools = normalize_session_tools(&tools);
            }
            "copy_untracked_exclude" => {
                cfg.copy_untracked_exclude = parse_string_array(value).map_err(|e| fail(key, e))?;
            }
            "launch_nvim" => {
                let enabled = parse_bool(value).map_err(|e| fail(key, e))?;
                cfg.session_tools = set_legacy_session_tool(&cfg.session_tools, "nvim", enabled);
            }
            "launch_lazygit" => {
                let enabled = parse_bool(value).map_err(|e| fail(key, e))?;
                cfg.session_tools = set_legacy_session_tool(&cfg.session_tools, "lazygit", enabled);
            }
            "agent_command" => {
                cfg.agent_command = parse_string(value).map_err(|e| fail(key, e))?;
            }
            "default_agent_type" => {
                let parsed = parse_string(value).map_err(|e| fail(key, e))?;
                cfg.default_agent_type = parsed.trim().to_lowercase();
            }
            "session_prefix" => {
                cfg.session_prefix = parse_string(value).map_err(|e| fail(key, e))?;
            }
            _ => {
                if let Some(window_name) = key.strip_prefix("window_") {
                    // window_<name> = ["cmd1", "cmd2"] describes a global
                    // window layout, filed under the "*" repo key.
                    if let Ok(commands) = parse_string_array(value) {
                        let layout = cfg.session_layouts.entry("*".to_string()).or_default();
                        layout.windows.push(WindowLayout {
                            name: window_name.to_string(),
                            panes: commands
                                .into_iter()
                                .map(|command| PaneLayout { command })
                                .collect(),
                        });
                    }
                } else if key.starts_with("layout_") {
                    apply_legacy_layout_key(key, value, cfg);
                } else if let Some(agent_type) = key.strip_prefix("agent_command_") {
                    let parsed = parse_string(value).map_err(|e| fail(key, e))?;
                    let agent_type = agent_type.trim().to_lowercase();
                    if !agent_type.is_empty() {
                        cfg.agent_commands.insert(agent_type, parsed);
                    }
                }
            }
        }
    }
    Ok(())
}

/// layout_<repo>_win_<name>_pane_<idx> = "command"
fn apply_legacy_layout_key(key: &str, value: &str, cfg: &mut Config) {
    let parts: Vec<&str> = key.split('_').collect();
    if parts.len() < 6 || parts[2] != "win" || parts[4] != "pane" {
        return;
    }
    let repo = parts[1].to_string();
    let window_name = parts[3].to_string();
    let pane_idx: usize = match parts[5].parse() {
        Ok(idx) => idx,
        Err(_) => return,
    };
    let command = parse_string(value).unwrap_or_default();

    let layout = cfg.session_layouts.entry(repo).or_default();
    let window_idx = match layout
        .windows
        .iter()
        .position(|w| w.name == window_name)
    {
        Some(idx) => idx,
        None => {
            layout.windows.push(WindowLayout {
                name: window_name,
                panes: Vec::new(),
            });
            layout.windows.len() - 1
        }
    };
    let panes = &mut layout.windows[window_idx].panes;
    while panes.len() <= pane_idx {
        panes.push(PaneLayout::default());
    }
    panes[pane_idx].command = command;
}

/// Drop a trailing `# comment`, honoring double quotes.
pub fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, byte) in line.bytes().enumerate() {
        match byte {
            b'"' => in_quotes = !in_quotes,
            b'#' if !in_quotes => return line[..idx].trim(),
            _ => {}
        }
    }
    line.trim()
}

pub fn parse_string(value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(String::new());
    }
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        return unquote(&value[1..value.len() - 1]);
    }
    Ok(value.to_string())
}

fn unquote(inner: &str) -> Result<String, String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => return Err("unterminated escape sequence".to_string()),
        }
    }
    Ok(out)
}

pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("invalid bool: {other}")),
    }
}

pub fn parse_string_array(value: &str) -> Result<Vec<String>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }
    if !value.starts_with('[') || !value.ends_with(']') {
        return Err("expected array syntax like [\"agent\", \"nvim\"]".to_string());
    }
    let inner = value[1..value.len() - 1].trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    let mut items = Vec::new();
    for raw in split_array_items(inner) {
        let part = raw.trim();
        if part.is_empty() {
            continue;
        }
        let parsed = parse_string(part)?;
        let parsed = parsed.trim();
        if parsed.is_empty() {
            continue;
        }
        items.push(parsed.to_string());
    }
    Ok(items)
}

/// Split on commas that sit outside double-quoted strings, keeping escaped
/// quotes inside items intact.
fn split_array_items(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in value.chars() {
        match ch {
            '"' => {
                current.push(ch);
                if !escape {
                    in_quotes = !in_quotes;
                }
                escape = false;
            }
            '\\' => {
                current.push(ch);
                if in_quotes {
                    escape = !escape;
                }
            }
            ',' => {
                if in_quotes {
                    current.push(ch);
                    escape = false;
                } else {
                    items.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(ch);
                escape = false;
            }
        }
    }
    items.push(current);
    items
}

/// Trim entries, case-fold the builtin names, and drop positional
/// duplicates while preserving order.
pub fn normalize_session_tools(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for raw in values {
        let tool = raw.trim();
        if tool.is_empty() {
            continue;
        }
        let normalized = match tool.to_lowercase().as_str() {
            "agent" => "agent".to_string(),
            "lazygit" => "lazygit".to_string(),
            "nvim" | "neovim" => "nvim".to_string(),
            _ => tool.to_string(),
        };
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

/// The legacy launch_nvim / launch_lazygit booleans edit the tool list in
/// place: enable appends when missing, disable removes.
pub fn set_legacy_session_tool(tools: &[String], tool: &str, enabled: bool) -> Vec<String> {
    let normalized = normalize_session_tools(tools);
    let target = match tool.trim().to_lowercase().as_str() {
        "nvim" | "neovim" => "nvim",
        "lazygit" => "lazygit",
        "agent" => "agent",
        _ => return normalized,
    };

    let mut out = Vec::with_capacity(normalized.len() + 1);
    let mut has_target = false;
    for existing in normalized {
        if existing == target {
            has_target = true;
            if enabled {
                out.push(existing);
            }
            continue;
        }
        out.push(existing);
    }
    if enabled && !has_target {
        out.push(target.to_string());
    }
    out
}

/// Env arrays accept either bracketed literals or bare comma-separated
/// values.
pub fn parse_array_env(value: &str) -> Result<Vec<String>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }
    if value.starts_with('[') {
        return parse_string_array(value);
    }
    Ok(value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse_into(contents: &str) -> Config {
        let mut cfg = Config::default();
        apply_flat_file(&PathBuf::from("test.toml"), contents, &mut cfg).unwrap();
        cfg
    }

    #[test]
    fn scalars_and_comments() {
        let cfg = parse_into(
            "# header\nbase_branch = \"develop\"  # trailing\nsession_prefix = spr\nauto_launch = off\n",
        );
        assert_eq!(cfg.base_branch, "develop");
        assert_eq!(cfg.session_prefix, "spr");
        assert!(!cfg.auto_launch);
    }

    #[test]
    fn hash_inside_quotes_is_not_a_comment() {
        let cfg = parse_into("agent_command = \"codex --note '#1'\"\n");
        assert_eq!(cfg.agent_command, "codex --note '#1'");
    }

    #[test]
    fn arrays_parse_and_normalize() {
        let cfg = parse_into("session_tools = [\"Agent\", \"neovim\", \"pnpm dev\", \"agent\"]\n");
        assert_eq!(cfg.session_tools, vec!["agent", "nvim", "pnpm dev"]);
    }

    #[test]
    fn bad_bool_reports_file_and_line() {
        let mut cfg = Config::default();
        let err =
            apply_flat_file(&PathBuf::from("cfg.toml"), "\nauto_launch = maybe\n", &mut cfg)
                .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("cfg.toml:2"), "got: {text}");
        assert!(text.contains("auto_launch"), "got: {text}");
    }

    #[test]
    fn legacy_launch_keys_edit_tool_list() {
        let cfg = parse_into("launch_nvim = false\n");
        assert_eq!(cfg.session_tools, vec!["agent", "lazygit"]);

        let cfg = parse_into("session_tools = [\"agent\"]\nlaunch_lazygit = true\n");
        assert_eq!(cfg.session_tools, vec!["agent", "lazygit"]);
    }

    #[test]
    fn agent_command_per_type() {
        let cfg = parse_into("agent_command_Claude = \"claude --dangerously-skip-permissions\"\n");
        assert_eq!(
            cfg.agent_commands.get("claude").map(String::as_str),
            Some("claude --dangerously-skip-permissions")
        );
    }

    #[test]
    fn global_window_key_lands_in_star_layout() {
        let cfg = parse_into("window_dev = [\"pnpm dev\", \"pnpm test --watch\"]\n");
        let layout = cfg.session_layouts.get("*").unwrap();
        assert_eq!(layout.windows.len(), 1);
        assert_eq!(layout.windows[0].name, "dev");
        assert_eq!(layout.windows[0].panes[1].command, "pnpm test --watch");
    }

    #[test]
    fn legacy_layout_key_builds_windows_and_panes() {
        let cfg = parse_into(
            "layout_myrepo_win_main_pane_0 = \"nvim .\"\nlayout_myrepo_win_main_pane_2 = \"htop\"\n",
        );
        let layout = cfg.session_layouts.get("myrepo").unwrap();
        assert_eq!(layout.windows[0].name, "main");
        assert_eq!(layout.windows[0].panes.len(), 3);
        assert_eq!(layout.windows[0].panes[0].command, "nvim .");
        assert_eq!(layout.windows[0].panes[1].command, "");
        assert_eq!(layout.windows[0].panes[2].command, "htop");
    }

    #[test]
    fn array_items_keep_quoted_commas() {
        let items = parse_string_array("[\"echo a,b\", \"c\"]").unwrap();
        assert_eq!(items, vec!["echo a,b", "c"]);
    }

    #[test]
    fn env_arrays_accept_both_syntaxes() {
        assert_eq!(
            parse_array_env("agent, nvim , lazygit").unwrap(),
            vec!["agent", "nvim", "lazygit"]
        );
        assert_eq!(
            parse_array_env("[\"agent\", \"nvim\"]").unwrap(),
            vec!["agent", "nvim"]
        );
        assert!(parse_array_env("").unwrap().is_empty());
    }

    #[test]
    fn copy_exclude_and_update_check_keys() {
        let cfg = parse_into(
            "copy_untracked_exclude = [\"build\", \"*.log\"]\nupdate_check = false\n",
        );
        assert_eq!(cfg.copy_untracked_exclude, vec!["build", "*.log"]);
        assert!(!cfg.update_check);
    }
}
