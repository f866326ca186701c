//! Environment health report: required binaries, every optional tool the
//! configuration mentions, and the integrity of the worktree inventory.

use super::Manager;
use crate::domains::git;
use crate::domains::sessions::naming::command_executable_name;
use crate::utils::process;

#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    pub lines: Vec<String>,
    pub exit_code: i32,
    pub missing_required: Vec<String>,
}

impl Manager {
    pub fn doctor(&self) -> DoctorReport {
        let mut report = DoctorReport::default();

        for required in ["git", "tmux"] {
            if process::command_exists(required) {
                report.lines.push(format!("ok   {required}"));
            } else {
                report.lines.push(format!("miss {required}"));
                report.missing_required.push(required.to_string());
                report.exit_code = 1;
            }
        }

        let mut optionals: Vec<String> = Vec::new();
        let mut add_optional = |name: String, optionals: &mut Vec<String>| {
            let name = name.trim().to_string();
            if !name.is_empty() && !optionals.contains(&name) {
                optionals.push(name);
            }
        };
        for tool in &self.cfg.session_tools {
            match tool.trim().to_lowercase().as_str() {
                "agent" => add_optional(
                    command_executable_name(&self.agent_command()),
                    &mut optionals,
                ),
                "nvim" | "neovim" => add_optional("nvim".to_string(), &mut optionals),
                "lazygit" => add_optional("lazygit".to_string(), &mut optionals),
                _ => add_optional(command_executable_name(tool), &mut optionals),
            }
        }
        add_optional(
            command_executable_name(&self.agent_command()),
            &mut optionals,
        );

        for optional in &optionals {
            if process::command_exists(optional) {
                report.lines.push(format!("ok   {optional}"));
            } else {
                report.lines.push(format!("warn {optional} (optional)"));
            }
        }

        let repo_root = match self.require_repo() {
            Ok(root) => root,
            Err(_) => {
                report
                    .lines
                    .push("warn not inside a git repository; skipped worktree checks".to_string());
                return report;
            }
        };

        let entries = match git::parse_worktree_list(&repo_root) {
            Ok(entries) => entries,
            Err(err) => {
                report
                    .lines
                    .push(format!("warn unable to parse worktrees: {err}"));
                return report;
            }
        };

        let mut bad = false;
        for entry in entries {
            if !entry.path.is_dir() {
                report.lines.push(format!(
                    "warn missing worktree path: {}",
                    entry.path.display()
                ));
                bad = true;
                continue;
            }
            if !entry.branch.is_empty() && !git::branch_exists(&repo_root, &entry.branch) {
                report.lines.push(format!(
                    "warn branch missing for worktree {}: {}",
                    entry.path.display(),
                    entry.branch
                ));
                bad = true;
            }
        }
        if !bad {
            report.lines.push("ok   worktree metadata".to_string());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn doctor_reports_required_tools() {
        let mgr = Manager::new(Config::default());
        let report = mgr.doctor();
        // git is a hard dependency of the test environment itself.
        assert!(report.lines.iter().any(|l| l == "ok   git"));
        // Every line carries one of the three verdict prefixes.
        for line in &report.lines {
            assert!(
                line.starts_with("ok   ") || line.starts_with("warn ") || line.starts_with("miss "),
                "unexpected line: {line}"
            );
        }
    }

    #[test]
    fn doctor_checks_configured_optional_tools() {
        let mut cfg = Config::default();
        cfg.session_tools = vec!["agent".to_string(), "definitely-not-a-real-tool --flag".to_string()];
        cfg.agent_command = "codex".to_string();
        let mgr = Manager::new(cfg);
        let report = mgr.doctor();
        assert!(
            report
                .lines
                .iter()
                .any(|l| l.contains("definitely-not-a-real-tool") && l.starts_with("warn")),
            "lines: {:?}",
            report.lines
        );
    }
}
