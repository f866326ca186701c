//! Agent window lifecycle and pane probes: everything the dashboard and
//! the `agent` subcommand need to start, stop, observe, and drive the
//! per-worktree coding agent.

use super::{AgentOptions, Manager, Worktree};
use crate::domains::sessions::{capture, coordinator, naming, status};
use crate::errors::SproutError;
use crate::utils::process;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Refined agent state shown by the dashboard table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentActivity {
    /// No agent window exists.
    Offline,
    /// Window exists but the capture could not be classified.
    Running,
    Busy,
    Ready,
}

impl Manager {
    /// Command for the agent pane: the configured command, else the
    /// per-type map via the default agent type, else codex when installed,
    /// else the login shell.
    pub fn agent_command(&self) -> String {
        let configured = self.cfg.agent_command.trim();
        if !configured.is_empty() {
            return configured.to_string();
        }
        if let Some(command) = self.cfg.agent_commands.get(&self.cfg.default_agent_type) {
            let command = command.trim();
            if !command.is_empty() {
                return command.to_string();
            }
        }
        if process::command_exists("codex") {
            return "codex".to_string();
        }
        naming::default_shell_command()
    }

    /// Command for a specific agent type, falling back to the default
    /// resolution when the type is unknown.
    pub fn agent_command_for(&self, agent_type: &str) -> String {
        let agent_type = agent_type.trim().to_lowercase();
        if !agent_type.is_empty() {
            if let Some(command) = self.cfg.agent_commands.get(&agent_type) {
                let command = command.trim();
                if !command.is_empty() {
                    return command.to_string();
                }
            }
        }
        self.agent_command()
    }

    /// Ensure the session and its base windows, then the agent window.
    /// Returns whether an agent window was already running.
    pub fn start_agent(&self, opts: &AgentOptions) -> Result<(PathBuf, bool)> {
        let repo_root = self.require_repo()?;
        let wt = self.find_worktree(&opts.target)?;
        if !process::command_exists("tmux") {
            return Err(anyhow::Error::new(SproutError::tmux_missing("agent")));
        }

        let branch = wt.branch_or_name();
        let session = self.worktree_session_name_from(&repo_root, &branch, &wt.path);
        let agent_window = naming::agent_window_name(&branch);
        let already_running = coordinator::has_session(&session)
            && coordinator::window_exists(&session, &agent_window);

        coordinator::ensure_worktree_session(
            &session,
            &wt.path,
            &branch,
            &self.repo_name(&repo_root),
            &self.agent_command(),
            &self.cfg,
        )?;
        coordinator::ensure_window(&session, &agent_window, &wt.path, &self.agent_command())?;
        log::debug!(
            "agent start path={} session={session} window={agent_window} already_running={already_running}",
            wt.path.display()
        );

        if opts.attach {
            let attach_outside = !coordinator::inside_tmux();
            coordinator::focus_window(&session, &agent_window, attach_outside)?;
        }

        Ok((wt.path, already_running))
    }

    pub fn attach_agent(&self, target: &str) -> Result<PathBuf> {
        let opts = AgentOptions {
            target: target.to_string(),
            attach: true,
        };
        Ok(self.start_agent(&opts)?.0)
    }

    /// Kill the agent window only; the rest of the session stays alive.
    pub fn stop_agent(&self, target: &str) -> Result<(PathBuf, bool)> {
        let repo_root = self.require_repo()?;
        let wt = self.find_worktree(target)?;
        if !process::command_exists("tmux") {
            return Err(anyhow::Error::new(SproutError::tmux_missing("agent")));
        }

        let session = self.worktree_session_name(&repo_root, &wt);
        let agent_window = naming::agent_window_name(&wt.branch_or_name());
        if !coordinator::has_session(&session)
            || !coordinator::window_exists(&session, &agent_window)
        {
            return Ok((wt.path, false));
        }
        coordinator::kill_window(&session, &agent_window)?;
        Ok((wt.path, true))
    }

    /// Pane 0 of the agent window. When the operator has split the window
    /// and the agent moved, the pane actually running the agent executable
    /// wins over the index.
    pub fn agent_pane_target(&self, repo_root: &Path, wt: &Worktree) -> String {
        let session = self.worktree_session_name(repo_root, wt);
        let window = naming::agent_window_name(&wt.branch_or_name());
        let agent_exec = naming::command_executable_name(&self.agent_command());
        if !agent_exec.is_empty() {
            if let Ok(Some(index)) = capture::pane_index_by_command(&session, &window, &agent_exec)
            {
                return format!("{session}:{window}.{index}");
            }
        }
        format!("{session}:{window}.0")
    }

    pub fn editor_pane_target(&self, repo_root: &Path, wt: &Worktree) -> String {
        let session = self.worktree_session_name(repo_root, wt);
        let window = naming::main_window_name(&wt.branch_or_name());
        format!("{session}:{window}.0")
    }

    pub fn lazygit_pane_target(&self, repo_root: &Path, wt: &Worktree) -> Result<String> {
        let session = self.worktree_session_name(repo_root, wt);
        let window = naming::lazygit_window_name(&wt.branch_or_name());
        if !coordinator::has_session(&session) || !coordinator::window_exists(&session, &window) {
            return Err(anyhow::anyhow!(
                "lazygit pane is not available in this tmux window"
            ));
        }
        Ok(format!("{session}:{window}.0"))
    }

    fn resolve_for_tmux(&self, target: &str) -> Result<(PathBuf, Worktree)> {
        let repo_root = self.require_repo()?;
        let wt = self.find_worktree_lite(&repo_root, target)?;
        Ok((repo_root, wt))
    }

    fn require_tmux(workflow: &str) -> Result<()> {
        if !process::command_exists("tmux") {
            return Err(anyhow::Error::new(SproutError::tmux_missing(workflow)));
        }
        Ok(())
    }

    pub fn agent_output(&self, target: &str, lines: usize) -> Result<String> {
        let (repo_root, wt) = self.resolve_for_tmux(target)?;
        self.agent_output_for(&repo_root, &wt, lines)
    }

    pub fn agent_output_for(
        &self,
        repo_root: &Path,
        wt: &Worktree,
        lines: usize,
    ) -> Result<String> {
        Self::require_tmux("agent")?;
        capture::capture_pane_with_cursor(&self.agent_pane_target(repo_root, wt), lines)
    }

    pub fn lazygit_output(&self, target: &str, lines: usize) -> Result<String> {
        let (repo_root, wt) = self.resolve_for_tmux(target)?;
        self.lazygit_output_for(&repo_root, &wt, lines)
    }

    pub fn lazygit_output_for(
        &self,
        repo_root: &Path,
        wt: &Worktree,
        lines: usize,
    ) -> Result<String> {
        Self::require_tmux("lazygit")?;
        let pane = self.lazygit_pane_target(repo_root, wt)?;
        capture::capture_pane_with_cursor(&pane, lines)
    }

    pub fn editor_output(&self, target: &str, lines: usize) -> Result<String> {
        let (repo_root, wt) = self.resolve_for_tmux(target)?;
        self.editor_output_for(&repo_root, &wt, lines)
    }

    pub fn editor_output_for(
        &self,
        repo_root: &Path,
        wt: &Worktree,
        lines: usize,
    ) -> Result<String> {
        Self::require_tmux("editor")?;
        capture::capture_pane_with_cursor(&self.editor_pane_target(repo_root, wt), lines)
    }

    pub fn send_agent_command(&self, target: &str, command: &str) -> Result<PathBuf> {
        let (repo_root, wt) = self.resolve_for_tmux(target)?;
        Self::require_tmux("agent")?;
        capture::send_pane_command(&self.agent_pane_target(&repo_root, &wt), command)?;
        Ok(wt.path)
    }

    pub fn send_agent_keys(&self, target: &str, keys: &[&str]) -> Result<PathBuf> {
        let (repo_root, wt) = self.resolve_for_tmux(target)?;
        Self::require_tmux("agent")?;
        capture::send_pane_keys(&self.agent_pane_target(&repo_root, &wt), keys)?;
        Ok(wt.path)
    }

    pub fn send_lazygit_command(&self, target: &str, command: &str) -> Result<PathBuf> {
        let (repo_root, wt) = self.resolve_for_tmux(target)?;
        Self::require_tmux("lazygit")?;
        let pane = self.lazygit_pane_target(&repo_root, &wt)?;
        capture::send_pane_command(&pane, command)?;
        Ok(wt.path)
    }

    pub fn send_lazygit_keys(&self, target: &str, keys: &[&str]) -> Result<PathBuf> {
        let (repo_root, wt) = self.resolve_for_tmux(target)?;
        Self::require_tmux("lazygit")?;
        let pane = self.lazygit_pane_target(&repo_root, &wt)?;
        capture::send_pane_keys(&pane, keys)?;
        Ok(wt.path)
    }

    pub fn send_editor_command(&self, target: &str, command: &str) -> Result<PathBuf> {
        let (repo_root, wt) = self.resolve_for_tmux(target)?;
        Self::require_tmux("editor")?;
        capture::send_pane_command(&self.editor_pane_target(&repo_root, &wt), command)?;
        Ok(wt.path)
    }

    pub fn send_editor_keys(&self, target: &str, keys: &[&str]) -> Result<PathBuf> {
        let (repo_root, wt) = self.resolve_for_tmux(target)?;
        Self::require_tmux("editor")?;
        capture::send_pane_keys(&self.editor_pane_target(&repo_root, &wt), keys)?;
        Ok(wt.path)
    }

    /// Activity counter for the agent pane; the dashboard skips captures
    /// when it has not moved.
    pub fn agent_pane_activity(&self, repo_root: &Path, wt: &Worktree) -> Result<i64> {
        Self::require_tmux("agent")?;
        capture::pane_activity(&self.agent_pane_target(repo_root, wt))
    }

    pub fn resize_agent_pane(
        &self,
        repo_root: &Path,
        wt: &Worktree,
        width: u16,
        height: u16,
    ) -> Result<()> {
        Self::require_tmux("agent")?;
        capture::resize_pane(&self.agent_pane_target(repo_root, wt), width, height)
    }

    /// Refine yes/no agent window state into the dashboard's four-way
    /// classification using the latest capture.
    pub fn agent_activity_for(&self, repo_root: &Path, wt: &Worktree, lines: usize) -> AgentActivity {
        if wt.agent_state != super::STATE_YES {
            return AgentActivity::Offline;
        }
        match self.agent_output_for(repo_root, wt, lines) {
            Ok(output) => {
                if output.trim().is_empty() {
                    AgentActivity::Busy
                } else if status::agent_ready_for_instruction(&output) {
                    AgentActivity::Ready
                } else {
                    AgentActivity::Busy
                }
            }
            Err(_) => AgentActivity::Running,
        }
    }
}
