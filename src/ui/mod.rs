//! Interactive dashboard. The loop re-renders at a 150 ms cadence, drives
//! long operations on worker threads, and funnels every state mutation
//! through this thread; a failure anywhere lands in the footer status
//! line instead of tearing the UI down.

pub mod render;
pub mod state;
pub mod tasks;

use crate::domains::copier::CancelFlag;
use crate::domains::sessions::status::{agent_ready_for_instruction, strip_ansi};
use crate::manager::agents::AgentActivity;
use crate::manager::{
    AgentOptions, GoOptions, LaunchOptions, Manager, NewOptions, RemoveOptions,
};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use state::{DetailTab, Mode, UiState, DETAIL_CAPTURE_LINES, TICK_INTERVAL};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tasks::TaskEvent;

const LIST_REFRESH_INTERVAL: Duration = Duration::from_millis(1500);

pub fn run(mgr: Manager) -> i32 {
    let repo_root = match mgr.require_repo() {
        Ok(root) => root,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };
    let repo_name = mgr.repo_name(&repo_root);

    match run_terminal(mgr, repo_root, repo_name) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn run_terminal(mgr: Manager, repo_root: PathBuf, repo_name: String) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), EnterAlternateScreen)?;

    // The panic hook restores the terminal before the default hook prints,
    // so a renderer bug never leaves the shell in raw mode.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = crossterm::execute!(std::io::stdout(), LeaveAlternateScreen);
        original_hook(info);
    }));

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;
    let result = event_loop(&mut terminal, mgr, repo_root, repo_name);

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    mgr: Manager,
    repo_root: PathBuf,
    repo_name: String,
) -> Result<()> {
    let mut ui = UiState::new();
    let (tx, rx): (Sender<TaskEvent>, Receiver<TaskEvent>) = mpsc::channel();
    tasks::spawn_update_check(mgr.clone(), crate::cli::VERSION.to_string(), tx.clone());

    refresh_all(&mgr, &mut ui);
    let mut last_list_refresh = Instant::now();

    loop {
        while let Ok(event) = rx.try_recv() {
            handle_task_event(&mgr, &mut ui, event);
            last_list_refresh = Instant::now();
        }

        refresh_detail(&mgr, &repo_root, &mut ui);

        if let Ok(size) = terminal.size() {
            ui.last_size = (size.width, size.height);
        }
        terminal.draw(|frame| render::draw(frame, &ui, &repo_name))?;

        if event::poll(TICK_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && handle_key(&mgr, &mut ui, &tx, key)
                {
                    return Ok(());
                }
            }
        }

        if last_list_refresh.elapsed() >= LIST_REFRESH_INTERVAL {
            refresh_list(&mgr, &mut ui);
            last_list_refresh = Instant::now();
        }
    }
}

fn refresh_all(mgr: &Manager, ui: &mut UiState) {
    ui.clear_caches();
    refresh_list(mgr, ui);
}

fn refresh_list(mgr: &Manager, ui: &mut UiState) {
    match mgr.list_worktrees() {
        Ok(items) => {
            ui.items = items;
            if ui.selected >= ui.items.len() {
                ui.selected = ui.items.len().saturating_sub(1);
            }
        }
        Err(err) => ui.set_error(format!("refresh failed: {err}")),
    }
}

fn select_path(ui: &mut UiState, path: &Path) {
    if let Some(idx) = ui.items.iter().position(|item| item.path == path) {
        ui.selected = idx;
        ui.diff_selected = 0;
    }
}

fn refresh_detail(mgr: &Manager, repo_root: &Path, ui: &mut UiState) {
    let Some(item) = ui.selected_item().cloned() else {
        ui.detail_text = "No worktrees. Press n to create one.".to_string();
        ui.diff_files.clear();
        ui.diff_patch.clear();
        return;
    };

    match ui.detail_tab {
        DetailTab::Agent => refresh_agent_detail(mgr, repo_root, ui, &item),
        DetailTab::Diff => refresh_diff_detail(mgr, ui, &item),
    }
}

fn refresh_agent_detail(
    mgr: &Manager,
    repo_root: &Path,
    ui: &mut UiState,
    item: &crate::manager::Worktree,
) {
    if item.agent_state != "yes" {
        ui.agent_states
            .insert(item.path.clone(), AgentActivity::Offline);
        ui.detail_text = "Agent pane is not available for this worktree.\n\n\
             Press a to start the agent window.\n\
             A tmux session will open with your configured session tools."
            .to_string();
        return;
    }

    let pane_target = mgr.agent_pane_target(repo_root, item);

    // Keep the agent pane sized to the visible detail area so captures
    // wrap the way the screen does. The memo avoids re-issuing the same
    // resize every tick.
    let (cols, rows) = ui.last_size;
    if cols > 6 && rows > 12 {
        let width = cols.saturating_sub(2);
        let height = ((rows as u32) * 45 / 100).max(10) as u16;
        if ui.note_pane_size(&pane_target, width, height) {
            let _ = mgr.resize_agent_pane(repo_root, item, width, height);
        }
    }

    let output = match mgr.agent_pane_activity(repo_root, item) {
        Ok(counter) => {
            if let Some(cached) = ui.cached_agent_output(&pane_target, counter) {
                Some(cached.to_string())
            } else {
                match mgr.agent_output_for(repo_root, item, DETAIL_CAPTURE_LINES) {
                    Ok(output) => {
                        ui.store_agent_output(pane_target.clone(), counter, output.clone());
                        Some(output)
                    }
                    Err(_) => None,
                }
            }
        }
        Err(_) => mgr
            .agent_output_for(repo_root, item, DETAIL_CAPTURE_LINES)
            .ok(),
    };

    match output {
        Some(output) => {
            let previous = ui.agent_states.get(&item.path).copied();
            let next = if output.trim().is_empty() {
                AgentActivity::Busy
            } else if agent_ready_for_instruction(&output) {
                AgentActivity::Ready
            } else {
                AgentActivity::Busy
            };
            if next == AgentActivity::Ready && previous != Some(AgentActivity::Ready) {
                let branch = item.branch_or_name();
                ui.set_info(format!("agent ready for input: {branch}"));
            }
            ui.agent_states.insert(item.path.clone(), next);
            ui.detail_text = if output.trim().is_empty() {
                "(agent pane is running, but no output yet)".to_string()
            } else {
                strip_ansi(&output)
            };
        }
        None => {
            ui.agent_states
                .insert(item.path.clone(), AgentActivity::Running);
            ui.detail_text = "Unable to read agent output.".to_string();
        }
    }
}

fn refresh_diff_detail(mgr: &Manager, ui: &mut UiState, item: &crate::manager::Worktree) {
    let files = match ui.cached_diff_files(&item.path) {
        Some(cached) => cached.to_vec(),
        None => match mgr.worktree_diff_files(&item.path) {
            Ok(files) => {
                ui.store_diff_files(item.path.clone(), files.clone());
                files
            }
            Err(err) => {
                ui.detail_text = format!("Unable to read diff: {err}");
                return;
            }
        },
    };
    ui.diff_files = files;
    if ui.diff_selected >= ui.diff_files.len() {
        ui.diff_selected = ui.diff_files.len().saturating_sub(1);
    }

    let Some(file) = ui.diff_files.get(ui.diff_selected).cloned() else {
        ui.diff_patch = "worktree is clean".to_string();
        return;
    };

    let width = ui.last_size.0.saturating_sub(44) as usize;
    let key = UiState::diff_patch_key(&item.path, &file, width);
    let patch = match ui.cached_diff_patch(&key) {
        Some(cached) => cached.to_string(),
        None => match mgr.worktree_diff_for_file(&item.path, &file, width) {
            Ok(patch) => {
                ui.store_diff_patch(key, patch.clone());
                patch
            }
            Err(err) => format!("Unable to render diff: {err}"),
        },
    };
    ui.diff_patch = strip_ansi(&patch);
}

fn handle_task_event(mgr: &Manager, ui: &mut UiState, event: TaskEvent) {
    match event {
        TaskEvent::CopyProgress(p) => {
            ui.busy_label = Some(tasks::copy_progress_label(&p));
        }
        TaskEvent::DeleteProgress(p) => {
            ui.busy_label = Some(tasks::delete_progress_label(&p));
        }
        TaskEvent::CreateDone(Ok((branch, path))) => {
            ui.busy_label = None;
            refresh_all(mgr, ui);
            select_path(ui, &path);
            if mgr.cfg.auto_launch {
                let opts = LaunchOptions {
                    target: path.display().to_string(),
                    no_attach: true,
                };
                if let Err(err) = mgr.launch(&opts) {
                    ui.set_warn(format!("created, but launch failed: {err}"));
                    return;
                }
            }
            if mgr.cfg.auto_start_agent {
                let opts = AgentOptions {
                    target: path.display().to_string(),
                    attach: false,
                };
                if let Err(err) = mgr.start_agent(&opts) {
                    ui.set_warn(format!("created, but agent did not start: {err}"));
                    return;
                }
            }
            refresh_list(mgr, ui);
            ui.set_info(format!("created: {branch}"));
        }
        TaskEvent::CreateDone(Err(err)) => {
            ui.busy_label = None;
            ui.set_error(format!("create failed: {err}"));
        }
        TaskEvent::RemoveDone(Ok((path, warnings))) => {
            ui.busy_label = None;
            refresh_all(mgr, ui);
            match warnings.first() {
                Some(warning) => ui.set_warn(format!("removed with warning: {warning}")),
                None => ui.set_info(format!("removed: {}", path.display())),
            }
        }
        TaskEvent::RemoveDone(Err(err)) => {
            ui.busy_label = None;
            ui.set_error(format!("remove failed: {err}"));
        }
        TaskEvent::UpdateAvailable(latest) => {
            ui.set_info(format!("update available: {latest}"));
        }
    }
}

/// Returns true when the loop should exit.
fn handle_key(mgr: &Manager, ui: &mut UiState, tx: &Sender<TaskEvent>, key: KeyEvent) -> bool {
    match ui.mode.clone() {
        Mode::Normal => handle_normal_key(mgr, ui, tx, key),
        Mode::ConfirmRemove => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    ui.mode = Mode::Normal;
                    if let Some(item) = ui.selected_item().cloned() {
                        let opts = RemoveOptions {
                            target: item.path.display().to_string(),
                            force: item.dirty,
                            delete_branch: false,
                        };
                        ui.busy_label = Some("Removing worktree...".to_string());
                        tasks::spawn_remove(mgr.clone(), opts, tx.clone(), CancelFlag::new());
                    }
                }
                KeyCode::Char('n') | KeyCode::Esc => {
                    ui.mode = Mode::Normal;
                }
                _ => {}
            }
            false
        }
        Mode::NewBranchType => {
            match key.code {
                KeyCode::Esc => {
                    ui.mode = Mode::Normal;
                }
                KeyCode::Enter => {
                    if !ui.new_branch_type.trim().is_empty() {
                        ui.mode = Mode::NewBranchName;
                    }
                }
                KeyCode::Backspace => {
                    ui.new_branch_type.pop();
                }
                KeyCode::Char(c) => ui.new_branch_type.push(c),
                _ => {}
            }
            false
        }
        Mode::NewBranchName => {
            match key.code {
                KeyCode::Esc => {
                    ui.mode = Mode::NewBranchType;
                }
                KeyCode::Enter => {
                    if !ui.new_branch_name.trim().is_empty() {
                        let opts = NewOptions {
                            branch_type: ui.new_branch_type.trim().to_string(),
                            name: ui.new_branch_name.trim().to_string(),
                            ..NewOptions::default()
                        };
                        ui.mode = Mode::Normal;
                        ui.new_branch_type.clear();
                        ui.new_branch_name.clear();
                        ui.busy_label = Some("Creating worktree...".to_string());
                        tasks::spawn_create(mgr.clone(), opts, tx.clone(), CancelFlag::new());
                    }
                }
                KeyCode::Backspace => {
                    ui.new_branch_name.pop();
                }
                KeyCode::Char(c) => ui.new_branch_name.push(c),
                _ => {}
            }
            false
        }
    }
}

fn handle_normal_key(
    mgr: &Manager,
    ui: &mut UiState,
    _tx: &Sender<TaskEvent>,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Char('j') | KeyCode::Down => ui.move_selection(1),
        KeyCode::Char('k') | KeyCode::Up => ui.move_selection(-1),
        KeyCode::Left => {
            if ui.detail_tab == DetailTab::Diff && ui.diff_selected > 0 {
                ui.diff_selected -= 1;
            }
        }
        KeyCode::Right => {
            if ui.detail_tab == DetailTab::Diff
                && ui.diff_selected + 1 < ui.diff_files.len()
            {
                ui.diff_selected += 1;
            }
        }
        KeyCode::Tab => {
            ui.detail_tab = match ui.detail_tab {
                DetailTab::Agent => DetailTab::Diff,
                DetailTab::Diff => DetailTab::Agent,
            };
        }
        KeyCode::Char('r') => {
            refresh_all(mgr, ui);
            ui.set_info("refreshed");
        }
        KeyCode::Char('g') | KeyCode::Enter => {
            if let Some(item) = ui.selected_item().cloned() {
                let opts = GoOptions {
                    target: item.path.display().to_string(),
                    launch: true,
                    attach: false,
                };
                match mgr.go(&opts) {
                    Ok(path) => ui.set_info(format!("session ready: {}", path.display())),
                    Err(err) => ui.set_error(format!("go failed: {err}")),
                }
            }
        }
        KeyCode::Char('l') => {
            if let Some(item) = ui.selected_item().cloned() {
                let opts = LaunchOptions {
                    target: item.path.display().to_string(),
                    no_attach: true,
                };
                match mgr.launch(&opts) {
                    Ok(path) => ui.set_info(format!("launched: {}", path.display())),
                    Err(err) => ui.set_error(format!("launch failed: {err}")),
                }
            }
        }
        KeyCode::Char('a') => {
            if let Some(item) = ui.selected_item().cloned() {
                let opts = AgentOptions {
                    target: item.path.display().to_string(),
                    attach: false,
                };
                match mgr.start_agent(&opts) {
                    Ok((path, true)) => {
                        ui.set_info(format!("agent already running: {}", path.display()))
                    }
                    Ok((path, false)) => {
                        ui.set_info(format!("agent started: {}", path.display()))
                    }
                    Err(err) => ui.set_error(format!("agent start failed: {err}")),
                }
                refresh_list(mgr, ui);
            }
        }
        KeyCode::Char('s') => {
            if let Some(item) = ui.selected_item().cloned() {
                match mgr.stop_agent(&item.path.display().to_string()) {
                    Ok((path, true)) => ui.set_info(format!("agent stopped: {}", path.display())),
                    Ok((path, false)) => {
                        ui.set_warn(format!("agent not running: {}", path.display()))
                    }
                    Err(err) => ui.set_error(format!("agent stop failed: {err}")),
                }
                refresh_list(mgr, ui);
            }
        }
        KeyCode::Char('d') => {
            if let Some(item) = ui.selected_item().cloned() {
                match mgr.detach(&item.path.display().to_string()) {
                    Ok((path, true)) => ui.set_info(format!("detached {}", path.display())),
                    Ok((path, false)) => {
                        ui.set_warn(format!("session not running: {}", path.display()))
                    }
                    Err(err) => ui.set_error(format!("detach failed: {err}")),
                }
                refresh_list(mgr, ui);
            }
        }
        KeyCode::Char('n') => {
            if ui.busy_label.is_some() {
                ui.set_warn("another operation is still running");
            } else {
                ui.new_branch_type.clear();
                ui.new_branch_name.clear();
                ui.mode = Mode::NewBranchType;
            }
        }
        KeyCode::Char('x') => {
            if ui.busy_label.is_some() {
                ui.set_warn("another operation is still running");
            } else if ui.selected_item().is_some() {
                ui.mode = Mode::ConfirmRemove;
            }
        }
        _ => {}
    }
    false
}
