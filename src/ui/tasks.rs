//! Worker threads for the long-running operations. The UI thread owns all
//! state; workers only report over the channel and the loop drains it on
//! each tick, so a slow copy or removal never blocks rendering.

use crate::domains::copier::{CancelFlag, CopyProgress, DeleteProgress};
use crate::manager::{Manager, NewOptions, RemoveOptions};
use crate::update;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

#[derive(Debug)]
pub enum TaskEvent {
    CopyProgress(CopyProgress),
    DeleteProgress(DeleteProgress),
    CreateDone(Result<(String, PathBuf), String>),
    RemoveDone(Result<(PathBuf, Vec<String>), String>),
    UpdateAvailable(String),
}

pub fn spawn_create(mgr: Manager, opts: NewOptions, tx: Sender<TaskEvent>, cancel: CancelFlag) {
    std::thread::spawn(move || {
        let progress_tx = tx.clone();
        let mut on_progress = move |p: CopyProgress| {
            let _ = progress_tx.send(TaskEvent::CopyProgress(p));
        };
        let result = mgr
            .new_worktree(&opts, Some(&mut on_progress), &cancel)
            .map_err(|err| err.to_string());
        let _ = tx.send(TaskEvent::CreateDone(result));
    });
}

pub fn spawn_remove(
    mgr: Manager,
    opts: RemoveOptions,
    tx: Sender<TaskEvent>,
    cancel: CancelFlag,
) {
    std::thread::spawn(move || {
        let progress_tx = tx.clone();
        let mut on_progress = move |p: DeleteProgress| {
            let _ = progress_tx.send(TaskEvent::DeleteProgress(p));
        };
        let result = mgr
            .remove(&opts, Some(&mut on_progress), &cancel)
            .map_err(|err| err.to_string());
        let _ = tx.send(TaskEvent::RemoveDone(result));
    });
}

pub fn spawn_update_check(mgr: Manager, version: String, tx: Sender<TaskEvent>) {
    std::thread::spawn(move || {
        if let Some(latest) = update::check_for_update(&version, &mgr.cfg) {
            let _ = tx.send(TaskEvent::UpdateAvailable(latest));
        }
    });
}

pub fn format_byte_size(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn copy_progress_label(p: &CopyProgress) -> String {
    use crate::domains::copier::Phase;
    match p.phase {
        Phase::Scan => {
            if p.total_files == 0 {
                "Scanning untracked files...".to_string()
            } else {
                format!(
                    "Scanning untracked files... {} files, {} total",
                    p.total_files,
                    format_byte_size(p.total_bytes)
                )
            }
        }
        Phase::Act => format!(
            "Copying untracked files... {}/{} files • {}/{}",
            p.copied_files,
            p.total_files,
            format_byte_size(p.copied_bytes),
            format_byte_size(p.total_bytes)
        ),
    }
}

pub fn delete_progress_label(p: &DeleteProgress) -> String {
    use crate::domains::copier::Phase;
    match p.phase {
        Phase::Scan => {
            if p.total_files == 0 {
                "Scanning worktree files...".to_string()
            } else {
                format!(
                    "Scanning worktree files... {} files, {} total",
                    p.total_files,
                    format_byte_size(p.total_bytes)
                )
            }
        }
        Phase::Act => format!(
            "Deleting files... {}/{} files • {}/{}",
            p.deleted_files,
            p.total_files,
            format_byte_size(p.deleted_bytes),
            format_byte_size(p.total_bytes)
        ),
    }
}
