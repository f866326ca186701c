//! Dashboard state and its transient caches. All caches are owned by the
//! UI thread and keyed by worktree path or pane target; entries expire by
//! TTL or are discarded wholesale when a map outgrows its cap, and a
//! manual refresh clears everything.

use crate::domains::git::DiffFile;
use crate::manager::agents::AgentActivity;
use crate::manager::Worktree;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub const TICK_INTERVAL: Duration = Duration::from_millis(150);
pub const DETAIL_CAPTURE_LINES: usize = 60;
pub const DIFF_FILES_CACHE_TTL: Duration = Duration::from_millis(900);
pub const DIFF_PATCH_CACHE_TTL: Duration = Duration::from_secs(2);
pub const DIFF_PATCH_CACHE_CAP: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailTab {
    Agent,
    Diff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}

/// Modal-ish input modes; everything else is the plain list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Normal,
    ConfirmRemove,
    NewBranchType,
    NewBranchName,
}

#[derive(Debug, Clone)]
pub struct StatusLine {
    pub level: StatusLevel,
    pub message: String,
}

struct DiffFilesEntry {
    files: Vec<DiffFile>,
    fetched_at: Instant,
}

struct DiffPatchEntry {
    text: String,
    fetched_at: Instant,
}

pub struct UiState {
    pub items: Vec<Worktree>,
    pub selected: usize,
    pub detail_tab: DetailTab,
    pub diff_selected: usize,
    pub mode: Mode,
    pub status: Option<StatusLine>,
    pub busy_label: Option<String>,
    pub new_branch_type: String,
    pub new_branch_name: String,
    pub agent_states: HashMap<PathBuf, AgentActivity>,
    pub detail_text: String,
    pub diff_files: Vec<DiffFile>,
    pub diff_patch: String,
    pub last_size: (u16, u16),

    diff_files_cache: HashMap<PathBuf, DiffFilesEntry>,
    diff_patch_cache: HashMap<String, DiffPatchEntry>,
    agent_output_cache: HashMap<String, (i64, String)>,
    pane_size_memo: HashMap<String, (u16, u16)>,
}

impl UiState {
    pub fn new() -> Self {
        UiState {
            items: Vec::new(),
            selected: 0,
            detail_tab: DetailTab::Agent,
            diff_selected: 0,
            mode: Mode::Normal,
            status: None,
            busy_label: None,
            new_branch_type: String::new(),
            new_branch_name: String::new(),
            agent_states: HashMap::new(),
            detail_text: String::new(),
            diff_files: Vec::new(),
            diff_patch: String::new(),
            last_size: (0, 0),
            diff_files_cache: HashMap::new(),
            diff_patch_cache: HashMap::new(),
            agent_output_cache: HashMap::new(),
            pane_size_memo: HashMap::new(),
        }
    }

    pub fn selected_item(&self) -> Option<&Worktree> {
        self.items.get(self.selected)
    }

    pub fn move_selection(&mut self, delta: i64) {
        if self.items.is_empty() {
            self.selected = 0;
            return;
        }
        let len = self.items.len() as i64;
        let next = (self.selected as i64 + delta).clamp(0, len - 1);
        self.selected = next as usize;
        self.diff_selected = 0;
    }

    pub fn set_status(&mut self, level: StatusLevel, message: impl Into<String>) {
        self.status = Some(StatusLine {
            level,
            message: message.into(),
        });
    }

    pub fn set_info(&mut self, message: impl Into<String>) {
        self.set_status(StatusLevel::Info, message);
    }

    pub fn set_warn(&mut self, message: impl Into<String>) {
        self.set_status(StatusLevel::Warn, message);
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.set_status(StatusLevel::Error, message);
    }

    /// Wholesale cache invalidation on refresh.
    pub fn clear_caches(&mut self) {
        self.diff_files_cache.clear();
        self.diff_patch_cache.clear();
        self.agent_output_cache.clear();
        self.agent_states.clear();
    }

    pub fn cached_diff_files(&self, path: &PathBuf) -> Option<&[DiffFile]> {
        let entry = self.diff_files_cache.get(path)?;
        if entry.fetched_at.elapsed() > DIFF_FILES_CACHE_TTL {
            return None;
        }
        Some(&entry.files)
    }

    pub fn store_diff_files(&mut self, path: PathBuf, files: Vec<DiffFile>) {
        self.diff_files_cache.insert(
            path,
            DiffFilesEntry {
                files,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn diff_patch_key(path: &PathBuf, file: &DiffFile, width: usize) -> String {
        format!("{}|{}|{}|{width}", path.display(), file.path, file.status)
    }

    pub fn cached_diff_patch(&self, key: &str) -> Option<&str> {
        let entry = self.diff_patch_cache.get(key)?;
        if entry.fetched_at.elapsed() > DIFF_PATCH_CACHE_TTL {
            return None;
        }
        Some(&entry.text)
    }

    pub fn store_diff_patch(&mut self, key: String, text: String) {
        // Past the cap the whole map goes; simpler than LRU and the TTL
        // repopulates quickly.
        if self.diff_patch_cache.len() >= DIFF_PATCH_CACHE_CAP {
            self.diff_patch_cache.clear();
        }
        self.diff_patch_cache.insert(
            key,
            DiffPatchEntry {
                text,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Return the cached capture when the pane's activity counter has not
    /// moved since it was taken.
    pub fn cached_agent_output(&self, pane_target: &str, activity: i64) -> Option<&str> {
        match self.agent_output_cache.get(pane_target) {
            Some((cached_activity, text)) if *cached_activity == activity => Some(text),
            _ => None,
        }
    }

    pub fn store_agent_output(&mut self, pane_target: String, activity: i64, text: String) {
        self.agent_output_cache.insert(pane_target, (activity, text));
    }

    /// True when the size actually changed; the memo keeps the dashboard
    /// from re-issuing identical resize calls every tick.
    pub fn note_pane_size(&mut self, pane_target: &str, width: u16, height: u16) -> bool {
        match self.pane_size_memo.get(pane_target) {
            Some(&(w, h)) if w == width && h == height => false,
            _ => {
                self.pane_size_memo
                    .insert(pane_target.to_string(), (width, height));
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff_file() -> DiffFile {
        DiffFile {
            path: "src/lib.rs".to_string(),
            status: " M".to_string(),
        }
    }

    #[test]
    fn selection_clamps_to_bounds() {
        let mut state = UiState::new();
        state.move_selection(1);
        assert_eq!(state.selected, 0);

        state.items = vec![
            Worktree {
                path: PathBuf::from("/a"),
                branch: "a".into(),
                current: true,
                dirty: false,
                tmux_state: "n/a".into(),
                agent_state: "n/a".into(),
            },
            Worktree {
                path: PathBuf::from("/b"),
                branch: "b".into(),
                current: false,
                dirty: false,
                tmux_state: "n/a".into(),
                agent_state: "n/a".into(),
            },
        ];
        state.move_selection(5);
        assert_eq!(state.selected, 1);
        state.move_selection(-5);
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn diff_patch_cache_discards_wholesale_past_cap() {
        let mut state = UiState::new();
        for i in 0..DIFF_PATCH_CACHE_CAP {
            state.store_diff_patch(format!("key-{i}"), "patch".to_string());
        }
        // The next insert clears everything first.
        state.store_diff_patch("overflow".to_string(), "patch".to_string());
        assert!(state.cached_diff_patch("key-0").is_none());
        assert_eq!(state.cached_diff_patch("overflow"), Some("patch"));
    }

    #[test]
    fn agent_output_cache_is_keyed_by_activity() {
        let mut state = UiState::new();
        state.store_agent_output("s:w.0".to_string(), 7, "output".to_string());
        assert_eq!(state.cached_agent_output("s:w.0", 7), Some("output"));
        assert_eq!(state.cached_agent_output("s:w.0", 8), None);
        assert_eq!(state.cached_agent_output("other", 7), None);
    }

    #[test]
    fn pane_size_memo_suppresses_repeats() {
        let mut state = UiState::new();
        assert!(state.note_pane_size("s:w.0", 80, 24));
        assert!(!state.note_pane_size("s:w.0", 80, 24));
        assert!(state.note_pane_size("s:w.0", 100, 24));
    }

    #[test]
    fn patch_key_includes_width_and_status() {
        let key_a = UiState::diff_patch_key(&PathBuf::from("/wt"), &diff_file(), 80);
        let key_b = UiState::diff_patch_key(&PathBuf::from("/wt"), &diff_file(), 120);
        assert_ne!(key_a, key_b);
    }
}
