use crate::utils::process;
use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

const SECTION_HEADER_COLOR: &str = "\x1b[36m";
const COLOR_RESET: &str = "\x1b[0m";

/// One changed file as reported by porcelain status: relative path plus
/// the two-character staged/worktree status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub path: String,
    pub status: String,
}

/// Any porcelain output, untracked files included, means dirty.
pub fn worktree_dirty(path: &Path) -> bool {
    match process::run_capture(
        Some(path),
        "git",
        &["status", "--porcelain", "--untracked-files=all"],
    ) {
        Ok(out) => !out.trim().is_empty(),
        Err(_) => false,
    }
}

fn section(buf: &mut String, title: &str, body: &str) {
    if body.trim().is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push_str("\n\n");
    }
    buf.push_str(SECTION_HEADER_COLOR);
    buf.push_str("# ");
    buf.push_str(title);
    buf.push_str(COLOR_RESET);
    buf.push('\n');
    buf.push_str(body);
}

/// Full diff snapshot: short status, staged patch, unstaged patch, each
/// under a cyan header and prettified through delta when available.
pub fn worktree_diff(path: &Path, width: usize) -> Result<String> {
    let status = process::run_capture(
        Some(path),
        "git",
        &["--no-pager", "status", "--short"],
    )?;
    let mut staged = process::run_capture(
        Some(path),
        "git",
        &["--no-pager", "diff", "--cached", "--no-color", "--no-ext-diff"],
    )?;
    let mut unstaged = process::run_capture(
        Some(path),
        "git",
        &["--no-pager", "diff", "--no-color", "--no-ext-diff"],
    )?;

    if process::command_exists("delta") {
        match render_with_delta(&staged, width) {
            Ok(rendered) => staged = rendered,
            Err(err) => log::debug!("delta render of staged diff failed: {err}"),
        }
        match render_with_delta(&unstaged, width) {
            Ok(rendered) => unstaged = rendered,
            Err(err) => log::debug!("delta render of unstaged diff failed: {err}"),
        }
    }

    let mut out = String::new();
    section(&mut out, "Status", &status);
    section(&mut out, "Staged", &staged);
    section(&mut out, "Unstaged", &unstaged);
    Ok(out.trim().to_string())
}

/// Parse porcelain status into a de-duplicated file list. Rename and copy
/// records resolve to the destination path.
pub fn worktree_diff_files(path: &Path) -> Result<Vec<DiffFile>> {
    let out = process::run_capture(
        Some(path),
        "git",
        &["--no-pager", "status", "--porcelain", "--untracked-files=all"],
    )?;

    let mut files = Vec::new();
    let mut seen = HashSet::new();
    for line in out.lines() {
        let line = line.trim_end_matches('\r');
        if line.len() < 3 {
            continue;
        }
        let status = &line[..2];
        let mut file = line[3..].trim();
        if let Some(idx) = file.rfind(" -> ") {
            file = file[idx + 4..].trim();
        }
        if file.is_empty() || !seen.insert(file.to_string()) {
            continue;
        }
        files.push(DiffFile {
            path: file.to_string(),
            status: status.to_string(),
        });
    }
    Ok(files)
}

/// The staged and worktree columns of a porcelain status code.
pub fn parse_porcelain_status(status: &str) -> (char, char) {
    let mut chars = status.chars();
    let stage = chars.next().unwrap_or(' ');
    let work = chars.next().unwrap_or(' ');
    (stage, work)
}

/// Patch for one file. Untracked files diff against /dev/null (exit code 1
/// is git's "files differ", not a failure); files with no textual patch get
/// an explanatory fallback line.
pub fn worktree_diff_for_file(path: &Path, file: &DiffFile, width: usize) -> Result<String> {
    let (stage_state, work_state) = parse_porcelain_status(&file.status);
    let status_label = file.status.trim();

    let mut staged = String::new();
    let mut unstaged = String::new();

    let is_untracked = stage_state == '?' && work_state == '?';
    if is_untracked {
        unstaged = process::run_capture_allow_exit_codes(
            Some(path),
            &[1],
            "git",
            &[
                "--no-pager",
                "diff",
                "--no-index",
                "--no-color",
                "--no-ext-diff",
                "--",
                "/dev/null",
                &file.path,
            ],
        )?;
    } else {
        if stage_state != ' ' && stage_state != '?' {
            staged = process::run_capture(
                Some(path),
                "git",
                &[
                    "--no-pager",
                    "diff",
                    "--cached",
                    "--no-color",
                    "--no-ext-diff",
                    "--",
                    &file.path,
                ],
            )?;
        }
        if work_state != ' ' && work_state != '?' {
            unstaged = process::run_capture(
                Some(path),
                "git",
                &[
                    "--no-pager",
                    "diff",
                    "--no-color",
                    "--no-ext-diff",
                    "--",
                    &file.path,
                ],
            )?;
        }
    }

    if process::command_exists("delta") {
        match render_with_delta(&staged, width) {
            Ok(rendered) => staged = rendered,
            Err(err) => log::debug!("delta render failed for {}: {err}", file.path),
        }
        match render_with_delta(&unstaged, width) {
            Ok(rendered) => unstaged = rendered,
            Err(err) => log::debug!("delta render failed for {}: {err}", file.path),
        }
    }

    let mut out = String::new();
    out.push_str(SECTION_HEADER_COLOR);
    out.push_str("# ");
    out.push_str(&file.path);
    out.push_str(COLOR_RESET);
    if !status_label.is_empty() {
        out.push_str(&format!(" {SECTION_HEADER_COLOR}({status_label}){COLOR_RESET}"));
    }
    out.push('\n');

    section(&mut out, "Staged", &staged);
    section(&mut out, "Unstaged", &unstaged);
    if staged.trim().is_empty() && unstaged.trim().is_empty() {
        out.push('\n');
        if is_untracked {
            out.push_str("(untracked file: stage it to view a patch)");
        } else {
            out.push_str("(no textual diff available for this file)");
        }
    }
    Ok(out.trim().to_string())
}

/// Pipe a diff through delta for syntax highlighting. Erase-line escapes in
/// delta's output garble text-view widgets, so they are scrubbed.
fn render_with_delta(diff: &str, width: usize) -> Result<String> {
    if diff.trim().is_empty() {
        return Ok(String::new());
    }
    let width_text;
    let mut args = vec!["--paging=never"];
    if width > 0 {
        width_text = width.to_string();
        args.push("--width");
        args.push(&width_text);
    }
    let out = process::run_with_stdin(None, diff.as_bytes(), "delta", &args)?;
    let rendered = String::from_utf8_lossy(&out)
        .replace("\x1b[0K", "")
        .replace("\x1b[K", "");
    Ok(rendered.trim_end_matches('\n').to_string())
}
