//! Pane introspection: capture with a synthetic cursor overlay, key
//! injection, resizing, and activity counters.

use crate::utils::process;
use anyhow::{anyhow, Result};
use unicode_width::UnicodeWidthChar;

const CURSOR_GLYPH: &str = "█";
const MAX_CAPTURE_LINES: usize = 120;

/// Capture a pane's scrollback plus visible screen with escapes preserved.
/// When tmux reports a visible cursor, a solid block glyph is overlaid at
/// the cursor cell so downstream text rendering shows where input goes.
pub fn capture_pane_with_cursor(pane_target: &str, lines: usize) -> Result<String> {
    let mut cursor_visible = false;
    let mut cursor_x = 0usize;
    let mut cursor_y = 0usize;
    let mut pane_height = if lines == 0 { MAX_CAPTURE_LINES } else { lines };

    if let Ok(meta) = process::run_capture(
        None,
        "tmux",
        &[
            "display-message",
            "-p",
            "-t",
            pane_target,
            "#{cursor_flag} #{cursor_x} #{cursor_y} #{pane_height}",
        ],
    ) {
        let parts: Vec<&str> = meta.split_whitespace().collect();
        if parts.len() == 4 {
            let px = parts[1].parse::<usize>();
            let py = parts[2].parse::<usize>();
            let ph = parts[3].parse::<usize>();
            if let (Ok(px), Ok(py), Ok(ph)) = (px, py, ph) {
                if ph > 0 {
                    cursor_visible = parts[0] == "1";
                    cursor_x = px;
                    cursor_y = py;
                    pane_height = ph;
                }
            }
        }
    }

    let capture_lines = lines.max(pane_height).min(MAX_CAPTURE_LINES);
    let out = process::run_capture(
        None,
        "tmux",
        &[
            "capture-pane",
            "-p",
            "-N",
            "-e",
            "-t",
            pane_target,
            "-S",
            &format!("-{capture_lines}"),
        ],
    )?;

    let mut rows: Vec<String> = out.split('\n').map(str::to_string).collect();
    if rows.last().map(|r| r.is_empty()).unwrap_or(false) {
        rows.pop();
    }
    if rows.is_empty() {
        rows.push(String::new());
    }
    if !cursor_visible {
        return Ok(rows.join("\n"));
    }

    let screen_start = rows.len().saturating_sub(pane_height);
    let target_row = screen_start + cursor_y;
    if target_row >= rows.len() {
        return Ok(rows.join("\n"));
    }
    rows[target_row] = overlay_cursor_in_ansi_line(&rows[target_row], cursor_x);
    Ok(rows.join("\n"))
}

/// Insert the cursor glyph at a visible column, stepping over escape
/// sequences and accounting for tabs and double-width characters so the
/// overlay lands on the cell the terminal would show.
pub fn overlay_cursor_in_ansi_line(line: &str, cursor_col: usize) -> String {
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len() + 8);
    let mut vis_cols = 0usize;
    let mut i = 0usize;
    let mut inserted = false;

    while i < bytes.len() {
        if bytes[i] == 0x1b {
            if let Some(next) = consume_ansi_escape(line, i) {
                out.push_str(&line[i..next]);
                i = next;
                continue;
            }
        }

        let ch = match line[i..].chars().next() {
            Some(ch) => ch,
            None => break,
        };
        let size = ch.len_utf8();
        let width = cell_width(ch, vis_cols);

        if !inserted && width > 0 && cursor_col >= vis_cols && cursor_col < vis_cols + width {
            out.push_str(CURSOR_GLYPH);
            for _ in 1..width {
                out.push(' ');
            }
            inserted = true;
        } else {
            out.push_str(&line[i..i + size]);
        }
        vis_cols += width;
        i += size;
    }

    if !inserted {
        while vis_cols < cursor_col {
            out.push(' ');
            vis_cols += 1;
        }
        out.push_str(CURSOR_GLYPH);
    }
    out
}

fn cell_width(ch: char, current_col: usize) -> usize {
    if ch == '\t' {
        let tab = 8 - (current_col % 8);
        if tab == 0 {
            return 8;
        }
        return tab;
    }
    if ch == char::REPLACEMENT_CHARACTER {
        return 1;
    }
    if (ch as u32) < 0x20 || ch == '\u{7f}' {
        return 1;
    }
    ch.width().unwrap_or(0)
}

/// Walk past one escape sequence starting at `start` (which must index an
/// ESC byte). Handles CSI, OSC, DCS/SOS/PM/APC string sequences, and
/// two-byte escapes; returns the index just past the sequence.
pub fn consume_ansi_escape(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    if start >= bytes.len() || bytes[start] != 0x1b || start + 1 >= bytes.len() {
        return None;
    }

    match bytes[start + 1] {
        b'[' => {
            let mut i = start + 2;
            while i < bytes.len() {
                if (0x40..=0x7e).contains(&bytes[i]) {
                    return Some(i + 1);
                }
                i += 1;
            }
            Some(bytes.len())
        }
        b']' => {
            let mut i = start + 2;
            while i < bytes.len() {
                if bytes[i] == 0x07 {
                    return Some(i + 1);
                }
                if bytes[i] == 0x1b && i + 1 < bytes.len() && bytes[i + 1] == b'\\' {
                    return Some(i + 2);
                }
                i += 1;
            }
            Some(bytes.len())
        }
        b'P' | b'X' | b'^' | b'_' => {
            let mut i = start + 2;
            while i < bytes.len() {
                if bytes[i] == 0x1b && i + 1 < bytes.len() && bytes[i + 1] == b'\\' {
                    return Some(i + 2);
                }
                i += 1;
            }
            Some(bytes.len())
        }
        _ => {
            let mut i = start + 1;
            while i < bytes.len() && (0x20..=0x2f).contains(&bytes[i]) {
                i += 1;
            }
            if i < bytes.len() {
                Some(i + 1)
            } else {
                Some(bytes.len())
            }
        }
    }
}

pub fn send_pane_keys(pane_target: &str, keys: &[&str]) -> Result<()> {
    if keys.is_empty() {
        return Err(anyhow!("keys cannot be empty"));
    }
    let mut args = vec!["send-keys", "-t", pane_target];
    args.extend_from_slice(keys);
    process::run_quiet(None, "tmux", &args)
}

/// Type a literal line and press Enter. The text goes through `-l` so tmux
/// does not interpret it as key names; the carriage return is a separate
/// keysym send.
pub fn send_pane_command(pane_target: &str, command: &str) -> Result<()> {
    let command = command.trim();
    if command.is_empty() {
        return Err(anyhow!("command cannot be empty"));
    }
    send_pane_keys(pane_target, &["-l", command])?;
    send_pane_keys(pane_target, &["C-m"])
}

pub fn resize_pane(pane_target: &str, width: u16, height: u16) -> Result<()> {
    if pane_target.trim().is_empty() {
        return Err(anyhow!("pane target cannot be empty"));
    }
    if width == 0 || height == 0 {
        return Err(anyhow!("pane size must be positive"));
    }
    process::run_quiet(
        None,
        "tmux",
        &[
            "resize-pane",
            "-t",
            pane_target,
            "-x",
            &width.to_string(),
            "-y",
            &height.to_string(),
        ],
    )
}

/// Monotonic-ish activity counter for a pane's window. The dashboard skips
/// re-capturing panes whose counter has not moved.
pub fn pane_activity(pane_target: &str) -> Result<i64> {
    let out = process::run_capture(
        None,
        "tmux",
        &[
            "display-message",
            "-p",
            "-t",
            pane_target,
            "#{window_activity}",
        ],
    )?;
    out.trim()
        .parse::<i64>()
        .map_err(|err| anyhow!("unexpected activity counter {out:?}: {err}"))
}

/// Locate a pane by the command it is currently running, regardless of its
/// index within the window.
pub fn pane_index_by_command(
    session: &str,
    window: &str,
    pane_command: &str,
) -> Result<Option<String>> {
    let target = format!("{session}:{window}");
    let out = process::run_capture(
        None,
        "tmux",
        &[
            "list-panes",
            "-t",
            &target,
            "-F",
            "#{pane_index}\t#{pane_current_command}",
        ],
    )?;
    for line in out.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((index, command)) = line.split_once('\t') {
            if command.trim() == pane_command {
                return Ok(Some(index.trim().to_string()));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_lands_on_plain_column() {
        assert_eq!(overlay_cursor_in_ansi_line("hello", 1), "h█llo");
        assert_eq!(overlay_cursor_in_ansi_line("hello", 0), "█ello");
    }

    #[test]
    fn overlay_pads_past_end_of_line() {
        assert_eq!(overlay_cursor_in_ansi_line("ab", 5), "ab   █");
        assert_eq!(overlay_cursor_in_ansi_line("", 3), "   █");
    }

    #[test]
    fn overlay_skips_csi_sequences() {
        let line = "\x1b[31mred\x1b[0m";
        let out = overlay_cursor_in_ansi_line(line, 1);
        assert_eq!(out, "\x1b[31mr█d\x1b[0m");
    }

    #[test]
    fn overlay_respects_wide_characters() {
        // "日" is two cells wide; the cursor in either cell replaces it
        // with the glyph plus a pad space.
        let out = overlay_cursor_in_ansi_line("日本", 1);
        assert_eq!(out, "█ 本");
        let out = overlay_cursor_in_ansi_line("日本", 2);
        assert_eq!(out, "日█ ");
    }

    #[test]
    fn overlay_expands_tabs() {
        // Tab advances to column 8; the cursor at column 8 hits 'x'.
        let out = overlay_cursor_in_ansi_line("\tx", 8);
        assert_eq!(out, "\t█");
    }

    #[test]
    fn escape_consumption_covers_sequence_kinds() {
        // CSI
        let s = "\x1b[31mx";
        assert_eq!(consume_ansi_escape(s, 0), Some(5));
        // OSC terminated by BEL
        let s = "\x1b]0;title\x07x";
        assert_eq!(consume_ansi_escape(s, 0), Some(10));
        // OSC terminated by ST
        let s = "\x1b]0;t\x1b\\x";
        assert_eq!(consume_ansi_escape(s, 0), Some(7));
        // DCS terminated by ST
        let s = "\x1bPdata\x1b\\x";
        assert_eq!(consume_ansi_escape(s, 0), Some(8));
        // Two-byte escape
        let s = "\x1b7x";
        assert_eq!(consume_ansi_escape(s, 0), Some(2));
        // Unterminated CSI swallows the remainder
        let s = "\x1b[31";
        assert_eq!(consume_ansi_escape(s, 0), Some(4));
        // Not an escape
        assert_eq!(consume_ansi_escape("abc", 0), None);
    }
}
