//! Agent readiness derived from pane text. Interactive agents differ in
//! how they present an idle prompt, so classification checks a prompt-only
//! pattern, the cursor overlay sitting on a prompt line, and a set of
//! wait-for-input phrases the common CLIs print.

use once_cell::sync::Lazy;
use regex::Regex;

static PROMPT_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(>|>>|>>>|\$|#|:|›|❯|➜)\s*$").unwrap());
static PROMPT_INPUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(>|>>|>>>|\$|#|:|›|❯|➜)\s+.*$").unwrap());

const READY_PHRASES: &[&str] = &[
    "awaiting your input",
    "waiting for your input",
    "ready for your next instruction",
    "what would you like to do next",
    "enter your prompt",
];

const MAX_INSPECTED_LINES: usize = 12;

/// Drop ANSI escape sequences, keeping only printable text.
pub fn strip_ansi(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != 0x1b {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        i += 1;
        if i >= bytes.len() {
            break;
        }
        match bytes[i] {
            b'[' => {
                while i + 1 < bytes.len() {
                    i += 1;
                    if (0x40..=0x7e).contains(&bytes[i]) {
                        break;
                    }
                }
                i += 1;
            }
            b']' => {
                while i + 1 < bytes.len() {
                    i += 1;
                    if bytes[i] == 0x07 {
                        break;
                    }
                    if bytes[i] == 0x1b && i + 1 < bytes.len() && bytes[i + 1] == b'\\' {
                        i += 1;
                        break;
                    }
                }
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Inspect the last few non-empty lines of a capture and decide whether
/// the agent is sitting at a prompt.
pub fn agent_ready_for_instruction(output: &str) -> bool {
    let plain = strip_ansi(output);
    let normalized = plain.replace('\r', "\n");
    let mut seen = 0usize;
    for line in normalized.lines().rev() {
        if seen >= MAX_INSPECTED_LINES {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        seen += 1;

        let lower = line.to_lowercase();
        if lower.contains("for shortcuts") || lower.contains("context left") {
            return true;
        }
        if PROMPT_ONLY_RE.is_match(line) {
            return true;
        }
        if line.contains('█') && PROMPT_INPUT_RE.is_match(line) {
            return true;
        }
        if READY_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_ansi_removes_csi_and_osc() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
        assert_eq!(strip_ansi("\x1b]0;title\x07text"), "text");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn prompt_only_lines_mean_ready() {
        for prompt in [">", ">>", ">>>", "$", "#", ":", "›", "❯", "➜", "> "] {
            let capture = format!("some earlier output\n{prompt}");
            assert!(
                agent_ready_for_instruction(&capture),
                "prompt {prompt:?} should classify ready"
            );
        }
    }

    #[test]
    fn known_phrases_mean_ready() {
        let phrases = [
            "Press ? for shortcuts",
            "34% context left",
            "Awaiting your input",
            "waiting for your input",
            "Ready for your next instruction.",
            "What would you like to do next?",
            "enter your prompt",
        ];
        for phrase in phrases {
            let capture = format!("scrolling output\nmore output\n{phrase}\n");
            assert!(
                agent_ready_for_instruction(&capture),
                "phrase {phrase:?} should classify ready"
            );
        }
    }

    #[test]
    fn cursor_overlay_on_prompt_line_means_ready() {
        assert!(agent_ready_for_instruction("> type here █"));
    }

    #[test]
    fn scrolling_output_means_busy() {
        let capture = "compiling module a\ncompiling module b\nrunning step 3 of 9\n";
        assert!(!agent_ready_for_instruction(capture));
        assert!(!agent_ready_for_instruction(""));
    }

    #[test]
    fn ready_marker_beyond_window_is_ignored() {
        let mut capture = String::from("$\n");
        for i in 0..20 {
            capture.push_str(&format!("output line {i}\n"));
        }
        assert!(!agent_ready_for_instruction(&capture));
    }

    #[test]
    fn colored_prompt_is_still_detected() {
        assert!(agent_ready_for_instruction("\x1b[32m❯\x1b[0m "));
    }
}
