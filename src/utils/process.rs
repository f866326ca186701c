use anyhow::{anyhow, Result};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use super::debug_log;

const MAX_ERROR_OUTPUT_BYTES: usize = 600;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Every external binary the tool touches goes through this module, so
/// timeout, logging, and error-enrichment behavior stay uniform.

struct RawOutput {
    status: Option<ExitStatus>,
    output: Vec<u8>,
    timed_out: bool,
}

fn argv_display(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

fn dir_display(dir: Option<&Path>) -> String {
    dir.map(|d| d.display().to_string()).unwrap_or_default()
}

fn truncate_output(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let trimmed = text.trim();
    if trimmed.len() <= MAX_ERROR_OUTPUT_BYTES {
        return trimmed.to_string();
    }
    let mut cut = MAX_ERROR_OUTPUT_BYTES;
    while cut > 0 && !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &trimmed[..cut])
}

fn format_timeout(timeout: Duration) -> String {
    let secs = timeout.as_secs_f64();
    if (secs - secs.trunc()).abs() < f64::EPSILON {
        format!("{}s", secs as u64)
    } else {
        format!("{secs:.1}s")
    }
}

fn spawn_and_collect(
    dir: Option<&Path>,
    timeout: Option<Duration>,
    stdin: Option<&[u8]>,
    program: &str,
    args: &[&str],
) -> std::io::Result<RawOutput> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(d) = dir {
        command.current_dir(d);
    }
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = command.spawn()?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            // A failed write means the child exited early; its output still
            // tells the caller what happened.
            let _ = pipe.write_all(input);
        }
    }

    let mut stdout_pipe = child.stdout.take();
    let stdout_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stdout_pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });
    let mut stderr_pipe = child.stderr.take();
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stderr_pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut timed_out = false;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break Some(status),
            None => {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        timed_out = true;
                        let _ = child.kill();
                        break child.wait().ok();
                    }
                }
                std::thread::sleep(WAIT_POLL_INTERVAL);
            }
        }
    };

    let mut output = stdout_reader.join().unwrap_or_default();
    output.extend(stderr_reader.join().unwrap_or_default());

    Ok(RawOutput {
        status,
        output,
        timed_out,
    })
}

fn run_internal(
    dir: Option<&Path>,
    timeout: Option<Duration>,
    allowed_exit_codes: &[i32],
    stdin: Option<&[u8]>,
    program: &str,
    args: &[&str],
) -> Result<Vec<u8>> {
    let argv = argv_display(program, args);
    let started = Instant::now();
    match timeout {
        Some(t) => debug_log::write_line(&format!(
            "cmd start dir={:?} argv={:?} timeout={}",
            dir_display(dir),
            argv,
            format_timeout(t)
        )),
        None => debug_log::write_line(&format!(
            "cmd start dir={:?} argv={:?}",
            dir_display(dir),
            argv
        )),
    }

    let raw = match spawn_and_collect(dir, timeout, stdin, program, args) {
        Ok(raw) => raw,
        Err(err) => {
            debug_log::write_line(&format!(
                "cmd fail dur={:?} argv={:?} err={err}",
                started.elapsed(),
                argv
            ));
            return Err(anyhow!("{argv} failed: {err}"));
        }
    };
    let elapsed = started.elapsed();

    if raw.timed_out {
        let trimmed = truncate_output(&raw.output);
        debug_log::write_line(&format!(
            "cmd timeout dur={elapsed:?} argv={argv:?} out={trimmed:?}"
        ));
        let timeout_text = format_timeout(timeout.unwrap_or_default());
        if trimmed.is_empty() {
            return Err(anyhow!("{argv} timed out after {timeout_text}"));
        }
        return Err(anyhow!("{argv} timed out after {timeout_text}: {trimmed}"));
    }

    let success = raw.status.map(|s| s.success()).unwrap_or(false);
    if success {
        debug_log::write_line(&format!(
            "cmd ok dur={elapsed:?} argv={argv:?} out_bytes={}",
            raw.output.len()
        ));
        return Ok(raw.output);
    }

    let code = raw.status.and_then(|s| s.code());
    if let Some(code) = code {
        if allowed_exit_codes.contains(&code) {
            debug_log::write_line(&format!(
                "cmd ok-allowed-exit dur={elapsed:?} argv={argv:?} exit={code} out_bytes={}",
                raw.output.len()
            ));
            return Ok(raw.output);
        }
    }

    let trimmed = truncate_output(&raw.output);
    debug_log::write_line(&format!(
        "cmd fail dur={elapsed:?} argv={argv:?} exit={code:?} out={trimmed:?}"
    ));
    let status_text = match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };
    if trimmed.is_empty() {
        Err(anyhow!("{argv} failed: {status_text}"))
    } else {
        Err(anyhow!("{argv} failed: {status_text}: {trimmed}"))
    }
}

pub fn run_capture_bytes(dir: Option<&Path>, program: &str, args: &[&str]) -> Result<Vec<u8>> {
    run_internal(dir, None, &[], None, program, args)
}

/// Combined stdout+stderr with the trailing newline trimmed, mirroring what
/// shell-out callers actually want to compare against.
pub fn run_capture(dir: Option<&Path>, program: &str, args: &[&str]) -> Result<String> {
    let bytes = run_capture_bytes(dir, program, args)?;
    Ok(String::from_utf8_lossy(&bytes)
        .trim_end_matches('\n')
        .to_string())
}

pub fn run_capture_timeout(
    dir: Option<&Path>,
    timeout: Duration,
    program: &str,
    args: &[&str],
) -> Result<String> {
    let bytes = run_internal(dir, Some(timeout), &[], None, program, args)?;
    Ok(String::from_utf8_lossy(&bytes)
        .trim_end_matches('\n')
        .to_string())
}

/// Like `run_capture`, but exit codes in `allowed` count as success. Needed
/// for `git diff --no-index`, which reports "files differ" via exit code 1.
pub fn run_capture_allow_exit_codes(
    dir: Option<&Path>,
    allowed: &[i32],
    program: &str,
    args: &[&str],
) -> Result<String> {
    let bytes = run_internal(dir, None, allowed, None, program, args)?;
    Ok(String::from_utf8_lossy(&bytes)
        .trim_end_matches('\n')
        .to_string())
}

pub fn run_with_stdin(
    dir: Option<&Path>,
    stdin: &[u8],
    program: &str,
    args: &[&str],
) -> Result<Vec<u8>> {
    run_internal(dir, None, &[], Some(stdin), program, args)
}

pub fn run_quiet(dir: Option<&Path>, program: &str, args: &[&str]) -> Result<()> {
    run_internal(dir, None, &[], None, program, args).map(|_| ())
}

pub fn run_quiet_timeout(
    dir: Option<&Path>,
    timeout: Duration,
    program: &str,
    args: &[&str],
) -> Result<()> {
    run_internal(dir, Some(timeout), &[], None, program, args).map(|_| ())
}

/// Hand the controlling terminal to the child (tmux attach). Blocks until
/// the child exits; nothing is captured.
pub fn run_inherit(dir: Option<&Path>, program: &str, args: &[&str]) -> Result<()> {
    let argv = argv_display(program, args);
    debug_log::write_line(&format!("cmd inherit argv={argv:?}"));
    let mut command = Command::new(program);
    command.args(args);
    if let Some(d) = dir {
        command.current_dir(d);
    }
    let status = command
        .status()
        .map_err(|err| anyhow!("{argv} failed: {err}"))?;
    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(anyhow!("{argv} failed: exit status {code}")),
            None => Err(anyhow!("{argv} failed: terminated by signal")),
        }
    }
}

pub fn command_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_combined_output() {
        let out = run_capture(None, "sh", &["-c", "echo out; echo err 1>&2"]).unwrap();
        assert!(out.contains("out"));
        assert!(out.contains("err"));
    }

    #[test]
    fn nonzero_exit_is_enriched() {
        let err = run_capture(None, "sh", &["-c", "echo boom; exit 3"]).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("exit status 3"), "got: {text}");
        assert!(text.contains("boom"), "got: {text}");
    }

    #[test]
    fn allowed_exit_codes_pass() {
        let out =
            run_capture_allow_exit_codes(None, &[3], "sh", &["-c", "echo fine; exit 3"]).unwrap();
        assert_eq!(out, "fine");
    }

    #[test]
    fn timeout_is_reported_as_such() {
        let err = run_capture_timeout(
            None,
            Duration::from_millis(100),
            "sh",
            &["-c", "sleep 5"],
        )
        .unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {err}");
    }

    #[test]
    fn stdin_is_piped() {
        let out = run_with_stdin(None, b"hello\n", "cat", &[]).unwrap();
        assert_eq!(String::from_utf8_lossy(&out), "hello\n");
    }

    #[test]
    fn long_failure_output_is_truncated() {
        let err = run_capture(
            None,
            "sh",
            &["-c", "head -c 2000 /dev/zero | tr '\\0' 'x'; exit 1"],
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("...(truncated)"), "got length {}", text.len());
    }
}
