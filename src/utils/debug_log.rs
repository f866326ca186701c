use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

// Single writer lock so concurrent subprocess calls never interleave lines.
static LOG_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

/// Resolve the debug log destination. `SPROUT_DEBUG_LOG` overrides the
/// default under the system temp dir; setting it to the empty string
/// disables logging entirely.
pub fn log_file_path() -> Option<PathBuf> {
    match std::env::var("SPROUT_DEBUG_LOG") {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(PathBuf::from(trimmed))
            }
        }
        Err(_) => Some(std::env::temp_dir().join("sprout-debug.log")),
    }
}

/// Append one timestamped line to the debug log. Failures are swallowed:
/// diagnostics must never break the operation being diagnosed.
pub fn write_line(message: &str) {
    let path = match log_file_path() {
        Some(p) => p,
        None => return,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && fs::create_dir_all(parent).is_err() {
            return;
        }
    }

    let line = format!(
        "{} {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        message
    );

    let _guard = LOG_MUTEX.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    rotate_if_oversized(&path);

    if let Ok(mut file) = OpenOptions::new().append(true).create(true).open(&path) {
        let _ = file.write_all(line.as_bytes());
    }
}

fn rotate_if_oversized(path: &std::path::Path) {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_BYTES {
        return;
    }
    let mut rotated = path.as_os_str().to_owned();
    rotated.push(".old");
    let _ = fs::rename(path, PathBuf::from(rotated));
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test body: both cases mutate the same env var, and the test
    // runner is parallel.
    #[test]
    fn env_override_controls_destination() {
        let original = std::env::var("SPROUT_DEBUG_LOG").ok();

        std::env::set_var("SPROUT_DEBUG_LOG", "");
        assert!(log_file_path().is_none());

        std::env::set_var("SPROUT_DEBUG_LOG", "/tmp/sprout-test.log");
        assert_eq!(
            log_file_path(),
            Some(PathBuf::from("/tmp/sprout-test.log"))
        );

        match original {
            Some(value) => std::env::set_var("SPROUT_DEBUG_LOG", value),
            None => std::env::remove_var("SPROUT_DEBUG_LOG"),
        }
    }
}
