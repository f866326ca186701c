use std::path::{Component, Path, PathBuf};

/// Absolutize and lexically normalize a path without touching the filesystem.
/// Symlinks are deliberately not resolved; callers that need the physical
/// path go through `std::fs::canonicalize` themselves.
pub fn abs_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => return path.to_path_buf(),
        }
    };
    clean_path(&absolute)
}

/// Collapse `.` and `..` components the way `filepath.Clean` does.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() && !path.has_root() {
                    cleaned.push(Component::ParentDir.as_os_str());
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Base directory for sprout's persisted files, honoring `XDG_CONFIG_HOME`.
pub fn config_dir() -> Option<PathBuf> {
    match std::env::var("XDG_CONFIG_HOME") {
        Ok(value) if !value.trim().is_empty() => Some(PathBuf::from(value).join("sprout")),
        _ => home_dir().map(|home| home.join(".config").join("sprout")),
    }
}

pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
