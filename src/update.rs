//! Release update probe. At most one HTTP request per day, cached under
//! the config dir; every failure is silent because an update hint must
//! never get in the way of real work.

use crate::config::Config;
use crate::utils::paths;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const UPDATE_CHECK_INTERVAL_HOURS: i64 = 24;
const UPDATE_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
const UPDATE_CACHE_FILE: &str = "update.json";
const UPDATE_REPO: &str = "joegrabski/sprout";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCache {
    pub checked_at: DateTime<Utc>,
    pub latest: String,
}

fn cache_path() -> Option<PathBuf> {
    paths::config_dir().map(|dir| dir.join(UPDATE_CACHE_FILE))
}

fn read_cache() -> Option<UpdateCache> {
    let path = cache_path()?;
    let data = std::fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

fn write_cache(cache: &UpdateCache) {
    let path = match cache_path() {
        Some(path) => path,
        None => return,
    };
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    if let Ok(data) = serde_json::to_vec(cache) {
        let _ = std::fs::write(path, data);
    }
}

fn latest_release_tag() -> Result<String> {
    #[derive(Deserialize)]
    struct Release {
        tag_name: String,
    }

    let url = format!("https://api.github.com/repos/{UPDATE_REPO}/releases/latest");
    let client = reqwest::blocking::Client::builder()
        .timeout(UPDATE_CHECK_TIMEOUT)
        .user_agent("sprout-update-check")
        .build()?;
    let release: Release = client.get(url).send()?.error_for_status()?.json()?;
    let tag = release.tag_name.trim().to_string();
    if tag.is_empty() {
        return Err(anyhow!("update check missing tag name"));
    }
    Ok(tag)
}

/// Lenient semver: optional leading `v`, pre-release and build suffixes
/// ignored, exactly three numeric components required.
pub fn parse_semver(value: &str) -> Option<[u64; 3]> {
    let raw = value.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }
    let raw = raw.strip_prefix('v').unwrap_or(&raw);
    let raw = match raw.find(['+', '-']) {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let mut parts = raw.split('.');
    let mut out = [0u64; 3];
    for slot in out.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    Some(out)
}

pub fn is_newer_version(latest: &str, current: &str) -> bool {
    match (parse_semver(latest), parse_semver(current)) {
        (Some(latest), Some(current)) => latest > current,
        _ => false,
    }
}

/// Returns the newer released version when one exists. Honors the 24 h
/// cache; `dev` builds and disabled configs never check.
pub fn check_for_update(current_version: &str, cfg: &Config) -> Option<String> {
    let current = current_version.trim();
    if current.is_empty() || current.eq_ignore_ascii_case("dev") || !cfg.update_check {
        return None;
    }

    if let Some(cache) = read_cache() {
        if Utc::now() - cache.checked_at < ChronoDuration::hours(UPDATE_CHECK_INTERVAL_HOURS) {
            if !cache.latest.is_empty() && is_newer_version(&cache.latest, current) {
                return Some(cache.latest);
            }
            return None;
        }
    }

    let latest = latest_release_tag().ok()?;
    write_cache(&UpdateCache {
        checked_at: Utc::now(),
        latest: latest.clone(),
    });
    if is_newer_version(&latest, current) {
        Some(latest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semver_parsing_is_lenient() {
        assert_eq!(parse_semver("1.2.3"), Some([1, 2, 3]));
        assert_eq!(parse_semver("v1.2.3"), Some([1, 2, 3]));
        assert_eq!(parse_semver("v1.2.3-rc.1"), Some([1, 2, 3]));
        assert_eq!(parse_semver("1.2.3+build5"), Some([1, 2, 3]));
        assert_eq!(parse_semver("1.2"), None);
        assert_eq!(parse_semver("not-a-version"), None);
        assert_eq!(parse_semver(""), None);
    }

    #[test]
    fn newer_version_comparison() {
        assert!(is_newer_version("1.2.4", "1.2.3"));
        assert!(is_newer_version("v2.0.0", "1.9.9"));
        assert!(!is_newer_version("1.2.3", "1.2.3"));
        assert!(!is_newer_version("1.2.2", "1.2.3"));
        assert!(!is_newer_version("garbage", "1.2.3"));
    }

    #[test]
    fn dev_builds_never_check() {
        let cfg = Config::default();
        assert_eq!(check_for_update("dev", &cfg), None);
        assert_eq!(check_for_update("", &cfg), None);

        let mut cfg = Config::default();
        cfg.update_check = false;
        assert_eq!(check_for_update("0.1.0", &cfg), None);
    }

    #[test]
    fn cache_round_trips_through_serde() {
        let cache = UpdateCache {
            checked_at: Utc::now(),
            latest: "v1.4.0".to_string(),
        };
        let json = serde_json::to_string(&cache).unwrap();
        assert!(json.contains("checked_at"));
        assert!(json.contains("latest"));
        let back: UpdateCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back.latest, "v1.4.0");
    }
}
