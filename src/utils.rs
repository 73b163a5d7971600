//! Utility functions for log previews and the save directory.
//!
//! - String truncation for logging long prompts and responses
//! - Listing the analysis artifacts in a save directory
//! - File system validation for the save directory

use std::collections::BTreeSet;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

/// File name prefix of every analysis artifact.
pub const ARTIFACT_PREFIX: &str = "hot_trends_analysis_";

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` characters (not bytes, so multi-byte
/// text never splits) and get an ellipsis plus the number of characters
/// dropped.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"热".repeat(12), 10), "热热热热热热热热热热…(+2 chars)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => {
            let dropped = s[cut..].chars().count();
            format!("{}…(+{dropped} chars)", &s[..cut])
        }
    }
}

/// Whether `name` looks like an analysis artifact file name.
pub fn is_artifact_name(name: &str) -> bool {
    name.starts_with(ARTIFACT_PREFIX) && name.ends_with(".json")
}

/// File names of every artifact in `dir`.
///
/// Names embed local time, which can step backwards, so callers compare
/// snapshots of this set instead of trusting the greatest name.
#[instrument(level = "debug", skip_all, fields(dir = %dir.display()))]
pub async fn artifact_names(dir: &Path) -> std::io::Result<BTreeSet<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = BTreeSet::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_artifact_name(&name) {
            names.insert(name);
        }
    }
    debug!(count = names.len(), "Scanned for artifacts");
    Ok(names)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then writes and removes a
/// small check file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let check_path = path.join(".hot_trends_write_check");
    fs::write(&check_path, b"").await?;
    if let Err(e) = fs::remove_file(&check_path).await {
        debug!(path = %check_path.display(), error = %e, "Could not remove write check file");
    }
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
        assert_eq!(truncate_for_log("exact", 5), "exact");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.ends_with("…(+400 chars)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "热搜".repeat(6);
        assert_eq!(truncate_for_log(&s, 3), "热搜热…(+9 chars)");
    }

    #[test]
    fn test_is_artifact_name() {
        assert!(is_artifact_name("hot_trends_analysis_20250506_203000_123.json"));
        assert!(!is_artifact_name("run.log"));
        assert!(!is_artifact_name(".hot_trends_analysis_20250506_203000_123.json.tmp"));
        assert!(!is_artifact_name("other.json"));
    }

    #[tokio::test]
    async fn test_artifact_names_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "hot_trends_analysis_20250506_203000_123.json",
            "hot_trends_analysis_20250507_080000_001.json",
            ".hot_trends_analysis_20250507_080000_002.json.tmp",
            "run.log",
            "zzz.json",
        ] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        let names = artifact_names(dir.path()).await.unwrap();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            [
                "hot_trends_analysis_20250506_203000_123.json",
                "hot_trends_analysis_20250507_080000_001.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_artifact_names_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.log"), "line").unwrap();
        assert!(artifact_names(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }
}
