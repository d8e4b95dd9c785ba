//! File system helpers shared by intake and conversion.

use std::path::Path;

use tracing::{info, warn};

/// Sanitize a client-supplied file name for use inside a staging directory.
///
/// Directory components are dropped; whitespace becomes `_`; anything other
/// than alphanumerics, `-`, `_` and `.` is removed.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);

    let sanitized: String = base
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .take(200)
        .collect();

    let trimmed = sanitized.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Remove a file, treating "already gone" as success. Failures are logged.
pub async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "Removed file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories_and_specials() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\videos\\my movie (1).mp4"), "my_movie_1.mp4");
        assert_eq!(sanitize_file_name("...hidden.mkv"), "hidden.mkv");
        assert_eq!(sanitize_file_name("??"), "upload");
    }

    #[tokio::test]
    async fn test_remove_quietly_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.mp4");
        assert!(remove_quietly(&path).await);

        tokio::fs::write(&path, b"x").await.unwrap();
        assert!(remove_quietly(&path).await);
        assert!(!path.exists());
    }
}
