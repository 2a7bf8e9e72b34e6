//! Lazy detection of the native git executable.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::common::error::VcsError;
use crate::common::result::VcsResult;
use crate::domain::value_objects::git_version::GitVersion;
use crate::infrastructure::process::git_command_line::GitCommandLine;

const VERSION_TIMEOUT: Duration = Duration::from_secs(30);

/// A git executable that was found and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitExec {
    pub path: String,
    pub version: GitVersion,
}

/// Detects git once and caches the outcome until [`GitDetector::redetect`] is called.
#[derive(Debug)]
pub struct GitDetector {
    git_path: String,
    cached: Mutex<Option<GitExec>>,
}

impl GitDetector {
    pub fn new(git_path: impl Into<String>) -> Self {
        Self {
            git_path: git_path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn git_path(&self) -> &str {
        &self.git_path
    }

    /// Returns the cached executable, detecting it on first use.
    pub async fn detect(&self) -> VcsResult<GitExec> {
        let mut cached = self.cached.lock().await;
        if let Some(exec) = cached.as_ref() {
            return Ok(exec.clone());
        }
        let exec = detect_git(&self.git_path).await?;
        *cached = Some(exec.clone());
        Ok(exec)
    }

    /// Drops the cached result and detects git again.
    pub async fn redetect(&self) -> VcsResult<GitExec> {
        let mut cached = self.cached.lock().await;
        *cached = None;
        let exec = detect_git(&self.git_path).await?;
        *cached = Some(exec.clone());
        Ok(exec)
    }
}

/// Runs `git version` and checks the result against the minimum supported version.
pub async fn detect_git(git_path: &str) -> VcsResult<GitExec> {
    let git_path = git_path.trim();
    if git_path.is_empty() {
        return Err(VcsError::git_not_found(
            "No path to git executable is configured",
        ));
    }

    let output = GitCommandLine::new(git_path)
        .arg("version")
        .timeout(VERSION_TIMEOUT)
        .run()
        .await
        .map_err(|e| match e {
            VcsError::GitNotFound { .. } => e,
            other => VcsError::git_not_found(format!(
                "Unable to run git at path '{}': {}",
                git_path, other
            )),
        })?;

    let version = GitVersion::parse(&output.stdout).map_err(|e| {
        VcsError::git_not_found(format!("Unable to determine git version: {}", e))
    })?;

    if !version.is_supported() {
        return Err(VcsError::UnsupportedGitVersion {
            found: version.to_string(),
            required: GitVersion::MIN.to_string(),
        });
    }
    if version.is_deprecated() {
        warn!(
            "git {} at '{}' is deprecated, please upgrade to {} or newer",
            version,
            git_path,
            GitVersion::DEPRECATED
        );
    }

    info!("Detected git {} at '{}'", version, git_path);
    debug!("git version output: {}", output.stdout.trim());
    Ok(GitExec {
        path: git_path.to_string(),
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_path() {
        let err = detect_git("  ").await.unwrap_err();
        assert!(matches!(err, VcsError::GitNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let detector = GitDetector::new("/definitely/not/git");
        let err = detector.detect().await.unwrap_err();
        assert!(matches!(err, VcsError::GitNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_detects_and_caches_version() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-git");
        let mut file = std::fs::File::create(&script).unwrap();
        writeln!(file, "#!/bin/sh\necho 'git version 2.40.1'").unwrap();
        drop(file);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let detector = GitDetector::new(script.to_string_lossy());
        let exec = detector.detect().await.unwrap();
        assert_eq!(exec.version, GitVersion::new(2, 40, 1, 0));

        std::fs::remove_file(&script).unwrap();
        assert_eq!(detector.detect().await.unwrap(), exec);
        assert!(detector.redetect().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rejects_old_version() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("old-git");
        let mut file = std::fs::File::create(&script).unwrap();
        writeln!(file, "#!/bin/sh\necho 'git version 1.5.0'").unwrap();
        drop(file);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = detect_git(&script.to_string_lossy()).await.unwrap_err();
        assert!(matches!(err, VcsError::UnsupportedGitVersion { .. }));
    }
}
