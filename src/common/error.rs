use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Phrases git prints when the remote side cannot be reached or rejects the request.
/// Retrying these will not change the outcome.
const REMOTE_ACCESS_ERRORS: &[&str] = &[
    "couldn't find remote ref",
    "no remote repository specified",
    "no such remote",
    "access denied",
    "permission denied",
    "could not read from remote repository",
    "server does not allow request for unadvertised object",
];

const TIMEOUT_ERRORS: &[&str] = &["timed out", "timeout"];
const CONNECTION_REFUSED_ERRORS: &[&str] = &["connection refused"];
const CONNECTION_RESET_ERRORS: &[&str] = &["connection reset"];
const SSL_ERRORS: &[&str] = &["ssl", "certificate problem", "unable to get local issuer"];
const INDEX_CORRUPTED_ERRORS: &[&str] = &["index file corrupt", "bad index file", "index.lock"];

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("{message}")]
    CommandFailed {
        message: String,
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Git executable is not available: {message}")]
    GitNotFound {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Unsupported git version {found}: {required} or higher is required")]
    UnsupportedGitVersion { found: String, required: String },

    #[error("Authentication failed for {url}: {message}")]
    Authentication { url: String, message: String },

    #[error("Wrong passphrase for private key {key}")]
    WrongPassphrase { key: String },

    #[error("Invalid repository url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid ref commit: {message}")]
    InvalidRefCommit { message: String },

    #[error("{message}")]
    RemoteRefNotFound { message: String, refs: Vec<String> },

    #[error("Revisions missing in the local repository: {}", .revisions.join(", "))]
    MissingRevisions {
        revisions: Vec<String>,
        recoverable: bool,
    },

    #[error("Failed to acquire write lock for {} within {timeout_secs} seconds", .path.display())]
    LockTimeout { path: PathBuf, timeout_secs: u64 },

    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Git operation failed: {message}")]
    GitError {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },

    #[error("File system operation failed: {message}")]
    FileSystemError {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Serialization error: {message}")]
    SerializationError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl VcsError {
    /// Builds the error reported when a git process exits with a non-zero code.
    pub fn command_failed(
        command: impl Into<String>,
        exit_code: Option<i32>,
        stdout: &str,
        stderr: &str,
    ) -> Self {
        let command = command.into();
        let exit = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "killed by signal".to_string());
        let mut message = format!("{} command failed.\nexit code: {}", command, exit);
        if !stdout.trim().is_empty() {
            message.push_str(&format!("\nstdout: {}", stdout.trim_end()));
        }
        if !stderr.trim().is_empty() {
            message.push_str(&format!("\nstderr: {}", stderr.trim_end()));
        }
        Self::CommandFailed {
            message,
            command,
            exit_code,
            stderr: stderr.to_string(),
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    pub fn git_not_found(message: impl Into<String>) -> Self {
        Self::GitNotFound {
            message: message.into(),
            source: None,
        }
    }

    pub fn git_not_found_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::GitNotFound {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn authentication(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Reports refs that disappeared from the remote repository.
    pub fn remote_refs_not_found(refs: Vec<String>) -> Self {
        let message = if refs.len() == 1 {
            format!(
                "Ref {} is no longer present in the remote repository",
                refs[0]
            )
        } else {
            format!(
                "Refs {} are no longer present in the remote repository",
                refs.join(", ")
            )
        };
        Self::RemoteRefNotFound { message, refs }
    }

    pub fn missing_revisions(revisions: Vec<String>, recoverable: bool) -> Self {
        Self::MissingRevisions {
            revisions,
            recoverable,
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_error_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn git_error(message: impl Into<String>) -> Self {
        Self::GitError {
            message: message.into(),
            source: None,
        }
    }

    pub fn git_error_with_source(message: impl Into<String>, source: git2::Error) -> Self {
        Self::GitError {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Maps a libgit2 error raised while talking to `url`, keeping authentication
    /// failures distinguishable from transport ones.
    pub fn from_git2(url: &str, error: git2::Error) -> Self {
        match (error.class(), error.code()) {
            (_, git2::ErrorCode::Auth) => Self::authentication(url, error.message()),
            (git2::ErrorClass::Ssh, _) if error.message().contains("passphrase") => {
                Self::WrongPassphrase {
                    key: url.to_string(),
                }
            }
            (git2::ErrorClass::Ssh, _) => Self::authentication(url, error.message()),
            (_, git2::ErrorCode::User) => Self::Cancelled,
            _ => Self::git_error_with_source(error.message().to_string(), error),
        }
    }

    pub fn filesystem_error(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::FileSystemError {
            message: message.into(),
            path,
            source: None,
        }
    }

    pub fn filesystem_error_with_source(
        message: impl Into<String>,
        path: Option<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystemError {
            message: message.into(),
            path,
            source: Some(source),
        }
    }

    pub fn serialization_error_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_error_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::InternalError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Lower-cased message of this error and every error in its source chain.
    pub fn full_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message.to_lowercase()
    }

    fn mentions_any(&self, phrases: &[&str]) -> bool {
        let message = self.full_message();
        phrases.iter().any(|p| message.contains(p))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::LockTimeout { .. })
            || self.mentions_any(TIMEOUT_ERRORS)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_connection_refused(&self) -> bool {
        self.mentions_any(CONNECTION_REFUSED_ERRORS)
    }

    pub fn is_connection_reset(&self) -> bool {
        self.mentions_any(CONNECTION_RESET_ERRORS)
    }

    pub fn is_ssl_error(&self) -> bool {
        self.mentions_any(SSL_ERRORS)
    }

    pub fn is_index_corrupted(&self) -> bool {
        self.mentions_any(INDEX_CORRUPTED_ERRORS)
    }

    pub fn is_remote_ref_not_found(&self) -> bool {
        matches!(self, Self::RemoteRefNotFound { .. })
            || self.mentions_any(&["couldn't find remote ref"])
    }

    pub fn is_remote_access_error(&self) -> bool {
        matches!(
            self,
            Self::RemoteRefNotFound { .. } | Self::Authentication { .. }
        ) || self.mentions_any(REMOTE_ACCESS_ERRORS)
    }

    /// Decides whether an operation that failed on `attempt` (1-based) out of
    /// `max_attempts` should be started again.
    pub fn is_recoverable(&self, attempt: u32, max_attempts: u32) -> bool {
        let attempts_left = attempt < max_attempts;
        match self {
            Self::Cancelled
            | Self::GitNotFound { .. }
            | Self::UnsupportedGitVersion { .. }
            | Self::Authentication { .. }
            | Self::WrongPassphrase { .. }
            | Self::InvalidUrl { .. }
            | Self::InvalidRefCommit { .. }
            | Self::RemoteRefNotFound { .. }
            | Self::ConfigError { .. }
            | Self::LockTimeout { .. } => false,
            Self::MissingRevisions { recoverable, .. } => *recoverable && attempts_left,
            Self::Timeout { .. } => attempts_left,
            _ => {
                if self.is_timeout() || self.is_connection_refused() || self.is_connection_reset()
                {
                    return attempts_left;
                }
                if self.is_ssl_error() || self.is_index_corrupted() || self.is_remote_access_error()
                {
                    return false;
                }
                attempts_left
            }
        }
    }
}

impl From<git2::Error> for VcsError {
    fn from(error: git2::Error) -> Self {
        Self::git_error_with_source(error.message().to_string(), error)
    }
}

impl From<std::io::Error> for VcsError {
    fn from(error: std::io::Error) -> Self {
        Self::filesystem_error_with_source("File system operation failed", None, error)
    }
}

impl From<serde_yaml::Error> for VcsError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::serialization_error_with_source("YAML serialization failed", error)
    }
}

impl From<serde_json::Error> for VcsError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization_error_with_source("JSON serialization failed", error)
    }
}

impl From<anyhow::Error> for VcsError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal_error(format!("Anyhow error: {}", error))
    }
}
