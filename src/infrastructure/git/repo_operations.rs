//! Factory of fetch and ls-remote commands.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::common::result::VcsResult;
use crate::domain::entities::fetch_settings::FetchSettings;
use crate::domain::entities::server_config::ServerConfig;
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::domain::value_objects::git_version::GitVersion;
use crate::domain::value_objects::ref_commit::RefCommit;
use crate::infrastructure::git::fetch::{FetchCommand, NativeFetchCommand};
use crate::infrastructure::git::git_detector::{GitDetector, GitExec};
use crate::infrastructure::git::libgit2::{Libgit2FetchCommand, Libgit2LsRemoteCommand};
use crate::infrastructure::git::ls_remote::{LsRemoteCommand, LsRemoteOptions, NativeLsRemoteCommand};
use crate::infrastructure::ssh::key_manager::VcsRootSshKeyManager;

/// Produces the commands used to talk to remote repositories.
#[cfg_attr(test, mockall::automock)]
pub trait GitRepoOperations: Send + Sync {
    fn fetch_command(&self) -> Arc<dyn FetchCommand>;
    fn ls_remote_command(&self) -> Arc<dyn LsRemoteCommand>;
}

struct Backends {
    config: Arc<ServerConfig>,
    detector: Arc<GitDetector>,
    native_fetch: Arc<dyn FetchCommand>,
    native_ls_remote: Arc<dyn LsRemoteCommand>,
    libgit2_fetch: Arc<dyn FetchCommand>,
    libgit2_ls_remote: Arc<dyn LsRemoteCommand>,
}

impl Backends {
    /// Native git is used when enabled for the URL and a recent enough git is installed.
    async fn use_native(&self, url: &str) -> bool {
        if !self.config.native_operations.enabled_for(url) {
            return false;
        }
        match self.detector.detect().await {
            Ok(exec) if exec.version.fetch_supports_stdin() => true,
            Ok(exec) => {
                warn!(
                    "git {} does not support fetch --stdin (needs {}), using libgit2",
                    exec.version,
                    GitVersion::FETCH_STDIN
                );
                false
            }
            Err(e) => {
                debug!("Native git is unavailable, using libgit2: {}", e);
                false
            }
        }
    }
}

struct SelectingFetchCommand {
    backends: Arc<Backends>,
}

#[async_trait]
impl FetchCommand for SelectingFetchCommand {
    async fn fetch(
        &self,
        repository_dir: &Path,
        root: &VcsRootConfig,
        settings: &FetchSettings,
    ) -> VcsResult<()> {
        let command = if self.backends.use_native(&root.fetch_url).await {
            &self.backends.native_fetch
        } else {
            &self.backends.libgit2_fetch
        };
        command.fetch(repository_dir, root, settings).await
    }
}

struct SelectingLsRemoteCommand {
    backends: Arc<Backends>,
}

#[async_trait]
impl LsRemoteCommand for SelectingLsRemoteCommand {
    async fn ls_remote(
        &self,
        root: &VcsRootConfig,
        options: &LsRemoteOptions,
    ) -> VcsResult<Vec<RefCommit>> {
        let command = if self.backends.use_native(&root.fetch_url).await {
            &self.backends.native_ls_remote
        } else {
            &self.backends.libgit2_ls_remote
        };
        command.ls_remote(root, options).await
    }
}

/// Chooses between native git and libgit2 for every call.
pub struct GitRepoOperationsImpl {
    backends: Arc<Backends>,
}

impl GitRepoOperationsImpl {
    pub fn new(config: ServerConfig, key_manager: Arc<dyn VcsRootSshKeyManager>) -> Self {
        let config = Arc::new(config);
        let detector = Arc::new(GitDetector::new(config.git_path.clone()));

        let native_ls_remote: Arc<dyn LsRemoteCommand> = Arc::new(NativeLsRemoteCommand::new(
            detector.clone(),
            key_manager.clone(),
            config.clone(),
        ));
        let native_fetch: Arc<dyn FetchCommand> = Arc::new(
            NativeFetchCommand::new(detector.clone(), key_manager.clone(), config.clone())
                .with_ref_specs_refresher(native_ls_remote.clone()),
        );

        let backends = Backends {
            libgit2_fetch: Arc::new(Libgit2FetchCommand::new(
                key_manager.clone(),
                config.clone(),
            )),
            libgit2_ls_remote: Arc::new(Libgit2LsRemoteCommand::new(key_manager, config.clone())),
            native_fetch,
            native_ls_remote,
            detector,
            config,
        };
        Self {
            backends: Arc::new(backends),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.backends.config
    }

    /// Forgets the previously detected git and detects it again.
    pub async fn detect_git(&self) -> VcsResult<GitExec> {
        self.backends.detector.redetect().await
    }

    pub async fn use_native(&self, url: &str) -> bool {
        self.backends.use_native(url).await
    }
}

impl GitRepoOperations for GitRepoOperationsImpl {
    fn fetch_command(&self) -> Arc<dyn FetchCommand> {
        Arc::new(SelectingFetchCommand {
            backends: self.backends.clone(),
        })
    }

    fn ls_remote_command(&self) -> Arc<dyn LsRemoteCommand> {
        Arc::new(SelectingLsRemoteCommand {
            backends: self.backends.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::VcsError;
    use crate::domain::entities::server_config::UrlOverride;
    use crate::infrastructure::ssh::key_manager::NoSshKeyManager;

    fn operations(config: ServerConfig) -> GitRepoOperationsImpl {
        GitRepoOperationsImpl::new(config, Arc::new(NoSshKeyManager))
    }

    #[tokio::test]
    async fn test_libgit2_when_native_disabled() {
        let ops = operations(ServerConfig::default().with_native_operations(false));
        assert!(!ops.use_native("https://example.com/repo.git").await);
    }

    #[tokio::test]
    async fn test_libgit2_when_git_is_missing() {
        let ops = operations(ServerConfig::default().with_git_path("/no/such/git"));
        assert!(!ops.use_native("https://example.com/repo.git").await);
        assert!(matches!(
            ops.detect_git().await,
            Err(VcsError::GitNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_url_override_disables_native() {
        let mut config = ServerConfig::default();
        config.native_operations.url_overrides.push(UrlOverride {
            url: "example.com".to_string(),
            enabled: false,
        });
        let ops = operations(config);
        assert!(!ops.use_native("https://example.com/repo.git").await);
    }

    #[test]
    fn test_commands_are_always_available() {
        let ops = operations(ServerConfig::default());
        let _fetch = ops.fetch_command();
        let _ls_remote = ops.ls_remote_command();
        assert_eq!(ops.config().git_path, "git");
    }

    #[tokio::test]
    async fn test_mocked_operations() {
        let mut mock = MockGitRepoOperations::new();
        mock.expect_ls_remote_command().times(1).returning(|| {
            Arc::new(Libgit2LsRemoteCommand::new(
                Arc::new(NoSshKeyManager),
                Arc::new(ServerConfig::default()),
            ))
        });
        let root = VcsRootConfig::new("r", "");
        let result = mock
            .ls_remote_command()
            .ls_remote(&root, &LsRemoteOptions::default())
            .await;
        assert!(result.is_err());
    }
}
