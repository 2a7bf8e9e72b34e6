//! `git fetch` into a local repository.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::common::error::VcsError;
use crate::common::operation::{operation, Retry, Timed, VcsOperation};
use crate::common::result::VcsResult;
use crate::domain::entities::fetch_settings::FetchSettings;
use crate::domain::entities::server_config::ServerConfig;
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::domain::value_objects::git_version::GitVersion;
use crate::domain::value_objects::ref_spec::RefSpec;
use crate::infrastructure::git::auth::AuthEnv;
use crate::infrastructure::git::git_detector::GitDetector;
use crate::infrastructure::git::ls_remote::{LsRemoteCommand, LsRemoteOptions};
use crate::infrastructure::process::git_command_line::GitCommandLine;
use crate::infrastructure::ssh::key_manager::VcsRootSshKeyManager;

/// Fetches refs of a remote repository into a local one.
#[async_trait]
pub trait FetchCommand: Send + Sync {
    async fn fetch(
        &self,
        repository_dir: &Path,
        root: &VcsRootConfig,
        settings: &FetchSettings,
    ) -> VcsResult<()>;
}

/// Arguments of one `git fetch` invocation, excluding the remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchArguments {
    pub options: Vec<String>,
    /// Refspecs passed after the URL.
    pub ref_specs: Vec<String>,
    /// Refspecs written to stdin when `--stdin` is used.
    pub stdin: Option<String>,
}

impl FetchArguments {
    pub fn build(version: &GitVersion, settings: &FetchSettings, specs: &[RefSpec]) -> Self {
        let mut options = Vec::new();
        if settings.show_progress && version.supports_progress() {
            options.push("--progress".to_string());
        } else {
            options.push("-q".to_string());
        }
        if let Some(depth) = settings.depth {
            options.push(format!("--depth={}", depth));
        }
        if !settings.fetch_tags {
            options.push("--no-tags".to_string());
        }
        if version.supports_recurse_submodules() {
            options.push("--recurse-submodules=no".to_string());
        }

        let specs: Vec<String> = specs.iter().map(RefSpec::to_string).collect();
        if specs.len() > 1 && version.fetch_supports_stdin() {
            options.push("--stdin".to_string());
            let mut input = specs.join("\n");
            input.push('\n');
            Self {
                options,
                ref_specs: Vec::new(),
                stdin: Some(input),
            }
        } else {
            Self {
                options,
                ref_specs: specs,
                stdin: None,
            }
        }
    }
}

/// Refs named in "couldn't find remote ref" messages of git stderr.
pub fn missing_remote_refs(stderr: &str) -> Vec<String> {
    const MARKER: &str = "couldn't find remote ref ";
    stderr
        .lines()
        .filter_map(|line| {
            let pos = line.find(MARKER)?;
            let name = line[pos + MARKER.len()..].trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// `git fetch` through the native executable.
///
/// When a refspec source disappeared from the remote, the refspecs are
/// narrowed to the refs still advertised and the fetch is repeated once.
pub struct NativeFetchCommand {
    detector: Arc<GitDetector>,
    key_manager: Arc<dyn VcsRootSshKeyManager>,
    config: Arc<ServerConfig>,
    refresher: Option<Arc<dyn LsRemoteCommand>>,
}

impl NativeFetchCommand {
    pub fn new(
        detector: Arc<GitDetector>,
        key_manager: Arc<dyn VcsRootSshKeyManager>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            detector,
            key_manager,
            config,
            refresher: None,
        }
    }

    pub fn with_ref_specs_refresher(mut self, ls_remote: Arc<dyn LsRemoteCommand>) -> Self {
        self.refresher = Some(ls_remote);
        self
    }

    async fn run_fetch(
        &self,
        git_path: &str,
        arguments: &FetchArguments,
        repository_dir: &Path,
        auth: &AuthEnv,
    ) -> VcsResult<()> {
        let mut cmd = GitCommandLine::new(git_path)
            .with_working_directory(repository_dir)
            .arg("fetch")
            .args(arguments.options.iter().cloned())
            .masked_arg(&auth.remote_url, &auth.display_url)
            .args(arguments.ref_specs.iter().cloned())
            .envs(auth.env_vars.iter().cloned())
            .timeout(self.config.fetch_timeout());
        if let Some(input) = &arguments.stdin {
            cmd = cmd.stdin(input.clone());
        }

        let cmd = &cmd;
        let op = Timed::new(
            Retry::new(operation(|| cmd.run()), self.config.retry_policy())
                .with_description(format!("git fetch {}", auth.display_url)),
            "git fetch",
            format!("{} into {}", auth.display_url, repository_dir.display()),
        );
        op.call().await.map(|_| ())
    }

    /// Keeps the refspecs whose source is still advertised by the remote.
    async fn refresh_ref_specs(
        &self,
        ls_remote: &dyn LsRemoteCommand,
        root: &VcsRootConfig,
        specs: &[RefSpec],
    ) -> VcsResult<(Vec<RefSpec>, Vec<String>)> {
        let advertised: HashSet<String> = ls_remote
            .ls_remote(root, &LsRemoteOptions::new().with_peel_refs(false))
            .await?
            .into_iter()
            .map(|r| r.ref_name().to_string())
            .collect();

        let (kept, dropped): (Vec<RefSpec>, Vec<RefSpec>) = specs
            .iter()
            .cloned()
            .partition(|s| s.is_wildcard() || s.is_negative() || advertised.contains(s.source()));
        Ok((kept, dropped.iter().map(|s| s.source().to_string()).collect()))
    }
}

#[async_trait]
impl FetchCommand for NativeFetchCommand {
    #[instrument(skip_all, fields(root = %root.id, dir = %repository_dir.display()))]
    async fn fetch(
        &self,
        repository_dir: &Path,
        root: &VcsRootConfig,
        settings: &FetchSettings,
    ) -> VcsResult<()> {
        let git = self.detector.detect().await?;
        let auth = AuthEnv::build(root, self.key_manager.as_ref(), &self.config.ssh)?;
        let mut specs = settings.effective_ref_specs(git.version.supports_negative_refspecs());
        if specs.is_empty() {
            debug!("Nothing to fetch for {}", root.describe());
            return Ok(());
        }

        let mut refreshed = false;
        loop {
            let arguments = FetchArguments::build(&git.version, settings, &specs);
            let error = match self
                .run_fetch(&git.path, &arguments, repository_dir, &auth)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            let refresher = match &self.refresher {
                Some(refresher) if !refreshed && error.is_remote_ref_not_found() => refresher,
                _ => return Err(error),
            };
            refreshed = true;

            if let VcsError::CommandFailed { stderr, .. } = &error {
                warn!(
                    "Remote refs disappeared during fetch of {}: {}",
                    auth.display_url,
                    missing_remote_refs(stderr).join(", ")
                );
            }

            let (kept, dropped) = self
                .refresh_ref_specs(refresher.as_ref(), root, &specs)
                .await?;
            if dropped.is_empty() {
                return Err(error);
            }
            if kept.is_empty() {
                return Err(VcsError::remote_refs_not_found(dropped));
            }
            info!(
                "Repeating fetch of {} without refs missing in the remote repository: {}",
                auth.display_url,
                dropped.join(", ")
            );
            specs = kept;
        }
    }
}
