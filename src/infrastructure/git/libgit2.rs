//! Remote operations through libgit2, used when native git is disabled or unavailable.
//!
//! libgit2 calls block, so every call runs on the blocking pool. A timed out
//! call keeps its thread until libgit2 returns; the [`CancelFlag`] makes the
//! remote callbacks abort the transfer so the thread is released early.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use git2::{
    AutotagOption, CertificateCheckStatus, Cred, CredentialType, Direction, FetchOptions, Remote,
    RemoteCallbacks, Repository,
};
use tracing::{debug, instrument};

use crate::common::error::VcsError;
use crate::common::operation::{operation, Retry, Timed, VcsOperation};
use crate::common::result::async_helpers::{run_blocking, with_timeout};
use crate::common::result::{OptionExt, VcsResult};
use crate::domain::entities::fetch_settings::FetchSettings;
use crate::domain::entities::server_config::{ServerConfig, SshConfig};
use crate::domain::entities::vcs_root::{AuthMethod, VcsRootConfig};
use crate::domain::value_objects::ref_commit::RefCommit;
use crate::infrastructure::git::auth::ignores_known_hosts;
use crate::infrastructure::git::fetch::FetchCommand;
use crate::infrastructure::git::ls_remote::{collect_advertised_refs, LsRemoteCommand, LsRemoteOptions};
use crate::infrastructure::ssh::key_manager::{uploaded_key_name, VcsRootSshKeyManager};

/// libgit2 asks for credentials again after a rejected attempt.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Shared flag telling a running libgit2 call to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`VcsError::Cancelled`] once the flag is set.
    pub fn check(&self) -> VcsResult<()> {
        if self.is_cancelled() {
            Err(VcsError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Guard that cancels when dropped, i.e. when the awaiting future completes,
    /// times out or is dropped.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

pub struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn cancelled_error() -> git2::Error {
    git2::Error::new(
        git2::ErrorCode::User,
        git2::ErrorClass::Callback,
        "Operation cancelled",
    )
}

/// Credentials resolved for one repository, owned so they can move to a blocking task.
#[derive(Clone)]
pub struct Libgit2Credentials {
    method: AuthMethod,
    username: Option<String>,
    password: Option<String>,
    key_path: Option<PathBuf>,
    key: Option<String>,
    passphrase: Option<String>,
    ignore_known_hosts: bool,
}

impl std::fmt::Debug for Libgit2Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Libgit2Credentials")
            .field("method", &self.method)
            .field("username", &self.username)
            .field("key_path", &self.key_path)
            .field("has_key", &self.key.is_some())
            .field("ignore_known_hosts", &self.ignore_known_hosts)
            .finish()
    }
}

impl Libgit2Credentials {
    pub fn for_root(
        root: &VcsRootConfig,
        key_manager: &dyn VcsRootSshKeyManager,
        ssh: &SshConfig,
    ) -> VcsResult<Self> {
        let auth = root.auth.normalized();
        let key = if auth.method == AuthMethod::UploadedKey {
            let name = uploaded_key_name(root).unwrap_or_default().to_string();
            let key = key_manager.get_key(root).ok_or_else(|| {
                VcsError::authentication(
                    root.describe(),
                    format!("Failed to locate uploaded SSH key '{}'", name),
                )
            })?;
            Some(key)
        } else {
            None
        };
        let key_path = match auth.method {
            AuthMethod::PrivateKeyFile => Some(auth.private_key_path.clone().ok_or_config_error(
                "Authentication method is \"Private Key\", but no private key path provided",
            )?),
            _ => None,
        };

        Ok(Self {
            method: auth.method,
            username: auth.username.clone(),
            password: auth.password.clone(),
            key_path,
            key,
            passphrase: auth.passphrase.clone(),
            ignore_known_hosts: ignores_known_hosts(&auth, ssh),
        })
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }

    pub fn ignores_known_hosts(&self) -> bool {
        self.ignore_known_hosts
    }

    fn credential(
        &self,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        let user = self
            .username
            .as_deref()
            .or(username_from_url)
            .unwrap_or("git");

        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(user);
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            let passphrase = self.passphrase.as_deref().filter(|p| !p.is_empty());
            match self.method {
                AuthMethod::UploadedKey => {
                    if let Some(key) = &self.key {
                        return Cred::ssh_key_from_memory(user, None, key, passphrase);
                    }
                }
                AuthMethod::PrivateKeyFile => {
                    if let Some(path) = &self.key_path {
                        return Cred::ssh_key(user, None, path, passphrase);
                    }
                }
                AuthMethod::PrivateKeyDefault | AuthMethod::Anonymous => {
                    return Cred::ssh_key_from_agent(user);
                }
                AuthMethod::Password => {}
            }
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) && self.method == AuthMethod::Password
        {
            return Cred::userpass_plaintext(user, self.password.as_deref().unwrap_or_default());
        }
        Err(git2::Error::from_str(&format!(
            "No credentials for authentication method {}",
            self.method.display_name()
        )))
    }

    /// Answers the `attempt`-th credential request of one connection.
    fn authenticate(
        &self,
        attempt: u32,
        cancel: &CancelFlag,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        if cancel.is_cancelled() {
            return Err(cancelled_error());
        }
        if attempt > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::new(
                git2::ErrorCode::Auth,
                git2::ErrorClass::Ssh,
                "Authentication failed",
            ));
        }
        self.credential(username_from_url, allowed)
    }

    pub fn callbacks<'a>(&'a self, cancel: &'a CancelFlag) -> RemoteCallbacks<'a> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempts = 0;
        callbacks.credentials(move |_url, username_from_url, allowed| {
            attempts += 1;
            self.authenticate(attempts, cancel, username_from_url, allowed)
        });
        // returning false aborts the transfer with GIT_EUSER
        callbacks.transfer_progress(move |_progress| !cancel.is_cancelled());
        callbacks.sideband_progress(move |_data| !cancel.is_cancelled());
        if self.ignore_known_hosts {
            callbacks.certificate_check(move |_cert, _host| {
                if cancel.is_cancelled() {
                    Err(cancelled_error())
                } else {
                    Ok(CertificateCheckStatus::CertificateOk)
                }
            });
        }
        callbacks
    }
}

fn list_remote(
    url: &str,
    credentials: &Libgit2Credentials,
    options: &LsRemoteOptions,
    cancel: &CancelFlag,
) -> VcsResult<Vec<RefCommit>> {
    cancel.check()?;
    let mut remote = Remote::create_detached(url).map_err(|e| VcsError::from_git2(url, e))?;
    let connection = remote
        .connect_auth(Direction::Fetch, Some(credentials.callbacks(cancel)), None)
        .map_err(|e| VcsError::from_git2(url, e))?;
    let advertised: Vec<(String, String)> = connection
        .list()
        .map_err(|e| VcsError::from_git2(url, e))?
        .iter()
        .map(|head| (head.oid().to_string(), head.name().to_string()))
        .collect();
    drop(connection);
    cancel.check()?;

    Ok(collect_advertised_refs(advertised, options.peel_refs)?
        .into_iter()
        .filter(|r| options.accepts(r.ref_name()))
        .collect())
}

fn fetch_into(
    repository_dir: &Path,
    url: &str,
    credentials: &Libgit2Credentials,
    settings: &FetchSettings,
    cancel: &CancelFlag,
) -> VcsResult<()> {
    cancel.check()?;
    let repo = Repository::open(repository_dir).map_err(|e| {
        VcsError::git_error_with_source(
            format!("Failed to open repository at {}", repository_dir.display()),
            e,
        )
    })?;
    let mut remote = repo
        .remote_anonymous(url)
        .map_err(|e| VcsError::from_git2(url, e))?;

    let specs: Vec<String> = settings
        .effective_ref_specs(false)
        .iter()
        .map(ToString::to_string)
        .collect();
    if specs.is_empty() {
        return Ok(());
    }
    if let Some(depth) = settings.depth {
        debug!("Shallow fetch (depth {}) is not supported by libgit2, fetching full history", depth);
    }

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(credentials.callbacks(cancel));
    fetch_options.download_tags(if settings.fetch_tags {
        AutotagOption::Auto
    } else {
        AutotagOption::None
    });

    remote
        .fetch(&specs, Some(&mut fetch_options), None)
        .map_err(|e| VcsError::from_git2(url, e))
}

/// `ls-remote` through libgit2.
pub struct Libgit2LsRemoteCommand {
    key_manager: Arc<dyn VcsRootSshKeyManager>,
    config: Arc<ServerConfig>,
}

impl Libgit2LsRemoteCommand {
    pub fn new(key_manager: Arc<dyn VcsRootSshKeyManager>, config: Arc<ServerConfig>) -> Self {
        Self {
            key_manager,
            config,
        }
    }
}

#[async_trait]
impl LsRemoteCommand for Libgit2LsRemoteCommand {
    #[instrument(skip_all, fields(root = %root.id))]
    async fn ls_remote(
        &self,
        root: &VcsRootConfig,
        options: &LsRemoteOptions,
    ) -> VcsResult<Vec<RefCommit>> {
        let url = root.repository_url()?;
        let credentials =
            Libgit2Credentials::for_root(root, self.key_manager.as_ref(), &self.config.ssh)?;
        let fetch_url = url.as_str().to_string();
        let timeout = self.config.ls_remote_timeout();

        let op = Timed::new(
            Retry::new(
                operation(|| {
                    let url = fetch_url.clone();
                    let credentials = credentials.clone();
                    let options = options.clone();
                    let cancel = CancelFlag::new();
                    let guard = cancel.cancel_on_drop();
                    async move {
                        let _guard = guard;
                        with_timeout(
                            run_blocking("ls-remote", move || {
                                list_remote(&url, &credentials, &options, &cancel)
                            }),
                            timeout,
                        )
                        .await
                    }
                }),
                self.config.retry_policy(),
            )
            .with_description(format!("ls-remote {}", url.masked())),
            "libgit2 ls-remote",
            url.masked(),
        );
        op.call().await
    }
}

/// `fetch` through libgit2. Depth is ignored.
pub struct Libgit2FetchCommand {
    key_manager: Arc<dyn VcsRootSshKeyManager>,
    config: Arc<ServerConfig>,
}

impl Libgit2FetchCommand {
    pub fn new(key_manager: Arc<dyn VcsRootSshKeyManager>, config: Arc<ServerConfig>) -> Self {
        Self {
            key_manager,
            config,
        }
    }
}

#[async_trait]
impl FetchCommand for Libgit2FetchCommand {
    #[instrument(skip_all, fields(root = %root.id, dir = %repository_dir.display()))]
    async fn fetch(
        &self,
        repository_dir: &Path,
        root: &VcsRootConfig,
        settings: &FetchSettings,
    ) -> VcsResult<()> {
        let url = root.repository_url()?;
        let credentials =
            Libgit2Credentials::for_root(root, self.key_manager.as_ref(), &self.config.ssh)?;
        let fetch_url = url.as_str().to_string();
        let timeout = self.config.fetch_timeout();

        let op = Timed::new(
            Retry::new(
                operation(|| {
                    let dir = repository_dir.to_path_buf();
                    let url = fetch_url.clone();
                    let credentials = credentials.clone();
                    let settings = settings.clone();
                    let cancel = CancelFlag::new();
                    let guard = cancel.cancel_on_drop();
                    async move {
                        let _guard = guard;
                        with_timeout(
                            run_blocking("fetch", move || {
                                fetch_into(&dir, &url, &credentials, &settings, &cancel)
                            }),
                            timeout,
                        )
                        .await
                    }
                }),
                self.config.retry_policy(),
            )
            .with_description(format!("fetch {}", url.masked())),
            "libgit2 fetch",
            format!("{} into {}", url.masked(), repository_dir.display()),
        );
        op.call().await
    }
}
