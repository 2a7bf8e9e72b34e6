//! Credentials for the native git backend.
//!
//! Private keys are handed to ssh through `GIT_SSH_COMMAND` pointing at a
//! temporary key file; passphrases and ssh passwords go through an askpass
//! script. Both files are removed when the [`AuthEnv`] is dropped, so it must
//! outlive the git process.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::debug;

use crate::common::error::VcsError;
use crate::common::result::{OptionExt, ResultExt, VcsResult};
use crate::domain::entities::server_config::SshConfig;
use crate::domain::entities::vcs_root::{AuthMethod, AuthSettings, VcsRootConfig};
use crate::infrastructure::ssh::key_manager::{uploaded_key_name, VcsRootSshKeyManager};

/// Options that shape the `GIT_SSH_COMMAND` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshCommandOptions {
    pub key_path: Option<PathBuf>,
    pub method: AuthMethod,
    pub ignore_known_hosts: bool,
    pub extra_options: Option<String>,
    pub debug: bool,
}

/// Builds the ssh command line used as `GIT_SSH_COMMAND`.
pub fn ssh_command(options: &SshCommandOptions) -> String {
    let mut command = String::from("ssh");
    if let Some(key_path) = &options.key_path {
        let path = key_path.to_string_lossy().replace('\\', "/");
        command.push_str(&format!(" -i \"{}\"", path));
    }
    if options.ignore_known_hosts {
        command.push_str(
            " -o \"StrictHostKeyChecking=no\" -o \"UserKnownHostsFile=/dev/null\" -o \"GlobalKnownHostsFile=/dev/null\"",
        );
    }
    if options.method.is_key_auth() {
        command.push_str(
            " -o \"PreferredAuthentications=publickey\" -o \"PasswordAuthentication=no\" -o \"KbdInteractiveAuthentication=no\"",
        );
    } else if options.method == AuthMethod::Password {
        command.push_str(
            " -o \"PreferredAuthentications=password,keyboard-interactive\" -o \"PubkeyAuthentication=no\"",
        );
    }
    command.push_str(" -o \"IdentitiesOnly=yes\"");
    if let Some(extra) = options.extra_options.as_deref().map(str::trim) {
        if !extra.is_empty() {
            command.push(' ');
            command.push_str(extra);
        }
    }
    if options.debug {
        command.push_str(" -vvv");
    }
    command
}

/// Whether host keys of the remote are accepted without checking known_hosts.
///
/// Roots authenticating with a configured key always skip the check as long
/// as the server allows it.
pub fn ignores_known_hosts(auth: &AuthSettings, ssh: &SshConfig) -> bool {
    ssh.ignore_known_hosts
        && (auth.ignore_known_hosts
            || matches!(
                auth.method,
                AuthMethod::UploadedKey | AuthMethod::PrivateKeyFile
            ))
}

/// Escapes a secret for a single-quoted shell string.
pub fn shell_escape(secret: &str) -> String {
    secret.replace('\'', "'\\''")
}

/// Environment and remote URL for one native git invocation.
#[derive(Debug)]
pub struct AuthEnv {
    pub env_vars: Vec<(String, String)>,
    /// URL passed to git, possibly with embedded credentials.
    pub remote_url: String,
    /// URL safe to write to logs.
    pub display_url: String,
    key_file_guard: Option<TempPath>,
    askpass_guard: Option<TempPath>,
}

impl AuthEnv {
    /// Environment for a remote that needs no credentials.
    pub fn plain(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            env_vars: Vec::new(),
            display_url: url.clone(),
            remote_url: url,
            key_file_guard: None,
            askpass_guard: None,
        }
    }

    pub fn build(
        root: &VcsRootConfig,
        key_manager: &dyn VcsRootSshKeyManager,
        ssh: &SshConfig,
    ) -> VcsResult<Self> {
        let url = root.repository_url()?;
        let auth = root.auth.normalized();
        let display_url = url.masked();

        let remote_url = match auth.method {
            AuthMethod::Password if url.is_http() => {
                url.with_credentials(auth.username.as_deref(), auth.password.as_deref())
            }
            _ if auth.username.is_some() => url.with_credentials(auth.username.as_deref(), None),
            _ => url.as_str().to_string(),
        };

        let mut env = Self {
            env_vars: Vec::new(),
            remote_url,
            display_url,
            key_file_guard: None,
            askpass_guard: None,
        };

        if url.is_ssh() {
            env.configure_ssh(root, &auth, key_manager, ssh)?;
        }
        Ok(env)
    }

    fn configure_ssh(
        &mut self,
        root: &VcsRootConfig,
        auth: &AuthSettings,
        key_manager: &dyn VcsRootSshKeyManager,
        ssh: &SshConfig,
    ) -> VcsResult<()> {
        let key_path = match auth.method {
            AuthMethod::UploadedKey => {
                let name = uploaded_key_name(root).unwrap_or_default().to_string();
                let key = key_manager.get_key(root).ok_or_else(|| {
                    VcsError::authentication(
                        &self.display_url,
                        format!("Failed to locate uploaded SSH key '{}'", name),
                    )
                })?;
                let file = write_private_key(&key)?;
                let path = file.to_path_buf();
                self.key_file_guard = Some(file);
                Some(path)
            }
            AuthMethod::PrivateKeyFile => {
                let path = auth.private_key_path.clone().ok_or_config_error(
                    "Authentication method is \"Private Key\", but no private key path provided",
                )?;
                if !path.is_file() {
                    return Err(VcsError::authentication(
                        &self.display_url,
                        format!("Private key file {} does not exist", path.display()),
                    ));
                }
                // ssh refuses keys readable by others, so work on a private copy
                let key = std::fs::read_to_string(&path)
                    .with_filesystem_error("Failed to read private key file", Some(path.clone()))?;
                let file = write_private_key(&key)?;
                let copy = file.to_path_buf();
                self.key_file_guard = Some(file);
                Some(copy)
            }
            _ => None,
        };

        let options = SshCommandOptions {
            key_path,
            method: auth.method,
            ignore_known_hosts: ignores_known_hosts(auth, ssh),
            extra_options: ssh.command_options.clone(),
            debug: ssh.debug,
        };

        if options.key_path.is_some()
            || options.ignore_known_hosts
            || options.extra_options.is_some()
            || options.debug
            || auth.method != AuthMethod::Anonymous
        {
            let command = ssh_command(&options);
            debug!("GIT_SSH_COMMAND={}", command);
            self.env_vars.push(("GIT_SSH_COMMAND".to_string(), command));
        }

        let secret = match auth.method {
            AuthMethod::Password => auth.password.as_deref(),
            AuthMethod::PrivateKeyFile | AuthMethod::UploadedKey => auth.passphrase.as_deref(),
            _ => None,
        };
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            let script = write_askpass_script(secret)?;
            self.env_vars.push((
                "SSH_ASKPASS".to_string(),
                script.to_string_lossy().into_owned(),
            ));
            self.env_vars
                .push(("SSH_ASKPASS_REQUIRE".to_string(), "force".to_string()));
            self.env_vars.push(("DISPLAY".to_string(), ":0".to_string()));
            self.askpass_guard = Some(script);
        }
        Ok(())
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.key_file_guard.as_deref()
    }
}

/// Writes the key to a temporary file readable only by the current user.
fn write_private_key(key: &str) -> VcsResult<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("gitvcs-key-")
        .tempfile()
        .with_filesystem_error("Failed to create temporary key file", None)?;
    restrict_permissions(file.path(), 0o600)?;
    file.write_all(key.as_bytes())
        .with_filesystem_error("Failed to write temporary key file", None)?;
    if !key.ends_with('\n') {
        file.write_all(b"\n")
            .with_filesystem_error("Failed to write temporary key file", None)?;
    }
    file.flush()
        .with_filesystem_error("Failed to write temporary key file", None)?;
    Ok(file.into_temp_path())
}

fn write_askpass_script(secret: &str) -> VcsResult<TempPath> {
    #[cfg(unix)]
    let (suffix, script) = (
        ".sh",
        format!("#!/bin/sh\necho '{}'\n", shell_escape(secret)),
    );
    #[cfg(not(unix))]
    let (suffix, script) = (".bat", format!("@echo off\r\necho {}\r\n", secret));

    let mut file = tempfile::Builder::new()
        .prefix("gitvcs-askpass-")
        .suffix(suffix)
        .tempfile()
        .with_filesystem_error("Failed to create askpass script", None)?;
    file.write_all(script.as_bytes())
        .with_filesystem_error("Failed to write askpass script", None)?;
    file.flush()
        .with_filesystem_error("Failed to write askpass script", None)?;
    let path = file.into_temp_path();
    restrict_permissions(&path, 0o700)?;
    Ok(path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> VcsResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_filesystem_error("Failed to set permissions", Some(path.to_path_buf()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> VcsResult<()> {
    Ok(())
}
