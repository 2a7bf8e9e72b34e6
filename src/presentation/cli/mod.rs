pub mod commands;

use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::domain::entities::server_config::ServerConfig;
use crate::domain::entities::vcs_root::{AuthSettings, VcsRootConfig};
use crate::infrastructure::filesystem::config_store::ConfigStore;
use crate::infrastructure::git::repo_operations::GitRepoOperationsImpl;
use crate::infrastructure::ssh::key_manager::{
    FileSystemSshKeyManager, NoSshKeyManager, VcsRootSshKeyManager,
};
use commands::{
    detect_git::DetectGitCommand, fetch::FetchCommandHandler, load_commits::LoadCommitsCommand,
    ls_remote::LsRemoteCommandHandler, test_connection::TestConnectionCommand,
};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output (default)
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

/// gitvcs - fetch and ls-remote for build server git roots
#[derive(Debug, Parser)]
#[command(name = "gitvcs")]
#[command(about = "Fetch and list refs of remote git repositories")]
#[command(version)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    " ",
    env!("BUILD_DATE"),
    " ",
    env!("BUILD_TARGET"),
    ")"
))]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, global = true, env = "GITVCS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the git executable
    #[arg(long, global = true, env = "GITVCS_GIT_PATH")]
    pub git_path: Option<String>,

    /// Use libgit2 even when native git is available
    #[arg(long, global = true)]
    pub libgit2: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Credentials shared by the commands talking to a remote
#[derive(Debug, Clone, Default, Args)]
pub struct AuthArgs {
    /// Private key file for SSH authentication
    #[arg(long, conflicts_with_all = ["key_name", "password"])]
    pub key_file: Option<PathBuf>,

    /// Name of an uploaded key stored in the configured keys directory
    #[arg(long, conflicts_with = "password")]
    pub key_name: Option<String>,

    /// Passphrase of the private key
    #[arg(long)]
    pub passphrase: Option<String>,

    /// User name
    #[arg(long)]
    pub username: Option<String>,

    /// Password for HTTP(S) or SSH password authentication
    #[arg(long, env = "GITVCS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Do not verify the SSH host key
    #[arg(long)]
    pub ignore_known_hosts: bool,
}

impl AuthArgs {
    pub fn to_auth_settings(&self) -> AuthSettings {
        let auth = if let Some(path) = &self.key_file {
            AuthSettings::private_key_file(path, self.passphrase.clone())
        } else if let Some(name) = &self.key_name {
            AuthSettings::uploaded_key(name, self.passphrase.clone())
        } else if let Some(password) = &self.password {
            AuthSettings::password(self.username.clone().unwrap_or_default(), password)
        } else {
            AuthSettings::anonymous()
        };

        let auth = match &self.username {
            Some(username) if self.password.is_none() => auth.with_username(username),
            _ => auth,
        };
        auth.with_ignore_known_hosts(self.ignore_known_hosts)
    }

    /// Repository configuration for `url` using these credentials
    pub fn root_for(&self, url: &str) -> VcsRootConfig {
        VcsRootConfig::new(url, url).with_auth(self.to_auth_settings())
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List refs advertised by remote repositories
    LsRemote {
        /// Remote repository URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Only list tags
        #[arg(long)]
        tags: bool,

        /// Only list refs matching these patterns
        #[arg(short, long)]
        pattern: Vec<String>,

        /// Number of repositories queried in parallel
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Output format (text, json, yaml)
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Fetch refs into a local repository
    Fetch {
        /// Local repository, created as a bare repository when missing
        repo_dir: PathBuf,

        /// Remote repository URL
        url: String,

        /// Refspecs to fetch
        #[arg(long = "refspec")]
        refspecs: Vec<String>,

        /// Fetch all refs
        #[arg(long)]
        all: bool,

        /// Do not fetch tags
        #[arg(long)]
        no_tags: bool,

        /// Fetch only the given number of commits
        #[arg(long)]
        depth: Option<u32>,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Make sure the given revisions are present in a local repository
    LoadCommits {
        /// Local repository, created as a bare repository when missing
        repo_dir: PathBuf,

        /// Remote repository URL
        url: String,

        /// Revisions as REF=COMMIT
        #[arg(required = true)]
        revisions: Vec<String>,

        /// Report tags of the repository
        #[arg(long)]
        report_tags: bool,

        /// Output format (text, json, yaml)
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Detect the git executable and its version
    DetectGit,

    /// Check that a remote repository is reachable and has the default branch
    TestConnection {
        /// Remote repository URL
        url: String,

        /// Default branch
        #[arg(short, long, default_value = "refs/heads/main")]
        branch: String,

        /// Output format (text, json, yaml)
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,

        #[command(flatten)]
        auth: AuthArgs,
    },
}

/// CLI application runner
pub struct CliApp {
    cli: Cli,
}

impl Default for CliApp {
    fn default() -> Self {
        Self::new()
    }
}

impl CliApp {
    pub fn new() -> Self {
        Self { cli: Cli::parse() }
    }

    pub fn from_cli(cli: Cli) -> Self {
        Self { cli }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        colored::control::set_override(!self.cli.no_color);
        self.init_logging();

        match self.handle_command().await {
            Ok(_) => Ok(()),
            Err(e) => {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
                exit(1);
            }
        }
    }

    fn init_logging(&self) {
        let default_level = if self.cli.verbose { "debug" } else { "warn" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("gitvcs={}", default_level)));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(!self.cli.no_color)
            .try_init();
    }

    /// Server configuration with command line overrides applied
    pub fn load_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = ConfigStore::new()
            .load_or_default(self.cli.config.as_deref())
            .context("Failed to load configuration")?;
        if let Some(git_path) = &self.cli.git_path {
            config = config.with_git_path(git_path);
        }
        if self.cli.libgit2 {
            config = config.with_native_operations(false);
            config.native_operations.url_overrides.clear();
        }
        Ok(config)
    }

    fn operations(&self, config: &ServerConfig) -> Arc<GitRepoOperationsImpl> {
        let key_manager: Arc<dyn VcsRootSshKeyManager> = match &config.ssh.keys_dir {
            Some(dir) => Arc::new(FileSystemSshKeyManager::new(dir)),
            None => Arc::new(NoSshKeyManager),
        };
        Arc::new(GitRepoOperationsImpl::new(config.clone(), key_manager))
    }

    async fn handle_command(&self) -> anyhow::Result<()> {
        let config = self.load_config()?;
        let operations = self.operations(&config);

        match &self.cli.command {
            Commands::LsRemote {
                urls,
                tags,
                pattern,
                jobs,
                output,
                auth,
            } => {
                let roots = urls.iter().map(|url| auth.root_for(url)).collect();
                LsRemoteCommandHandler::new(roots, *tags, pattern.clone(), *jobs, *output)
                    .execute(operations)
                    .await
            }
            Commands::Fetch {
                repo_dir,
                url,
                refspecs,
                all,
                no_tags,
                depth,
                auth,
            } => {
                FetchCommandHandler::new(
                    repo_dir.clone(),
                    auth.root_for(url),
                    refspecs.clone(),
                    *all,
                    !*no_tags,
                    *depth,
                    self.cli.verbose,
                )
                .execute(operations, &config)
                .await
            }
            Commands::LoadCommits {
                repo_dir,
                url,
                revisions,
                report_tags,
                output,
                auth,
            } => {
                let root = auth.root_for(url).with_report_tags(*report_tags);
                LoadCommitsCommand::new(repo_dir.clone(), root, revisions.clone(), *output)
                    .execute(operations, &config)
                    .await
            }
            Commands::DetectGit => DetectGitCommand::new().execute(operations).await,
            Commands::TestConnection {
                url,
                branch,
                output,
                auth,
            } => {
                let root = auth.root_for(url).with_branch(branch);
                TestConnectionCommand::new(root, *output)
                    .execute(operations)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::vcs_root::AuthMethod;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gitvcs").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_ls_remote() {
        let cli = parse(&[
            "ls-remote",
            "https://example.com/a.git",
            "https://example.com/b.git",
            "--tags",
            "-j",
            "2",
            "-o",
            "json",
        ]);
        match cli.command {
            Commands::LsRemote {
                urls,
                tags,
                jobs,
                output,
                ..
            } => {
                assert_eq!(urls.len(), 2);
                assert!(tags);
                assert_eq!(jobs, Some(2));
                assert_eq!(output, OutputFormat::Json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_ls_remote_requires_url() {
        assert!(Cli::try_parse_from(["gitvcs", "ls-remote"]).is_err());
    }

    #[test]
    fn test_parse_load_commits() {
        let cli = parse(&[
            "load-commits",
            "/tmp/clone",
            "https://example.com/a.git",
            "main=0123456789abcdef0123456789abcdef01234567",
            "--report-tags",
        ]);
        match cli.command {
            Commands::LoadCommits {
                revisions,
                report_tags,
                ..
            } => {
                assert_eq!(revisions.len(), 1);
                assert!(report_tags);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_key_file_conflicts_with_password() {
        assert!(Cli::try_parse_from([
            "gitvcs",
            "fetch",
            "repo",
            "git@example.com:a.git",
            "--key-file",
            "id_rsa",
            "--password",
            "secret",
        ])
        .is_err());
    }

    #[test]
    fn test_auth_args_to_settings() {
        let args = AuthArgs {
            key_name: Some("deploy".to_string()),
            passphrase: Some("pass".to_string()),
            ..Default::default()
        };
        let auth = args.to_auth_settings();
        assert_eq!(auth.method, AuthMethod::UploadedKey);
        assert_eq!(auth.uploaded_key.as_deref(), Some("deploy"));

        let args = AuthArgs {
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let auth = args.to_auth_settings();
        assert_eq!(auth.method, AuthMethod::Password);
        assert_eq!(auth.username.as_deref(), Some("user"));

        assert_eq!(AuthArgs::default().to_auth_settings().method, AuthMethod::Anonymous);
    }

    #[test]
    fn test_global_flags_override_config() {
        let app = CliApp::from_cli(parse(&["--git-path", "/opt/git", "--libgit2", "detect-git"]));
        let config = app.load_config().unwrap();
        assert_eq!(config.git_path, "/opt/git");
        assert!(!config.native_operations.enabled);
    }
}
