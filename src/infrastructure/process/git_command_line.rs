//! Runner for the native `git` executable.
//!
//! Commands never prompt: `GIT_TERMINAL_PROMPT=0` is always set and stdin is
//! closed unless input is provided explicitly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::common::error::VcsError;
use crate::common::result::VcsResult;

/// One command line argument with the text used for logs.
#[derive(Debug, Clone)]
struct Arg {
    value: String,
    display: String,
}

/// Result of a finished git process.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A git invocation under construction.
#[derive(Debug, Clone)]
pub struct GitCommandLine {
    executable: String,
    working_directory: Option<PathBuf>,
    args: Vec<Arg>,
    env: HashMap<String, String>,
    input: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl GitCommandLine {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            working_directory: None,
            args: Vec::new(),
            env: HashMap::new(),
            input: None,
            timeout: None,
        }
    }

    pub fn with_working_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        let value = arg.into();
        self.args.push(Arg {
            display: value.clone(),
            value,
        });
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Adds an argument that must not show up in logs, e.g. a URL with credentials.
    pub fn masked_arg(mut self, value: impl Into<String>, display: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            display: display.into(),
        });
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Data written to the process stdin, which is closed afterwards.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Name of the git subcommand, used in error messages.
    pub fn command_name(&self) -> &str {
        self.args
            .iter()
            .map(|a| a.value.as_str())
            .find(|a| !a.starts_with('-'))
            .unwrap_or("git")
    }

    /// Command line as it is written to logs.
    pub fn display(&self) -> String {
        let mut line = self.executable.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.display);
        }
        line
    }

    pub fn env_vars(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Runs the command and fails with [`VcsError::CommandFailed`] on a non-zero exit code.
    #[instrument(skip(self), fields(command = %self.display()))]
    pub async fn run(&self) -> VcsResult<ExecResult> {
        let result = self.execute().await?;
        if !result.success() {
            return Err(VcsError::command_failed(
                self.command_name(),
                result.exit_code,
                &result.stdout,
                &result.stderr,
            ));
        }
        Ok(result)
    }

    /// Runs the command and returns its result whatever the exit code.
    pub async fn execute(&self) -> VcsResult<ExecResult> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.executable);
        cmd.args(self.args.iter().map(|a| &a.value));
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.envs(&self.env);
        cmd.stdin(if self.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!("running {}", self.display());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VcsError::git_not_found_with_source(
                    format!("cannot run '{}'", self.executable),
                    e,
                )
            } else {
                VcsError::internal_error_with_source(
                    format!("failed to start '{}'", self.display()),
                    e,
                )
            }
        })?;

        let input = self.input.clone();
        let wait = async move {
            if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(output) => output,
                Err(_) => {
                    debug!("{} timed out after {:?}", self.display(), limit);
                    return Err(VcsError::timeout(limit));
                }
            },
            None => wait.await,
        }
        .map_err(|e| {
            VcsError::internal_error_with_source(format!("failed to run '{}'", self.display()), e)
        })?;

        let result = ExecResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
        };
        debug!(
            "{} exited with {:?} in {}ms",
            self.command_name(),
            result.exit_code,
            result.duration.as_millis()
        );
        Ok(result)
    }
}
