//! Mock services for testing
//!
//! In-memory git commands that can be plugged into the use cases to
//! isolate them from real remotes.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gitvcs::common::{VcsError, VcsResult};
use gitvcs::domain::entities::{FetchSettings, VcsRootConfig};
use gitvcs::domain::value_objects::RefCommit;
use gitvcs::infrastructure::git::LsRemoteOptions;
use gitvcs::infrastructure::{FetchCommand, GitRepoOperations, LsRemoteCommand};

/// ls-remote returning a fixed set of refs, or an error for URLs containing `fail_on`.
#[derive(Default)]
pub struct StaticLsRemote {
    refs: Vec<RefCommit>,
    fail_on: Option<String>,
    calls: AtomicUsize,
}

impl StaticLsRemote {
    pub fn new(refs: &[(&str, &str)]) -> Self {
        Self {
            refs: refs
                .iter()
                .map(|(name, commit)| RefCommit::tip(*name, *commit).expect("Invalid ref"))
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, url_part: impl Into<String>) -> Self {
        self.fail_on = Some(url_part.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LsRemoteCommand for StaticLsRemote {
    async fn ls_remote(
        &self,
        root: &VcsRootConfig,
        options: &LsRemoteOptions,
    ) -> VcsResult<Vec<RefCommit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fail_on) = &self.fail_on {
            if root.fetch_url.contains(fail_on.as_str()) {
                return Err(VcsError::command_failed(
                    "git ls-remote",
                    Some(128),
                    "",
                    &format!("fatal: repository '{}' not found", root.fetch_url),
                ));
            }
        }
        Ok(self
            .refs
            .iter()
            .filter(|r| options.accepts(r.ref_name()))
            .cloned()
            .collect())
    }
}

/// fetch that only records the settings it was called with.
#[derive(Default)]
pub struct RecordingFetchCommand {
    calls: Mutex<Vec<FetchSettings>>,
}

impl RecordingFetchCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<FetchSettings> {
        self.calls.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl FetchCommand for RecordingFetchCommand {
    async fn fetch(
        &self,
        _repository_dir: &Path,
        _root: &VcsRootConfig,
        settings: &FetchSettings,
    ) -> VcsResult<()> {
        self.calls.lock().expect("poisoned").push(settings.clone());
        Ok(())
    }
}

/// Operations backed by the given commands.
pub struct TestGitRepoOperations {
    pub ls_remote: Arc<dyn LsRemoteCommand>,
    pub fetch: Arc<dyn FetchCommand>,
}

impl TestGitRepoOperations {
    pub fn new(ls_remote: Arc<dyn LsRemoteCommand>, fetch: Arc<dyn FetchCommand>) -> Self {
        Self { ls_remote, fetch }
    }
}

impl GitRepoOperations for TestGitRepoOperations {
    fn fetch_command(&self) -> Arc<dyn FetchCommand> {
        self.fetch.clone()
    }

    fn ls_remote_command(&self) -> Arc<dyn LsRemoteCommand> {
        self.ls_remote.clone()
    }
}
