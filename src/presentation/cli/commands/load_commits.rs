use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use colored::Colorize;

use super::print_structured;
use crate::application::use_cases::load_commits::{LoadCommitsUseCase, RepositoryLocks};
use crate::domain::entities::server_config::ServerConfig;
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::domain::value_objects::ref_commit::{expand_ref, RefCommit};
use crate::infrastructure::git::repo_operations::GitRepoOperations;
use crate::presentation::cli::OutputFormat;

/// Handler for the load-commits command
pub struct LoadCommitsCommand {
    pub repo_dir: PathBuf,
    pub root: VcsRootConfig,
    pub revisions: Vec<String>,
    pub output: OutputFormat,
}

impl LoadCommitsCommand {
    pub fn new(
        repo_dir: PathBuf,
        root: VcsRootConfig,
        revisions: Vec<String>,
        output: OutputFormat,
    ) -> Self {
        Self {
            repo_dir,
            root,
            revisions,
            output,
        }
    }

    pub async fn execute(
        &self,
        operations: Arc<dyn GitRepoOperations>,
        config: &ServerConfig,
    ) -> Result<()> {
        let revisions = self
            .revisions
            .iter()
            .map(|r| parse_revision(r))
            .collect::<Result<Vec<_>>>()?;

        let use_case = LoadCommitsUseCase::new(operations, config, Arc::new(RepositoryLocks::new()));
        let report = use_case
            .execute(&self.repo_dir, &self.root, &revisions)
            .await
            .with_context(|| format!("Failed to load commits of {}", self.root.describe()))?;

        if !print_structured(&report, self.output)? {
            if report.refs_to_fetch == 0 {
                println!("{} All revisions are already present", "✓".green().bold());
            } else {
                println!(
                    "{} Loaded {} revision(s) with {} fetch(es){}",
                    "✓".green().bold(),
                    report.refs_to_fetch,
                    report.fetches,
                    if report.fetched_all { ", all refs fetched" } else { "" }
                );
            }
        }
        Ok(())
    }
}

/// Parses `REF=COMMIT`.
fn parse_revision(revision: &str) -> Result<RefCommit> {
    let (ref_name, commit) = revision
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid revision '{}', expected REF=COMMIT", revision))?;
    RefCommit::tip(expand_ref(ref_name.trim()), commit)
        .with_context(|| format!("Invalid revision '{}'", revision))
}
