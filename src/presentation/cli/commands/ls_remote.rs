use std::sync::Arc;

use anyhow::{bail, Result};
use colored::Colorize;

use super::print_structured;
use crate::application::use_cases::list_remote_refs::{ListRemoteRefsUseCase, RemoteRefsResult};
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::infrastructure::git::ls_remote::LsRemoteOptions;
use crate::infrastructure::git::repo_operations::GitRepoOperations;
use crate::presentation::cli::OutputFormat;

/// Handler for the ls-remote command
pub struct LsRemoteCommandHandler {
    pub roots: Vec<VcsRootConfig>,
    pub tags_only: bool,
    pub patterns: Vec<String>,
    pub jobs: Option<usize>,
    pub output: OutputFormat,
}

impl LsRemoteCommandHandler {
    pub fn new(
        roots: Vec<VcsRootConfig>,
        tags_only: bool,
        patterns: Vec<String>,
        jobs: Option<usize>,
        output: OutputFormat,
    ) -> Self {
        Self {
            roots,
            tags_only,
            patterns,
            jobs,
            output,
        }
    }

    pub async fn execute(&self, operations: Arc<dyn GitRepoOperations>) -> Result<()> {
        let mut use_case = ListRemoteRefsUseCase::new(operations);
        if let Some(jobs) = self.jobs {
            use_case = use_case.with_jobs(jobs);
        }
        let options = LsRemoteOptions::new()
            .tags_only(self.tags_only)
            .with_patterns(self.patterns.clone());

        let results = use_case.execute(&self.roots, &options).await;

        if !print_structured(&results, self.output)? {
            self.print_text(&results);
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            bail!("{} of {} repositories failed", failed, results.len());
        }
        Ok(())
    }

    fn print_text(&self, results: &[RemoteRefsResult]) {
        let with_headers = results.len() > 1;
        for result in results {
            if with_headers {
                println!("{} {}", "::".blue().bold(), result.url.bold());
            }
            match &result.error {
                Some(error) => eprintln!("{} {}: {}", "✗".red().bold(), result.url, error),
                None => {
                    for r in &result.refs {
                        println!("{}\t{}", r.commit(), r.ref_name());
                    }
                }
            }
        }
    }
}
