use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use super::print_structured;
use crate::application::use_cases::test_connection::TestConnectionUseCase;
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::infrastructure::git::repo_operations::GitRepoOperations;
use crate::presentation::cli::OutputFormat;

/// Handler for the test-connection command
pub struct TestConnectionCommand {
    pub root: VcsRootConfig,
    pub output: OutputFormat,
}

impl TestConnectionCommand {
    pub fn new(root: VcsRootConfig, output: OutputFormat) -> Self {
        Self { root, output }
    }

    pub async fn execute(&self, operations: Arc<dyn GitRepoOperations>) -> Result<()> {
        let report = TestConnectionUseCase::new(operations)
            .execute(&self.root)
            .await
            .with_context(|| format!("Connection test failed for {}", self.root.describe()))?;

        if !print_structured(&report, self.output)? {
            println!("{} Connection to {} succeeded", "✓".green().bold(), report.url);
            println!(
                "   {} {}",
                report.default_branch.cyan(),
                report.default_branch_commit
            );
            println!("   {} refs advertised", report.refs_count);
        }
        Ok(())
    }
}
