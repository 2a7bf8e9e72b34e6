use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use crate::infrastructure::git::repo_operations::GitRepoOperationsImpl;

/// Handler for the detect-git command
#[derive(Default)]
pub struct DetectGitCommand;

impl DetectGitCommand {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, operations: Arc<GitRepoOperationsImpl>) -> Result<()> {
        let exec = operations.detect_git().await?;
        println!(
            "{} {} {}",
            "✓".green().bold(),
            exec.path.bold(),
            exec.version
        );

        if exec.version.is_deprecated() {
            println!(
                "{} git {} is deprecated, please upgrade",
                "!".yellow().bold(),
                exec.version
            );
        }
        let native = if exec.version.fetch_supports_stdin() {
            "available".green()
        } else {
            "unavailable, libgit2 will be used".yellow()
        };
        println!("   native operations: {}", native);
        Ok(())
    }
}
