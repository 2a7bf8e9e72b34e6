use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::application::services::fetch_settings_factory::FetchSettingsFactory;
use crate::application::use_cases::load_commits::ensure_repository;
use crate::domain::entities::fetch_settings::FetchSettings;
use crate::domain::entities::server_config::ServerConfig;
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::domain::value_objects::ref_commit::expand_ref;
use crate::domain::value_objects::ref_spec::RefSpec;
use crate::infrastructure::git::repo_operations::GitRepoOperations;

/// Handler for the fetch command
pub struct FetchCommandHandler {
    pub repo_dir: PathBuf,
    pub root: VcsRootConfig,
    pub refspecs: Vec<String>,
    pub all: bool,
    pub include_tags: bool,
    pub depth: Option<u32>,
    pub progress: bool,
}

impl FetchCommandHandler {
    pub fn new(
        repo_dir: PathBuf,
        root: VcsRootConfig,
        refspecs: Vec<String>,
        all: bool,
        include_tags: bool,
        depth: Option<u32>,
        progress: bool,
    ) -> Self {
        Self {
            repo_dir,
            root,
            refspecs,
            all,
            include_tags,
            depth,
            progress,
        }
    }

    pub async fn execute(
        &self,
        operations: Arc<dyn GitRepoOperations>,
        config: &ServerConfig,
    ) -> Result<()> {
        let settings = self.settings(config)?;
        ensure_repository(&self.repo_dir).await?;

        operations
            .fetch_command()
            .fetch(&self.repo_dir, &self.root, &settings)
            .await
            .with_context(|| format!("Failed to fetch {}", self.root.describe()))?;

        println!(
            "{} Fetched {} into {}",
            "✓".green().bold(),
            self.root.describe(),
            self.repo_dir.display()
        );
        Ok(())
    }

    /// `--all` or no refspec fetches every ref.
    pub fn settings(&self, config: &ServerConfig) -> Result<FetchSettings> {
        let settings = if self.all || self.refspecs.is_empty() {
            FetchSettingsFactory::new(config).all_refs(self.include_tags)
        } else {
            let specs = self
                .refspecs
                .iter()
                .map(|spec| parse_refspec(spec))
                .collect::<Result<Vec<_>>>()?;
            FetchSettings::new(specs).with_fetch_tags(self.include_tags)
        };
        Ok(settings
            .with_depth(self.depth)
            .with_progress(self.progress))
    }
}

/// A bare ref name such as `main` becomes a mirroring refspec.
fn parse_refspec(spec: &str) -> Result<RefSpec> {
    if spec.contains(':') || spec.starts_with('+') || spec.starts_with('^') {
        return spec
            .parse::<RefSpec>()
            .with_context(|| format!("Invalid refspec '{}'", spec));
    }
    Ok(RefSpec::mirror(expand_ref(spec)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::fetch_settings::FetchMode;
    use pretty_assertions::assert_eq;

    fn handler(refspecs: &[&str], all: bool) -> FetchCommandHandler {
        FetchCommandHandler::new(
            PathBuf::from("repo"),
            VcsRootConfig::new("root", "https://example.com/repo.git"),
            refspecs.iter().map(|s| s.to_string()).collect(),
            all,
            true,
            None,
            false,
        )
    }

    #[test]
    fn test_short_names_become_mirror_refspecs() {
        let settings = handler(&["main", "refs/tags/v1"], false)
            .settings(&ServerConfig::default())
            .unwrap();
        let specs: Vec<String> = settings.ref_specs.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            specs,
            vec![
                "+refs/heads/main:refs/heads/main",
                "+refs/tags/v1:refs/tags/v1"
            ]
        );
        assert_eq!(settings.mode, FetchMode::RefSpecs);
    }

    #[test]
    fn test_explicit_refspec_is_kept() {
        let settings = handler(&["+refs/pull/*:refs/remotes/pull/*"], false)
            .settings(&ServerConfig::default())
            .unwrap();
        assert_eq!(
            settings.ref_specs[0].to_string(),
            "+refs/pull/*:refs/remotes/pull/*"
        );
    }

    #[test]
    fn test_no_refspec_fetches_all() {
        let settings = handler(&[], false).settings(&ServerConfig::default()).unwrap();
        assert!(settings.is_fetch_all());
        let settings = handler(&["main"], true).settings(&ServerConfig::default()).unwrap();
        assert!(settings.is_fetch_all());
    }
}
