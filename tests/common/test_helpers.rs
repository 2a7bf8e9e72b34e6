//! Test helper functions and utilities

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use gitvcs::domain::entities::{ServerConfig, VcsRootConfig};
use tempfile::TempDir;

/// A bare repository used as the remote side of fetch and ls-remote.
///
/// `main` has two commits, `feature` branches off the first one and the
/// annotated tag `v1` points to the first commit.
pub struct SourceRepository {
    dir: TempDir,
    pub first_commit: String,
    pub main_commit: String,
    pub feature_commit: String,
    pub tag_object: String,
}

impl SourceRepository {
    pub fn create() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut options = RepositoryInitOptions::new();
        options.bare(true).initial_head("main");
        let repo = Repository::init_opts(dir.path(), &options).expect("Failed to init repository");

        let first = commit(&repo, "refs/heads/main", "README.md", "# Project\n", &[]);
        let main = commit(
            &repo,
            "refs/heads/main",
            "README.md",
            "# Project\n\nUpdated\n",
            &[first],
        );
        let feature = commit(&repo, "refs/heads/feature", "feature.txt", "feature\n", &[first]);

        let target = repo.find_object(first, None).expect("Failed to find commit");
        let tag = repo
            .tag("v1", &target, &signature(), "Release v1", false)
            .expect("Failed to create tag");

        Self {
            dir,
            first_commit: first.to_string(),
            main_commit: main.to_string(),
            feature_commit: feature.to_string(),
            tag_object: tag.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        self.dir.path().display().to_string()
    }

    pub fn root(&self) -> VcsRootConfig {
        VcsRootConfig::new("source", self.url())
    }

    /// Adds a commit to `branch` of the source repository.
    pub fn add_commit(&self, branch: &str, content: &str) -> String {
        let repo = Repository::open(self.path()).expect("Failed to open source repository");
        let ref_name = format!("refs/heads/{}", branch);
        let parent = repo.refname_to_id(&ref_name).expect("Missing branch");
        commit(&repo, &ref_name, "changes.txt", content, &[parent]).to_string()
    }

    pub fn delete_branch(&self, branch: &str) {
        let repo = Repository::open(self.path()).expect("Failed to open source repository");
        repo.find_reference(&format!("refs/heads/{}", branch))
            .and_then(|mut r| r.delete())
            .expect("Failed to delete branch");
    }
}

fn signature() -> Signature<'static> {
    Signature::now("Test User", "test@example.com").expect("Failed to create signature")
}

fn commit(repo: &Repository, ref_name: &str, file: &str, content: &str, parents: &[Oid]) -> Oid {
    let blob = repo.blob(content.as_bytes()).expect("Failed to write blob");
    let mut builder = repo.treebuilder(None).expect("Failed to create tree builder");
    builder
        .insert(file, blob, 0o100644)
        .expect("Failed to insert blob");
    let tree_id = builder.write().expect("Failed to write tree");
    let tree = repo.find_tree(tree_id).expect("Failed to find tree");
    let parents: Vec<_> = parents
        .iter()
        .map(|id| repo.find_commit(*id).expect("Failed to find parent"))
        .collect();
    let parent_refs: Vec<_> = parents.iter().collect();
    let sig = signature();
    repo.commit(Some(ref_name), &sig, &sig, "commit", &tree, &parent_refs)
        .expect("Failed to commit")
}

/// Whether a git executable is on the PATH.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Configuration that only uses libgit2 and never retries.
pub fn libgit2_config() -> ServerConfig {
    let mut config = ServerConfig::default().with_native_operations(false);
    config.native_operations.url_overrides.clear();
    config.connection_retry_attempts = 1;
    config
}

/// Configuration that uses native git whenever the installed version allows it.
pub fn native_config() -> ServerConfig {
    let mut config = ServerConfig::default().with_native_operations(true);
    config.connection_retry_attempts = 1;
    config
}

/// Reads the commit a ref points to in a local repository.
pub fn local_ref(repo_dir: &Path, ref_name: &str) -> Option<String> {
    Repository::open(repo_dir)
        .ok()?
        .refname_to_id(ref_name)
        .ok()
        .map(|id| id.to_string())
}

/// Whether a commit object exists in a local repository.
pub fn has_commit(repo_dir: &Path, commit: &str) -> bool {
    let Ok(repo) = Repository::open(repo_dir) else {
        return false;
    };
    let found = Oid::from_str(commit)
        .ok()
        .and_then(|oid| repo.find_commit(oid).ok())
        .is_some();
    found
}

pub fn clone_dir(parent: &TempDir) -> PathBuf {
    parent.path().join("clone")
}
