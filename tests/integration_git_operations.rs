//! git操作の統合テスト
//!
//! ローカルのbareリポジトリをリモートとして、libgit2とネイティブgitの
//! ls-remoteとfetchを確認する。

mod common;

use std::sync::Arc;

use common::test_helpers::{
    clone_dir, git_available, has_commit, libgit2_config, local_ref, native_config,
    SourceRepository,
};
use gitvcs::application::use_cases::load_commits::ensure_repository;
use gitvcs::domain::entities::{FetchSettings, VcsRootConfig};
use gitvcs::domain::value_objects::RefSpec;
use gitvcs::infrastructure::git::LsRemoteOptions;
use gitvcs::infrastructure::ssh::NoSshKeyManager;
use gitvcs::infrastructure::{GitRepoOperations, GitRepoOperationsImpl};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn libgit2_operations() -> GitRepoOperationsImpl {
    GitRepoOperationsImpl::new(libgit2_config(), Arc::new(NoSshKeyManager))
}

fn native_operations() -> GitRepoOperationsImpl {
    GitRepoOperationsImpl::new(native_config(), Arc::new(NoSshKeyManager))
}

fn ref_names(refs: &[gitvcs::domain::value_objects::RefCommit]) -> Vec<&str> {
    refs.iter().map(|r| r.ref_name()).collect()
}

#[tokio::test]
async fn test_libgit2_ls_remote_lists_branches_and_peeled_tags() {
    let source = SourceRepository::create();
    let operations = libgit2_operations();

    let refs = operations
        .ls_remote_command()
        .ls_remote(&source.root(), &LsRemoteOptions::default())
        .await
        .unwrap();

    let find = |name: &str| refs.iter().find(|r| r.ref_name() == name).map(|r| r.commit());
    assert_eq!(find("refs/heads/main"), Some(source.main_commit.as_str()));
    assert_eq!(find("refs/heads/feature"), Some(source.feature_commit.as_str()));
    assert_eq!(find("refs/tags/v1"), Some(source.first_commit.as_str()));
    assert!(!refs.iter().any(|r| r.ref_name().ends_with("^{}")));
}

#[tokio::test]
async fn test_libgit2_ls_remote_without_peeling_keeps_tag_object() {
    let source = SourceRepository::create();
    let options = LsRemoteOptions::new().tags_only(true).with_peel_refs(false);

    let refs = libgit2_operations()
        .ls_remote_command()
        .ls_remote(&source.root(), &options)
        .await
        .unwrap();

    let tag = refs
        .iter()
        .find(|r| r.ref_name() == "refs/tags/v1")
        .expect("tag is listed");
    assert_eq!(tag.commit(), source.tag_object);
    assert!(refs.iter().all(|r| r.ref_name().starts_with("refs/tags/")));
}

#[tokio::test]
async fn test_libgit2_ls_remote_with_pattern() {
    let source = SourceRepository::create();
    let options = LsRemoteOptions::new().with_patterns(vec!["feature".to_string()]);

    let refs = libgit2_operations()
        .ls_remote_command()
        .ls_remote(&source.root(), &options)
        .await
        .unwrap();

    assert_eq!(ref_names(&refs), vec!["refs/heads/feature"]);
}

#[tokio::test]
async fn test_ls_remote_of_missing_repository_fails() {
    let missing = TempDir::new().unwrap();
    let root = VcsRootConfig::new("missing", missing.path().join("nope").display().to_string());

    let result = libgit2_operations()
        .ls_remote_command()
        .ls_remote(&root, &LsRemoteOptions::default())
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_libgit2_fetch_single_branch() {
    let source = SourceRepository::create();
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    ensure_repository(&clone).await.unwrap();

    let settings =
        FetchSettings::new(vec![RefSpec::mirror("refs/heads/feature")]).with_fetch_tags(false);
    libgit2_operations()
        .fetch_command()
        .fetch(&clone, &source.root(), &settings)
        .await
        .unwrap();

    assert_eq!(
        local_ref(&clone, "refs/heads/feature"),
        Some(source.feature_commit.clone())
    );
    assert_eq!(local_ref(&clone, "refs/heads/main"), None);
    assert_eq!(local_ref(&clone, "refs/tags/v1"), None);
}

#[tokio::test]
async fn test_libgit2_fetch_all_refs() {
    let source = SourceRepository::create();
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    ensure_repository(&clone).await.unwrap();

    libgit2_operations()
        .fetch_command()
        .fetch(&clone, &source.root(), &FetchSettings::all_refs(true))
        .await
        .unwrap();

    assert_eq!(
        local_ref(&clone, "refs/heads/main"),
        Some(source.main_commit.clone())
    );
    assert_eq!(
        local_ref(&clone, "refs/tags/v1"),
        Some(source.tag_object.clone())
    );
    assert!(has_commit(&clone, &source.feature_commit));
}

#[tokio::test]
async fn test_libgit2_fetch_all_except_tags_takes_branches_only() {
    let source = SourceRepository::create();
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    ensure_repository(&clone).await.unwrap();

    libgit2_operations()
        .fetch_command()
        .fetch(&clone, &source.root(), &FetchSettings::all_refs(false))
        .await
        .unwrap();

    assert!(local_ref(&clone, "refs/heads/main").is_some());
    assert!(local_ref(&clone, "refs/heads/feature").is_some());
    assert_eq!(local_ref(&clone, "refs/tags/v1"), None);
}

#[tokio::test]
async fn test_native_ls_remote_matches_libgit2() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let source = SourceRepository::create();

    let native = native_operations()
        .ls_remote_command()
        .ls_remote(&source.root(), &LsRemoteOptions::default())
        .await
        .unwrap();
    let libgit2 = libgit2_operations()
        .ls_remote_command()
        .ls_remote(&source.root(), &LsRemoteOptions::default())
        .await
        .unwrap();

    let mut native: Vec<String> = native
        .iter()
        .filter(|r| r.ref_name() != "HEAD")
        .map(|r| r.to_string())
        .collect();
    let mut libgit2: Vec<String> = libgit2
        .iter()
        .filter(|r| r.ref_name() != "HEAD")
        .map(|r| r.to_string())
        .collect();
    native.sort();
    libgit2.sort();
    assert_eq!(native, libgit2);
}

#[tokio::test]
async fn test_native_fetch_multiple_refspecs() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let source = SourceRepository::create();
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    ensure_repository(&clone).await.unwrap();

    let settings = FetchSettings::new(vec![
        RefSpec::mirror("refs/heads/main"),
        RefSpec::mirror("refs/heads/feature"),
    ]);
    native_operations()
        .fetch_command()
        .fetch(&clone, &source.root(), &settings)
        .await
        .unwrap();

    assert_eq!(
        local_ref(&clone, "refs/heads/main"),
        Some(source.main_commit.clone())
    );
    assert_eq!(
        local_ref(&clone, "refs/heads/feature"),
        Some(source.feature_commit.clone())
    );
}

#[tokio::test]
async fn test_native_fetch_skips_deleted_branch() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let source = SourceRepository::create();
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    ensure_repository(&clone).await.unwrap();

    let operations = native_operations();
    let exec = operations.detect_git().await.unwrap();
    if !exec.version.fetch_supports_stdin() {
        eprintln!("git {} falls back to libgit2, skipping", exec.version);
        return;
    }

    source.delete_branch("feature");
    let settings = FetchSettings::new(vec![
        RefSpec::mirror("refs/heads/main"),
        RefSpec::mirror("refs/heads/feature"),
    ]);
    operations
        .fetch_command()
        .fetch(&clone, &source.root(), &settings)
        .await
        .unwrap();

    assert_eq!(
        local_ref(&clone, "refs/heads/main"),
        Some(source.main_commit.clone())
    );
    assert_eq!(local_ref(&clone, "refs/heads/feature"), None);
}

#[tokio::test]
async fn test_native_fetch_of_only_deleted_branch_fails() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let source = SourceRepository::create();
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    ensure_repository(&clone).await.unwrap();

    let operations = native_operations();
    let exec = operations.detect_git().await.unwrap();
    if !exec.version.fetch_supports_stdin() {
        eprintln!("git {} falls back to libgit2, skipping", exec.version);
        return;
    }

    source.delete_branch("feature");
    let settings = FetchSettings::new(vec![RefSpec::mirror("refs/heads/feature")]);
    let err = operations
        .fetch_command()
        .fetch(&clone, &source.root(), &settings)
        .await
        .unwrap_err();

    assert!(err.is_remote_ref_not_found(), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_detect_git() {
    if !git_available() {
        eprintln!("git is not installed, skipping");
        return;
    }
    let exec = native_operations().detect_git().await.unwrap();
    assert_eq!(exec.path, "git");
    assert!(exec.version.is_supported());
}
