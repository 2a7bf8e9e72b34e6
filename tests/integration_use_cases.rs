//! ユースケースの統合テスト
//!
//! コミット取得、接続確認、複数リポジトリのls-remoteを
//! ローカルリポジトリとモックのgitコマンドで確認する。

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::mock_services::{RecordingFetchCommand, StaticLsRemote, TestGitRepoOperations};
use common::test_helpers::{clone_dir, libgit2_config, local_ref, SourceRepository};
use gitvcs::application::use_cases::{
    ListRemoteRefsUseCase, LoadCommitsUseCase, RepositoryLocks, TestConnectionUseCase,
};
use gitvcs::common::VcsError;
use gitvcs::domain::entities::{FetchMode, ServerConfig, VcsRootConfig};
use gitvcs::domain::value_objects::RefCommit;
use gitvcs::infrastructure::git::LsRemoteOptions;
use gitvcs::infrastructure::ssh::NoSshKeyManager;
use gitvcs::infrastructure::GitRepoOperationsImpl;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const MAIN: &str = "1111111111111111111111111111111111111111";
const GONE: &str = "2222222222222222222222222222222222222222";

fn tip(ref_name: &str, commit: &str) -> RefCommit {
    RefCommit::tip(ref_name, commit).unwrap()
}

fn load_commits_with_libgit2(config: &ServerConfig) -> LoadCommitsUseCase {
    let operations = Arc::new(GitRepoOperationsImpl::new(
        config.clone(),
        Arc::new(NoSshKeyManager),
    ));
    LoadCommitsUseCase::new(operations, config, Arc::new(RepositoryLocks::new()))
}

fn mocked(
    config: &ServerConfig,
    ls_remote: Arc<StaticLsRemote>,
    fetch: Arc<RecordingFetchCommand>,
) -> LoadCommitsUseCase {
    let operations = Arc::new(TestGitRepoOperations::new(ls_remote, fetch));
    LoadCommitsUseCase::new(operations, config, Arc::new(RepositoryLocks::new()))
}

fn mock_root() -> VcsRootConfig {
    VcsRootConfig::new("mock", "https://example.com/owner/repo.git")
}

#[tokio::test]
async fn test_load_commits_fetches_missing_branches() {
    let source = SourceRepository::create();
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    let use_case = load_commits_with_libgit2(&libgit2_config());

    let revisions = vec![
        tip("refs/heads/main", &source.main_commit),
        tip("refs/heads/feature", &source.feature_commit),
    ];
    let report = use_case
        .execute(&clone, &source.root(), &revisions)
        .await
        .unwrap();

    assert_eq!(report.refs_to_fetch, 2);
    assert_eq!(report.fetches, 1);
    assert!(!report.fetched_all);
    assert_eq!(
        local_ref(&clone, "refs/heads/main"),
        Some(source.main_commit.clone())
    );
    assert_eq!(
        local_ref(&clone, "refs/heads/feature"),
        Some(source.feature_commit.clone())
    );

    // Everything is present now
    let report = use_case
        .execute(&clone, &source.root(), &revisions)
        .await
        .unwrap();
    assert_eq!(report.refs_to_fetch, 0);
    assert_eq!(report.fetches, 0);
}

#[tokio::test]
async fn test_load_commits_fetches_new_commit() {
    let source = SourceRepository::create();
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    let use_case = load_commits_with_libgit2(&libgit2_config());

    use_case
        .execute(
            &clone,
            &source.root(),
            &[tip("refs/heads/main", &source.main_commit)],
        )
        .await
        .unwrap();

    let new_commit = source.add_commit("main", "more changes\n");
    let report = use_case
        .execute(&clone, &source.root(), &[tip("refs/heads/main", &new_commit)])
        .await
        .unwrap();

    assert_eq!(report.refs_to_fetch, 1);
    assert_eq!(local_ref(&clone, "refs/heads/main"), Some(new_commit));
}

#[tokio::test]
async fn test_load_commits_with_no_revisions_does_nothing() {
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    let ls_remote = Arc::new(StaticLsRemote::new(&[]));
    let fetch = Arc::new(RecordingFetchCommand::new());
    let use_case = mocked(&ServerConfig::default(), ls_remote.clone(), fetch.clone());

    let report = use_case.execute(&clone, &mock_root(), &[]).await.unwrap();

    assert_eq!(report.fetches, 0);
    assert_eq!(ls_remote.calls(), 0);
    assert!(!clone.exists());
}

#[tokio::test]
async fn test_load_commits_falls_back_to_fetch_all_for_missing_tip() {
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    let ls_remote = Arc::new(StaticLsRemote::new(&[("refs/heads/main", MAIN)]));
    let fetch = Arc::new(RecordingFetchCommand::new());
    let use_case = mocked(&ServerConfig::default(), ls_remote, fetch.clone());

    let err = use_case
        .execute(&clone, &mock_root(), &[tip("refs/heads/gone", GONE)])
        .await
        .unwrap_err();

    match err {
        VcsError::MissingRevisions {
            revisions,
            recoverable,
        } => {
            assert_eq!(revisions, vec![format!("refs/heads/gone: {}", GONE)]);
            assert!(!recoverable);
        }
        other => panic!("unexpected error: {}", other),
    }

    let calls = fetch.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].mode, FetchMode::AllRefsExceptTags);
}

#[tokio::test]
async fn test_load_commits_fails_fast_when_remote_branch_missing() {
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    let mut config = ServerConfig::default();
    config.fail_if_remote_branch_missing = true;
    let ls_remote = Arc::new(StaticLsRemote::new(&[("refs/heads/main", MAIN)]));
    let fetch = Arc::new(RecordingFetchCommand::new());
    let use_case = mocked(&config, ls_remote, fetch.clone());

    let err = use_case
        .execute(&clone, &mock_root(), &[tip("refs/heads/gone", GONE)])
        .await
        .unwrap_err();

    assert!(err.is_remote_ref_not_found());
    assert!(fetch.calls().is_empty());
}

#[tokio::test]
async fn test_load_commits_uses_known_remote_refs() {
    let workspace = TempDir::new().unwrap();
    let clone = clone_dir(&workspace);
    let ls_remote = Arc::new(StaticLsRemote::new(&[]));
    let fetch = Arc::new(RecordingFetchCommand::new());
    let mut config = ServerConfig::default();
    config.missing_revisions_recoverable = true;
    let use_case = mocked(&config, ls_remote.clone(), fetch.clone());

    let remote_refs: HashSet<String> = ["refs/heads/main".to_string()].into_iter().collect();
    let err = use_case
        .execute_with_remote_refs(
            &clone,
            &mock_root(),
            &[tip("refs/heads/main", MAIN)],
            &remote_refs,
        )
        .await
        .unwrap_err();

    assert_eq!(ls_remote.calls(), 0);
    assert!(err.is_recoverable(1, 3));

    let calls = fetch.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].mode, FetchMode::RefSpecs);
    assert_eq!(
        calls[0].ref_specs[0].to_string(),
        "+refs/heads/main:refs/heads/main"
    );
    assert!(calls[1].is_fetch_all());
}

#[tokio::test]
async fn test_connection_reports_default_branch() {
    let source = SourceRepository::create();
    let operations = Arc::new(GitRepoOperationsImpl::new(
        libgit2_config(),
        Arc::new(NoSshKeyManager),
    ));

    let report = TestConnectionUseCase::new(operations)
        .execute(&source.root().with_branch("main"))
        .await
        .unwrap();

    assert_eq!(report.default_branch, "refs/heads/main");
    assert_eq!(report.default_branch_commit, source.main_commit);
    assert!(report.refs_count >= 3);
}

#[tokio::test]
async fn test_connection_fails_without_default_branch() {
    let ls_remote = Arc::new(StaticLsRemote::new(&[("refs/heads/main", MAIN)]));
    let operations = Arc::new(TestGitRepoOperations::new(
        ls_remote,
        Arc::new(RecordingFetchCommand::new()),
    ));

    let err = TestConnectionUseCase::new(operations)
        .execute(&mock_root().with_branch("develop"))
        .await
        .unwrap_err();

    assert!(err.is_remote_ref_not_found());
}

#[tokio::test]
async fn test_list_remote_refs_keeps_input_order() {
    let ls_remote = Arc::new(
        StaticLsRemote::new(&[("refs/heads/main", MAIN), ("refs/tags/v1", GONE)])
            .failing_on("broken"),
    );
    let operations = Arc::new(TestGitRepoOperations::new(
        ls_remote.clone(),
        Arc::new(RecordingFetchCommand::new()),
    ));
    let roots = vec![
        VcsRootConfig::new("a", "https://example.com/a.git"),
        VcsRootConfig::new("b", "https://example.com/broken.git"),
        VcsRootConfig::new("c", "https://example.com/c.git"),
    ];

    let use_case = ListRemoteRefsUseCase::new(operations).with_jobs(2);
    let results = use_case
        .execute(&roots, &LsRemoteOptions::new().tags_only(true))
        .await;

    let ids: Vec<&str> = results.iter().map(|r| r.root_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(results[0].is_success());
    assert!(!results[1].is_success());
    assert!(results[1].error.as_deref().unwrap_or_default().contains("not found"));
    assert_eq!(results[2].refs.len(), 1);
    assert_eq!(results[2].refs[0].ref_name(), "refs/tags/v1");
    assert_eq!(ls_remote.calls(), 3);
}

#[tokio::test]
async fn test_list_remote_refs_jobs_are_at_least_one() {
    let operations = Arc::new(TestGitRepoOperations::new(
        Arc::new(StaticLsRemote::new(&[])),
        Arc::new(RecordingFetchCommand::new()),
    ));
    assert_eq!(ListRemoteRefsUseCase::new(operations).with_jobs(0).jobs(), 1);
}
