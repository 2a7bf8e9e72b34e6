use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use git2::{ErrorCode, ObjectType, Oid, Repository};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::application::services::fetch_settings_factory::FetchSettingsFactory;
use crate::common::error::VcsError;
use crate::common::result::async_helpers::run_blocking;
use crate::common::result::{ResultExt, VcsResult};
use crate::domain::entities::fetch_settings::FetchSettings;
use crate::domain::entities::server_config::ServerConfig;
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::domain::value_objects::ref_commit::{expand_ref, is_tag, RefCommit};
use crate::infrastructure::git::ls_remote::LsRemoteOptions;
use crate::infrastructure::git::repo_operations::GitRepoOperations;

/// ロック待ちがこれより長ければinfoで報告する
const SLOW_LOCK_WAIT: Duration = Duration::from_secs(20);

/// クローンディレクトリごとの書き込みロック
#[derive(Debug, Default)]
pub struct RepositoryLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl RepositoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, dir: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// `timeout` 以内にロックを取得する
    pub async fn acquire(&self, dir: &Path, timeout: Duration) -> VcsResult<OwnedMutexGuard<()>> {
        let lock = self.lock_for(dir);
        let start = Instant::now();
        let guard = tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| VcsError::LockTimeout {
                path: dir.to_path_buf(),
                timeout_secs: timeout.as_secs(),
            })?;

        let waited = start.elapsed();
        if waited > SLOW_LOCK_WAIT {
            info!(
                "Waited for exclusive lock in cloned directory, wait time: {}ms",
                waited.as_millis()
            );
        }
        debug!(
            "[waitForWriteLock] repository: {} took {}ms",
            dir.display(),
            waited.as_millis()
        );
        Ok(guard)
    }
}

/// コミット取得の結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadCommitsReport {
    /// ローカルに無かったrefの数
    pub refs_to_fetch: usize,

    /// 実行したfetchの回数
    pub fetches: usize,

    /// 全refのfetchにフォールバックしたか
    pub fetched_all: bool,
}

/// ディレクトリが無ければbareリポジトリとして初期化する
pub async fn ensure_repository(dir: &Path) -> VcsResult<()> {
    let dir = dir.to_path_buf();
    run_blocking("init repository", move || {
        if Repository::open(&dir).is_ok() {
            return Ok(());
        }
        std::fs::create_dir_all(&dir)
            .with_filesystem_error("Failed to create repository directory", Some(dir.clone()))?;
        Repository::init_bare(&dir).map_err(|e| {
            VcsError::git_error_with_source(
                format!("Failed to initialize repository at {}", dir.display()),
                e,
            )
        })?;
        info!("Initialized bare repository at {}", dir.display());
        Ok(())
    })
    .await
}

/// ローカルに無いリビジョンを返す
///
/// `check_tip_refs` が有効なら、タグ以外の先端refはローカルのrefが同じコミットを指しているかで判定する。
/// それ以外はコミットがローカルに存在するかで判定する。
pub async fn find_refs_to_fetch(
    dir: &Path,
    revisions: &[RefCommit],
    check_tip_refs: bool,
) -> VcsResult<Vec<RefCommit>> {
    let dir = dir.to_path_buf();
    let revisions = revisions.to_vec();
    run_blocking("find refs to fetch", move || {
        let repo = Repository::open(&dir).map_err(|e| {
            VcsError::git_error_with_source(
                format!("Failed to open repository at {}", dir.display()),
                e,
            )
        })?;
        Ok(revisions
            .into_iter()
            .filter(|r| needs_fetch(&repo, r, check_tip_refs))
            .collect())
    })
    .await
}

fn needs_fetch(repo: &Repository, revision: &RefCommit, check_tip_refs: bool) -> bool {
    let ref_name = expand_ref(revision.ref_name());
    let commit = revision.commit();

    if check_tip_refs && revision.is_ref_tip() && !is_tag(&ref_name) {
        let local = repo.refname_to_id(&ref_name).ok().map(|id| id.to_string());
        return local.as_deref() != Some(commit);
    }

    let oid = match Oid::from_str(commit) {
        Ok(oid) => oid,
        Err(e) => {
            warn!("Invalid commit id {} for ref {}: {}", commit, ref_name, e);
            return true;
        }
    };
    match repo.find_object(oid, None) {
        Ok(object) if object.kind() == Some(ObjectType::Commit) => false,
        Ok(_) => {
            warn!("Ref {} points to a non-commit {}", ref_name, commit);
            false
        }
        Err(e) if e.code() == ErrorCode::NotFound => true,
        Err(e) => {
            warn!("Unexpected error while looking up commit {}: {}", commit, e);
            true
        }
    }
}

fn describe_revisions(revisions: &[RefCommit]) -> Vec<String> {
    revisions.iter().map(ToString::to_string).collect()
}

/// ローカルクローンに指定されたリビジョンを取得する
pub struct LoadCommitsUseCase {
    operations: Arc<dyn GitRepoOperations>,
    locks: Arc<RepositoryLocks>,
    settings_factory: FetchSettingsFactory,
    fetch_all_refs_enabled: bool,
    missing_revisions_recoverable: bool,
    write_lock_timeout: Duration,
}

impl LoadCommitsUseCase {
    pub fn new(
        operations: Arc<dyn GitRepoOperations>,
        config: &ServerConfig,
        locks: Arc<RepositoryLocks>,
    ) -> Self {
        Self {
            operations,
            locks,
            settings_factory: FetchSettingsFactory::new(config),
            fetch_all_refs_enabled: config.fetch_all_refs_enabled,
            missing_revisions_recoverable: config.missing_revisions_recoverable,
            write_lock_timeout: config.write_lock_timeout(),
        }
    }

    /// リモートのref一覧をls-remoteで取得してからコミットを取得する
    pub async fn execute(
        &self,
        repository_dir: &Path,
        root: &VcsRootConfig,
        revisions: &[RefCommit],
    ) -> VcsResult<LoadCommitsReport> {
        self.load(repository_dir, root, revisions, None).await
    }

    /// 既知のリモートref一覧を使ってコミットを取得する
    pub async fn execute_with_remote_refs(
        &self,
        repository_dir: &Path,
        root: &VcsRootConfig,
        revisions: &[RefCommit],
        remote_refs: &HashSet<String>,
    ) -> VcsResult<LoadCommitsReport> {
        self.load(repository_dir, root, revisions, Some(remote_refs))
            .await
    }

    #[instrument(skip_all, fields(root = %root.id, dir = %repository_dir.display()))]
    async fn load(
        &self,
        repository_dir: &Path,
        root: &VcsRootConfig,
        revisions: &[RefCommit],
        remote_refs: Option<&HashSet<String>>,
    ) -> VcsResult<LoadCommitsReport> {
        let mut report = LoadCommitsReport::default();
        if revisions.is_empty() {
            return Ok(report);
        }
        ensure_repository(repository_dir).await?;

        let refs_to_fetch = find_refs_to_fetch(repository_dir, revisions, true).await?;
        if refs_to_fetch.is_empty() {
            return Ok(report);
        }

        let _guard = self
            .locks
            .acquire(repository_dir, self.write_lock_timeout)
            .await?;

        // 他のfetchがロック待ちの間に取得しているかもしれない
        let refs_to_fetch = find_refs_to_fetch(repository_dir, &refs_to_fetch, true).await?;
        if refs_to_fetch.is_empty() {
            return Ok(report);
        }
        report.refs_to_fetch = refs_to_fetch.len();
        debug!(
            "Revisions missing in the local repository: {} for {}",
            describe_revisions(&refs_to_fetch).join(", "),
            root.describe()
        );

        let listed;
        let remote_refs = match remote_refs {
            Some(refs) => refs,
            None => {
                listed = self.list_remote_refs(root).await?;
                &listed
            }
        };

        let include_tags = root.report_tags;
        let settings = self.settings_factory.for_revisions(
            root,
            &refs_to_fetch,
            revisions,
            remote_refs,
            include_tags,
        )?;
        self.fetch(repository_dir, root, &settings, &mut report)
            .await?;

        let still_missing = find_refs_to_fetch(repository_dir, &refs_to_fetch, false).await?;
        if still_missing.is_empty() {
            return Ok(report);
        }
        if !self.fetch_all_refs_enabled && !still_missing.iter().any(RefCommit::is_ref_tip) {
            return Ok(report);
        }

        info!(
            "Fetching all refs of {}, revisions still missing: {}",
            root.describe(),
            describe_revisions(&still_missing).join(", ")
        );
        let settings = self
            .settings_factory
            .all_refs(include_tags || self.fetch_all_refs_enabled);
        self.fetch(repository_dir, root, &settings, &mut report)
            .await?;
        report.fetched_all = true;

        let missing = find_refs_to_fetch(repository_dir, &still_missing, false).await?;
        let missing_tips: Vec<RefCommit> = missing.into_iter().filter(RefCommit::is_ref_tip).collect();
        if !missing_tips.is_empty() {
            return Err(VcsError::missing_revisions(
                describe_revisions(&missing_tips),
                self.missing_revisions_recoverable,
            ));
        }
        Ok(report)
    }

    async fn fetch(
        &self,
        repository_dir: &Path,
        root: &VcsRootConfig,
        settings: &FetchSettings,
        report: &mut LoadCommitsReport,
    ) -> VcsResult<()> {
        if !settings.is_fetch_all() && settings.ref_specs.is_empty() {
            debug!("No refspecs to fetch for {}", root.describe());
            return Ok(());
        }
        self.operations
            .fetch_command()
            .fetch(repository_dir, root, settings)
            .await?;
        report.fetches += 1;
        Ok(())
    }

    async fn list_remote_refs(&self, root: &VcsRootConfig) -> VcsResult<HashSet<String>> {
        let refs = self
            .operations
            .ls_remote_command()
            .ls_remote(root, &LsRemoteOptions::default())
            .await?;
        Ok(refs.into_iter().map(|r| r.ref_name().to_string()).collect())
    }
}
