use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::common::error::VcsError;
use crate::common::result::{OptionExt, VcsResult};
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::infrastructure::git::ls_remote::LsRemoteOptions;
use crate::infrastructure::git::repo_operations::GitRepoOperations;

/// 接続確認の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestConnectionReport {
    /// ログに出せる形のURL
    pub url: String,

    pub default_branch: String,

    /// デフォルトブランチが指すコミット
    pub default_branch_commit: String,

    /// リモートが公開しているrefの数
    pub refs_count: usize,

    pub checked_at: DateTime<Utc>,
}

/// リモートにアクセスできてデフォルトブランチが存在するかを確認する
pub struct TestConnectionUseCase {
    operations: Arc<dyn GitRepoOperations>,
}

impl TestConnectionUseCase {
    pub fn new(operations: Arc<dyn GitRepoOperations>) -> Self {
        Self { operations }
    }

    #[instrument(skip_all, fields(root = %root.id))]
    pub async fn execute(&self, root: &VcsRootConfig) -> VcsResult<TestConnectionReport> {
        let url = root.repository_url()?;
        let refs = self
            .operations
            .ls_remote_command()
            .ls_remote(root, &LsRemoteOptions::default())
            .await?;

        let default_branch = root.default_ref();
        let commit = refs
            .iter()
            .find(|r| r.ref_name() == default_branch)
            .map(|r| r.commit().to_string())
            .ok_or_vcs(VcsError::remote_refs_not_found(vec![default_branch.clone()]))?;

        info!(
            "Connection to {} succeeded, {} refs advertised",
            url.masked(),
            refs.len()
        );
        Ok(TestConnectionReport {
            url: url.masked(),
            default_branch,
            default_branch_commit: commit,
            refs_count: refs.len(),
            checked_at: Utc::now(),
        })
    }
}
