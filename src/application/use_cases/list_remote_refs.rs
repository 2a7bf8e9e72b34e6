use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::domain::value_objects::ref_commit::RefCommit;
use crate::infrastructure::git::ls_remote::LsRemoteOptions;
use crate::infrastructure::git::repo_operations::GitRepoOperations;

/// 1つのリポジトリに対するls-remoteの結果
#[derive(Debug, Clone, Serialize)]
pub struct RemoteRefsResult {
    pub root_id: String,

    /// ログに出せる形のURL
    pub url: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<RefCommit>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemoteRefsResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 複数のリポジトリに並列でls-remoteを実行する
pub struct ListRemoteRefsUseCase {
    operations: Arc<dyn GitRepoOperations>,
    jobs: usize,
}

impl ListRemoteRefsUseCase {
    pub fn new(operations: Arc<dyn GitRepoOperations>) -> Self {
        Self {
            operations,
            jobs: num_cpus::get(),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// 結果は入力と同じ順序で返す。失敗したリポジトリはエラーメッセージを持つ。
    pub async fn execute(
        &self,
        roots: &[VcsRootConfig],
        options: &LsRemoteOptions,
    ) -> Vec<RemoteRefsResult> {
        let command = self.operations.ls_remote_command();
        debug!("Listing refs of {} repositories with {} jobs", roots.len(), self.jobs);

        let mut results: Vec<(usize, RemoteRefsResult)> = stream::iter(roots.iter().enumerate())
            .map(|(index, root)| {
                let command = command.clone();
                async move {
                    let url = root
                        .repository_url()
                        .map(|u| u.masked())
                        .unwrap_or_else(|_| root.fetch_url.clone());
                    let result = match command.ls_remote(root, options).await {
                        Ok(refs) => RemoteRefsResult {
                            root_id: root.id.clone(),
                            url,
                            refs,
                            error: None,
                        },
                        Err(e) => {
                            warn!("ls-remote failed for {}: {}", url, e);
                            RemoteRefsResult {
                                root_id: root.id.clone(),
                                url,
                                refs: Vec::new(),
                                error: Some(e.to_string()),
                            }
                        }
                    };
                    (index, result)
                }
            })
            .buffer_unordered(self.jobs)
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }
}
