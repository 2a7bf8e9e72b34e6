use std::collections::HashSet;

use tracing::{debug, warn};

use crate::common::error::VcsError;
use crate::common::result::VcsResult;
use crate::domain::entities::fetch_settings::{FetchMode, FetchSettings};
use crate::domain::entities::server_config::ServerConfig;
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::domain::value_objects::ref_commit::{is_tag, RefCommit};
use crate::domain::value_objects::ref_spec::RefSpec;

/// コミット取得のためのfetch設定を組み立てる
#[derive(Debug, Clone)]
pub struct FetchSettingsFactory {
    fetch_remote_branches_factor: f32,
    fail_if_remote_branch_missing: bool,
    missing_branch_recoverable: bool,
}

impl FetchSettingsFactory {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            fetch_remote_branches_factor: config.fetch_remote_branches_factor,
            fail_if_remote_branch_missing: config.fail_if_remote_branch_missing,
            missing_branch_recoverable: config.missing_revisions_recoverable,
        }
    }

    /// 指定されたリビジョンを取得するための設定
    ///
    /// `refs_to_fetch` のうちリモートに存在するrefだけをrefspecにする。
    /// 既知のブランチ数がリモートのブランチ数に近ければ全refを取得する。
    pub fn for_revisions(
        &self,
        root: &VcsRootConfig,
        refs_to_fetch: &[RefCommit],
        revisions: &[RefCommit],
        remote_refs: &HashSet<String>,
        include_tags: bool,
    ) -> VcsResult<FetchSettings> {
        let filtered = filter_remote_refs(root, remote_refs);
        let fetch_all = self.should_fetch_all(revisions, filtered.len());
        let ref_specs = self.ref_specs_for(root, refs_to_fetch, remote_refs)?;

        let mode = if fetch_all {
            FetchMode::for_fetch_all(include_tags)
        } else {
            FetchMode::RefSpecs
        };
        debug!(
            "Fetch mode {:?} with {} refspec(s) for {}",
            mode,
            ref_specs.len(),
            root.describe()
        );
        Ok(FetchSettings::new(ref_specs)
            .with_mode(mode)
            .with_fetch_tags(include_tags))
    }

    /// 全refを取得する設定
    pub fn all_refs(&self, include_tags: bool) -> FetchSettings {
        FetchSettings::all_refs(include_tags).with_mode(FetchMode::for_fetch_all(include_tags))
    }

    fn should_fetch_all(&self, revisions: &[RefCommit], remote_count: usize) -> bool {
        let factor = self.fetch_remote_branches_factor;
        if factor == 0.0 {
            return false;
        }

        let state_count = revisions
            .iter()
            .map(RefCommit::ref_name)
            .collect::<HashSet<_>>()
            .len();
        if state_count == 1 {
            return false;
        }
        if remote_count == 0 {
            return state_count > 0;
        }
        remote_count < state_count || state_count as f32 / remote_count as f32 >= factor
    }

    fn ref_specs_for(
        &self,
        root: &VcsRootConfig,
        refs_to_fetch: &[RefCommit],
        remote_refs: &HashSet<String>,
    ) -> VcsResult<Vec<RefSpec>> {
        let mut specs: Vec<RefSpec> = Vec::new();
        let mut missing_tips: Vec<String> = Vec::new();

        for r in refs_to_fetch {
            let name = r.ref_name();
            if remote_refs.contains(name) {
                let spec = RefSpec::mirror(name);
                if !specs.contains(&spec) {
                    specs.push(spec);
                }
            } else if r.is_ref_tip() {
                if !missing_tips.iter().any(|m| m == name) {
                    missing_tips.push(name.to_string());
                }
            } else {
                debug!(
                    "Ref {} is no longer present in the remote repository for {}",
                    name,
                    root.describe()
                );
            }
        }

        if self.fail_if_remote_branch_missing && !missing_tips.is_empty() {
            let error = VcsError::remote_refs_not_found(missing_tips);
            if !self.missing_branch_recoverable {
                return Err(error);
            }
            warn!("{}", error);
            let VcsError::RemoteRefNotFound { refs, .. } = error else {
                return Err(error);
            };
            return Err(VcsError::missing_revisions(refs, true));
        }
        Ok(specs)
    }
}

/// タグは `report_tags` が無効なら除外する。ただしデフォルトブランチがタグなら残す。
fn filter_remote_refs<'a>(root: &VcsRootConfig, refs: &'a HashSet<String>) -> HashSet<&'a str> {
    if root.report_tags {
        return refs.iter().map(String::as_str).collect();
    }
    let default_branch = root.default_ref();
    refs.iter()
        .map(String::as_str)
        .filter(|r| !is_tag(r) || *r == default_branch)
        .collect()
}
