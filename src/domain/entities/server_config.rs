use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::common::operation::RetryPolicy;

/// ネイティブgitを使うかどうかのURL単位の上書き
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlOverride {
    /// URLに含まれていれば一致とみなす文字列
    pub url: String,

    pub enabled: bool,
}

/// ネイティブgitの利用設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeOperationsConfig {
    pub enabled: bool,

    /// 先に一致したものが優先される
    pub url_overrides: Vec<UrlOverride>,
}

impl Default for NativeOperationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url_overrides: Vec::new(),
        }
    }
}

impl NativeOperationsConfig {
    /// URLに対してネイティブgitが有効かどうか
    pub fn enabled_for(&self, url: &str) -> bool {
        self.url_overrides
            .iter()
            .find(|o| !o.url.is_empty() && url.contains(&o.url))
            .map(|o| o.enabled)
            .unwrap_or(self.enabled)
    }
}

/// SSH関連の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// アップロード鍵を格納するディレクトリ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys_dir: Option<PathBuf>,

    /// ホスト鍵の検証を無効にすることを許可する
    pub ignore_known_hosts: bool,

    /// `GIT_SSH_COMMAND` に追加するオプション
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_options: Option<String>,

    /// sshに `-vvv` を付ける
    pub debug: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            keys_dir: None,
            ignore_known_hosts: true,
            command_options: None,
            debug: false,
        }
    }
}

/// サーバー全体の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// gitの実行ファイル
    #[validate(length(min = 1))]
    pub git_path: String,

    pub native_operations: NativeOperationsConfig,

    #[validate(range(min = 1, max = 10))]
    pub connection_retry_attempts: u32,

    pub connection_retry_interval_ms: u64,

    #[validate(range(min = 1))]
    pub fetch_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub ls_remote_timeout_secs: u64,

    pub ssh: SshConfig,

    /// リモートのブランチ数に対する既知のブランチ数の比率がこの値以上なら全refを取得する
    #[validate(range(min = 0.0, max = 1.0))]
    pub fetch_remote_branches_factor: f32,

    pub fail_if_remote_branch_missing: bool,

    /// 選択的fetch後も先端が欠けていれば全refを取得する
    pub fetch_all_refs_enabled: bool,

    /// 欠けたリビジョンを再試行可能なエラーとして扱う
    pub missing_revisions_recoverable: bool,

    #[validate(range(min = 1))]
    pub write_lock_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            git_path: "git".to_string(),
            native_operations: NativeOperationsConfig::default(),
            connection_retry_attempts: 3,
            connection_retry_interval_ms: 5000,
            fetch_timeout_secs: 3600,
            ls_remote_timeout_secs: 60,
            ssh: SshConfig::default(),
            fetch_remote_branches_factor: 0.0,
            fail_if_remote_branch_missing: false,
            fetch_all_refs_enabled: false,
            missing_revisions_recoverable: false,
            write_lock_timeout_secs: 300,
        }
    }
}

impl ServerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connection_retry_attempts,
            Duration::from_millis(self.connection_retry_interval_ms),
        )
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn ls_remote_timeout(&self) -> Duration {
        Duration::from_secs(self.ls_remote_timeout_secs)
    }

    pub fn write_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.write_lock_timeout_secs)
    }

    pub fn with_git_path(mut self, git_path: impl Into<String>) -> Self {
        self.git_path = git_path.into();
        self
    }

    pub fn with_native_operations(mut self, enabled: bool) -> Self {
        self.native_operations.enabled = enabled;
        self
    }

    pub fn with_keys_dir(mut self, keys_dir: impl Into<PathBuf>) -> Self {
        self.ssh.keys_dir = Some(keys_dir.into());
        self
    }
}
