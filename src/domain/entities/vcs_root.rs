use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::common::error::VcsError;
use crate::domain::value_objects::git_url::{parse_repository_url, RepositoryUrl};
use crate::domain::value_objects::ref_commit::expand_ref;

/// 認証方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// 認証なし
    #[default]
    Anonymous,

    /// `~/.ssh` の既定の鍵またはssh-agent
    PrivateKeyDefault,

    /// ディスク上の秘密鍵ファイル
    PrivateKeyFile,

    /// サーバーにアップロードされた名前付きの鍵
    UploadedKey,

    /// ユーザー名とパスワード（またはトークン）
    Password,
}

impl AuthMethod {
    pub fn is_key_auth(&self) -> bool {
        matches!(
            self,
            Self::PrivateKeyDefault | Self::PrivateKeyFile | Self::UploadedKey
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Anonymous => "Anonymous",
            Self::PrivateKeyDefault => "Default Private Key",
            Self::PrivateKeyFile => "Private Key",
            Self::UploadedKey => "Uploaded Key",
            Self::Password => "Password",
        }
    }
}

/// リポジトリの認証設定
///
/// 認証方式に関係しない項目は [`AuthSettings::normalized`] で取り除かれる。
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub method: AuthMethod,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// `private_key_file` で使う鍵ファイルのパス
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,

    /// `uploaded_key` で使う鍵の名前
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    /// ホスト鍵の検証を行わない
    pub ignore_known_hosts: bool,
}

impl AuthSettings {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::Password,
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn private_key_file(path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            method: AuthMethod::PrivateKeyFile,
            private_key_path: Some(path.into()),
            passphrase,
            ..Self::default()
        }
    }

    pub fn uploaded_key(key_name: impl Into<String>, passphrase: Option<String>) -> Self {
        Self {
            method: AuthMethod::UploadedKey,
            uploaded_key: Some(key_name.into()),
            passphrase,
            ..Self::default()
        }
    }

    pub fn default_private_key() -> Self {
        Self {
            method: AuthMethod::PrivateKeyDefault,
            ..Self::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_ignore_known_hosts(mut self, ignore: bool) -> Self {
        self.ignore_known_hosts = ignore;
        self
    }

    /// 認証方式に応じて不要な項目を取り除く
    ///
    /// - 匿名認証ではユーザー名を持たない
    /// - パスワードはパスワード認証でのみ保持する
    /// - 鍵ファイルのパスは鍵ファイル認証でのみ保持する
    /// - パスフレーズは鍵ファイル認証とアップロード鍵認証でのみ保持する
    pub fn normalized(&self) -> Self {
        let method = self.method;
        Self {
            method,
            username: match method {
                AuthMethod::Anonymous => None,
                _ => self.username.clone().filter(|u| !u.is_empty()),
            },
            password: match method {
                AuthMethod::Password => self.password.clone(),
                _ => None,
            },
            private_key_path: match method {
                AuthMethod::PrivateKeyFile => self.private_key_path.clone(),
                _ => None,
            },
            uploaded_key: match method {
                AuthMethod::UploadedKey => self.uploaded_key.clone(),
                _ => None,
            },
            passphrase: match method {
                AuthMethod::PrivateKeyFile | AuthMethod::UploadedKey => self.passphrase.clone(),
                _ => None,
            },
            ignore_known_hosts: self.ignore_known_hosts,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("method", &self.method)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "*****"))
            .field("private_key_path", &self.private_key_path)
            .field("uploaded_key", &self.uploaded_key)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "*****"))
            .field("ignore_known_hosts", &self.ignore_known_hosts)
            .finish()
    }
}

/// VCSルート（リモートリポジトリ1つ分の設定）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsRootConfig {
    /// ルートの識別子
    pub id: String,

    /// fetchに使うURL
    pub fetch_url: String,

    /// pushに使うURL（未指定ならfetch_url）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_url: Option<String>,

    /// 既定ブランチ
    #[serde(default = "default_branch")]
    pub branch: String,

    /// タグをブランチと同様に扱う
    #[serde(default)]
    pub report_tags: bool,

    #[serde(default)]
    pub auth: AuthSettings,
}

fn default_branch() -> String {
    "refs/heads/main".to_string()
}

impl VcsRootConfig {
    pub fn new(id: impl Into<String>, fetch_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fetch_url: fetch_url.into(),
            push_url: None,
            branch: default_branch(),
            report_tags: false,
            auth: AuthSettings::default(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_auth(mut self, auth: AuthSettings) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_report_tags(mut self, report_tags: bool) -> Self {
        self.report_tags = report_tags;
        self
    }

    pub fn with_push_url(mut self, push_url: impl Into<String>) -> Self {
        self.push_url = Some(push_url.into());
        self
    }

    /// 完全修飾された既定ブランチ名
    pub fn default_ref(&self) -> String {
        expand_ref(&self.branch)
    }

    pub fn repository_url(&self) -> Result<RepositoryUrl, VcsError> {
        parse_repository_url(&self.fetch_url)
    }

    pub fn push_url(&self) -> &str {
        self.push_url.as_deref().unwrap_or(&self.fetch_url)
    }

    /// ログ用の表示名
    pub fn describe(&self) -> String {
        let url = RepositoryUrl::parse(&self.fetch_url)
            .map(|u| u.masked())
            .unwrap_or_else(|_| self.fetch_url.clone());
        format!("{} ({})", self.id, url)
    }
}
