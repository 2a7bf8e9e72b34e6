use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

use crate::common::error::VcsError;

const MAX_URL_LENGTH: usize = 2048;
const MASK: &str = "*****";

/// リポジトリURL関連のエラー
#[derive(Debug, Error, PartialEq)]
pub enum RepositoryUrlError {
    #[error("Empty repository url")]
    Empty,

    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Invalid characters in URL: {0}")]
    InvalidCharacters(String),
}

/// URLのトランスポート種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlScheme {
    Http,
    Https,
    Ssh,
    Git,
    File,
}

impl UrlScheme {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "ssh" | "git+ssh" | "ssh+git" => Some(Self::Ssh),
            "git" => Some(Self::Git),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// リモートリポジトリのURL値オブジェクト
///
/// `https://host/path`、`ssh://user@host/path`、scp形式の `user@host:path`、
/// ローカルパスを扱う。コマンドラインに渡すため `-` で始まるURLは拒否する。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryUrl {
    /// 入力されたURL文字列
    raw: String,

    scheme: UrlScheme,

    host: Option<String>,

    user: Option<String>,

    /// URLに埋め込まれたパスワード（ログには出さない）
    password: Option<String>,

    path: String,
}

impl RepositoryUrl {
    pub fn parse(url: &str) -> Result<Self, RepositoryUrlError> {
        let trimmed = url.trim();
        Self::validate_security(trimmed)?;

        if trimmed.contains("://") {
            return Self::parse_standard(trimmed);
        }
        if let Some(parsed) = Self::parse_scp_like(trimmed) {
            return Ok(parsed);
        }

        Ok(Self {
            raw: trimmed.to_string(),
            scheme: UrlScheme::File,
            host: None,
            user: None,
            password: None,
            path: trimmed.to_string(),
        })
    }

    fn validate_security(url: &str) -> Result<(), RepositoryUrlError> {
        if url.is_empty() {
            return Err(RepositoryUrlError::Empty);
        }
        if url.len() > MAX_URL_LENGTH {
            return Err(RepositoryUrlError::InvalidFormat("URL too long".to_string()));
        }
        if url.starts_with('-') {
            return Err(RepositoryUrlError::InvalidCharacters(
                "URL must not start with '-'".to_string(),
            ));
        }
        if let Some(ch) = url.chars().find(|c| c.is_control()) {
            return Err(RepositoryUrlError::InvalidCharacters(format!(
                "Control character detected: {:?}",
                ch
            )));
        }
        Ok(())
    }

    fn parse_standard(url: &str) -> Result<Self, RepositoryUrlError> {
        let parsed = Url::parse(url).map_err(|e| RepositoryUrlError::InvalidFormat(e.to_string()))?;
        let scheme = UrlScheme::from_name(parsed.scheme())
            .ok_or_else(|| RepositoryUrlError::UnsupportedScheme(parsed.scheme().to_string()))?;

        let host = parsed.host_str().map(str::to_string);
        if host.is_none() && scheme != UrlScheme::File {
            return Err(RepositoryUrlError::MissingHost);
        }

        let user = Some(parsed.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(Self {
            raw: url.to_string(),
            scheme,
            host,
            user,
            password: parsed.password().map(str::to_string),
            path: parsed.path().to_string(),
        })
    }

    /// scp形式（`[user@]host:path`）のURLを解析する
    ///
    /// `C:\repo` のようなWindowsのドライブ指定はローカルパスとして扱う。
    fn parse_scp_like(url: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^(?:([^@/:]+)@)?([^@/:]+):(.+)$").expect("scp-like url pattern is valid")
        });

        let captures = pattern.captures(url)?;
        let host = captures.get(2)?.as_str();
        if host.len() == 1 && host.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        Some(Self {
            raw: url.to_string(),
            scheme: UrlScheme::Ssh,
            host: Some(host.to_string()),
            user: captures.get(1).map(|m| m.as_str().to_string()),
            password: None,
            path: captures.get(3)?.as_str().to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> UrlScheme {
        self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_ssh(&self) -> bool {
        self.scheme == UrlScheme::Ssh
    }

    pub fn is_http(&self) -> bool {
        matches!(self.scheme, UrlScheme::Http | UrlScheme::Https)
    }

    pub fn is_local(&self) -> bool {
        self.scheme == UrlScheme::File
    }

    /// 認証情報を埋め込んだURLを返す
    ///
    /// HTTP(S)ではユーザー名とパスワード、SSHではユーザー名のみを設定する。
    /// それ以外のスキームでは元のURLを返す。
    pub fn with_credentials(&self, user: Option<&str>, password: Option<&str>) -> String {
        match self.scheme {
            UrlScheme::Http | UrlScheme::Https | UrlScheme::Ssh if self.raw.contains("://") => {
                let Ok(mut url) = Url::parse(&self.raw) else {
                    return self.raw.clone();
                };
                if let Some(user) = user.filter(|u| !u.is_empty()) {
                    let _ = url.set_username(user);
                }
                if self.is_http() {
                    if let Some(password) = password.filter(|p| !p.is_empty()) {
                        let _ = url.set_password(Some(password));
                    }
                }
                url.to_string()
            }
            UrlScheme::Ssh => match (user.filter(|u| !u.is_empty()), &self.host) {
                (Some(user), Some(host)) => format!("{}@{}:{}", user, host, self.path),
                _ => self.raw.clone(),
            },
            _ => self.raw.clone(),
        }
    }

    /// パスワードを伏せたURLを返す
    pub fn masked(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => {
                self.raw.replacen(&format!(":{}@", password), &format!(":{}@", MASK), 1)
            }
            _ => self.raw.clone(),
        }
    }
}

impl fmt::Display for RepositoryUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

impl std::str::FromStr for RepositoryUrl {
    type Err = RepositoryUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<RepositoryUrlError> for VcsError {
    fn from(error: RepositoryUrlError) -> Self {
        VcsError::invalid_url("", error.to_string())
    }
}

/// URLを解析し、失敗した場合は元のURLを含むエラーを返す
pub fn parse_repository_url(url: &str) -> Result<RepositoryUrl, VcsError> {
    RepositoryUrl::parse(url).map_err(|e| VcsError::invalid_url(url, e.to_string()))
}
