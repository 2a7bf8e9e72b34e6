use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::common::error::VcsError;
use crate::domain::value_objects::ref_spec::RefSpec;

pub const REFS_PREFIX: &str = "refs/";
pub const BRANCHES_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";

/// RefCommit関連のエラー
#[derive(Debug, Error, PartialEq)]
pub enum RefCommitError {
    #[error("Ref name must not be empty")]
    EmptyRef,

    #[error("Commit must not be empty for ref {0}")]
    EmptyCommit(String),
}

impl From<RefCommitError> for VcsError {
    fn from(error: RefCommitError) -> Self {
        VcsError::InvalidRefCommit {
            message: error.to_string(),
        }
    }
}

/// refとそれが指すコミットの組
///
/// `ref_tip` はコミットがrefの先端であることを示す。
/// 等価性とハッシュは `ref_name` と `commit` のみで決まり、`ref_tip` は無視される。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RefCommitRecord")]
pub struct RefCommit {
    /// 完全なref名（例: `refs/heads/main`）
    #[serde(rename = "ref")]
    ref_name: String,

    /// コミットID（16進文字列）
    commit: String,

    /// refの先端コミットかどうか
    ref_tip: bool,
}

#[derive(Deserialize)]
struct RefCommitRecord {
    #[serde(rename = "ref")]
    ref_name: String,
    commit: String,
    #[serde(default = "default_ref_tip")]
    ref_tip: bool,
}

fn default_ref_tip() -> bool {
    true
}

impl TryFrom<RefCommitRecord> for RefCommit {
    type Error = RefCommitError;

    fn try_from(record: RefCommitRecord) -> Result<Self, Self::Error> {
        RefCommit::new(record.ref_name, record.commit, record.ref_tip)
    }
}

impl RefCommit {
    /// 新しいRefCommitを作成する
    ///
    /// ref名とコミットは空であってはならない。
    pub fn new(
        ref_name: impl Into<String>,
        commit: impl Into<String>,
        ref_tip: bool,
    ) -> Result<Self, RefCommitError> {
        let ref_name = ref_name.into().trim().to_string();
        let commit = commit.into().trim().to_string();

        if ref_name.is_empty() {
            return Err(RefCommitError::EmptyRef);
        }
        if commit.is_empty() {
            return Err(RefCommitError::EmptyCommit(ref_name));
        }

        Ok(Self {
            ref_name,
            commit,
            ref_tip,
        })
    }

    /// refの先端を表すRefCommitを作成する
    pub fn tip(ref_name: impl Into<String>, commit: impl Into<String>) -> Result<Self, RefCommitError> {
        Self::new(ref_name, commit, true)
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }

    pub fn is_ref_tip(&self) -> bool {
        self.ref_tip
    }

    /// 完全修飾されたref名を返す
    pub fn full_ref_name(&self) -> String {
        expand_ref(&self.ref_name)
    }

    pub fn is_tag(&self) -> bool {
        is_tag(&self.ref_name)
    }

    pub fn is_branch(&self) -> bool {
        self.full_ref_name().starts_with(BRANCHES_PREFIX)
    }

    /// `refs/heads/` や `refs/tags/` を除いた短い名前
    pub fn short_name(&self) -> &str {
        self.ref_name
            .strip_prefix(BRANCHES_PREFIX)
            .or_else(|| self.ref_name.strip_prefix(TAGS_PREFIX))
            .unwrap_or(&self.ref_name)
    }

    /// このrefを同名のローカルrefへ取得するrefspec
    pub fn to_refspec(&self) -> RefSpec {
        RefSpec::mirror(self.full_ref_name())
    }
}

impl PartialEq for RefCommit {
    fn eq(&self, other: &Self) -> bool {
        self.ref_name == other.ref_name && self.commit == other.commit
    }
}

impl Eq for RefCommit {}

impl Hash for RefCommit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ref_name.hash(state);
        self.commit.hash(state);
    }
}

impl fmt::Display for RefCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.ref_name, self.commit)
    }
}

/// 短いブランチ名を完全なref名に展開する
///
/// `refs/` で始まる名前と `HEAD` はそのまま返す。
pub fn expand_ref(name: &str) -> String {
    if name.starts_with(REFS_PREFIX) || name == "HEAD" {
        name.to_string()
    } else {
        format!("{}{}", BRANCHES_PREFIX, name)
    }
}

pub fn is_tag(name: &str) -> bool {
    name.starts_with(TAGS_PREFIX)
}
