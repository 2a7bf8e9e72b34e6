use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// すべてのrefをそのままの名前で取得するrefspec
pub const ALL_REFS_SPEC: &str = "+refs/*:refs/*";
/// タグを除外する否定refspec
pub const EXCLUDE_TAGS_SPEC: &str = "^refs/tags/*";
/// 否定refspecを使えない場合の代替（ブランチのみ）
pub const ALL_BRANCHES_SPEC: &str = "+refs/heads/*:refs/heads/*";

#[derive(Debug, Error, PartialEq)]
pub enum RefSpecError {
    #[error("Refspec must not be empty")]
    Empty,

    #[error("Invalid refspec '{0}'")]
    InvalidFormat(String),
}

/// fetchに渡すrefspec
///
/// `[+]<src>[:<dst>]` または否定形の `^<src>` を表す。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefSpec {
    source: String,
    destination: Option<String>,
    force: bool,
    negative: bool,
}

impl RefSpec {
    /// refを同じ名前のローカルrefへ強制更新するrefspec（`+ref:ref`）
    pub fn mirror(ref_name: impl Into<String>) -> Self {
        let source = ref_name.into();
        Self {
            destination: Some(source.clone()),
            source,
            force: true,
            negative: false,
        }
    }

    pub fn all_refs() -> Self {
        Self::mirror("refs/*")
    }

    pub fn exclude_tags() -> Self {
        Self {
            source: "refs/tags/*".to_string(),
            destination: None,
            force: false,
            negative: true,
        }
    }

    pub fn all_branches() -> Self {
        Self::mirror("refs/heads/*")
    }

    pub fn parse(spec: &str) -> Result<Self, RefSpecError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(RefSpecError::Empty);
        }

        if let Some(source) = spec.strip_prefix('^') {
            if source.is_empty() || source.contains(':') {
                return Err(RefSpecError::InvalidFormat(spec.to_string()));
            }
            return Ok(Self {
                source: source.to_string(),
                destination: None,
                force: false,
                negative: true,
            });
        }

        let (force, rest) = match spec.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };

        let (source, destination) = match rest.split_once(':') {
            Some((src, dst)) => (src, Some(dst)),
            None => (rest, None),
        };

        if source.is_empty() || source.contains(char::is_whitespace) {
            return Err(RefSpecError::InvalidFormat(spec.to_string()));
        }
        if let Some(dst) = destination {
            if dst.contains(char::is_whitespace) || dst.contains(':') {
                return Err(RefSpecError::InvalidFormat(spec.to_string()));
            }
        }

        Ok(Self {
            source: source.to_string(),
            destination: destination.filter(|d| !d.is_empty()).map(str::to_string),
            force,
            negative: false,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn is_force(&self) -> bool {
        self.force
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_wildcard(&self) -> bool {
        self.source.contains('*')
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            return write!(f, "^{}", self.source);
        }
        if self.force {
            write!(f, "+")?;
        }
        write!(f, "{}", self.source)?;
        if let Some(dst) = &self.destination {
            write!(f, ":{}", dst)?;
        }
        Ok(())
    }
}

impl FromStr for RefSpec {
    type Err = RefSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RefSpec {
    type Error = RefSpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RefSpec> for String {
    fn from(spec: RefSpec) -> Self {
        spec.to_string()
    }
}
