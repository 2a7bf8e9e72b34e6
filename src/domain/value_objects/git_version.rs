use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GitVersionError {
    #[error("Unable to parse git version from '{0}'")]
    Unparsable(String),
}

/// gitのバージョン
///
/// `git version` の出力から得られる4要素のバージョン番号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GitVersion {
    major: u32,
    minor: u32,
    revision: u32,
    patch_level: u32,
}

impl GitVersion {
    /// サポートする最小バージョン
    pub const MIN: GitVersion = GitVersion::new(1, 6, 4, 0);
    /// 非推奨となるバージョンの上限
    pub const DEPRECATED: GitVersion = GitVersion::new(2, 10, 0, 0);
    /// `git fetch --stdin` が使えるバージョン
    pub const FETCH_STDIN: GitVersion = GitVersion::new(2, 29, 0, 0);
    /// `--progress` が使えるバージョン
    pub const PROGRESS: GitVersion = GitVersion::new(1, 7, 1, 0);
    /// `--recurse-submodules` が使えるバージョン
    pub const RECURSE_SUBMODULES: GitVersion = GitVersion::new(1, 7, 3, 0);
    /// 否定refspecが使えるバージョン
    pub const NEGATIVE_REFSPECS: GitVersion = GitVersion::new(2, 29, 0, 0);

    pub const fn new(major: u32, minor: u32, revision: u32, patch_level: u32) -> Self {
        Self {
            major,
            minor,
            revision,
            patch_level,
        }
    }

    /// `git version` の出力を解析する
    ///
    /// 例: `git version 2.39.2`、`git version 2.37.1 (Apple Git-137.1)`、
    /// `git version 2.41.0.windows.1`
    pub fn parse(output: &str) -> Result<Self, GitVersionError> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^git version (\d+)\.(\d+)(?:\.(\d+))?(?:\.(\d+))?")
                .expect("git version pattern is valid")
        });

        let trimmed = output.trim();
        let captures = pattern
            .captures(trimmed)
            .ok_or_else(|| GitVersionError::Unparsable(trimmed.to_string()))?;

        let component = |idx: usize| -> Result<u32, GitVersionError> {
            match captures.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| GitVersionError::Unparsable(trimmed.to_string())),
                None => Ok(0),
            }
        };

        Ok(Self::new(component(1)?, component(2)?, component(3)?, component(4)?))
    }

    pub fn is_supported(&self) -> bool {
        *self >= Self::MIN
    }

    pub fn is_deprecated(&self) -> bool {
        *self < Self::DEPRECATED
    }

    pub fn fetch_supports_stdin(&self) -> bool {
        *self >= Self::FETCH_STDIN
    }

    pub fn supports_progress(&self) -> bool {
        *self >= Self::PROGRESS
    }

    pub fn supports_recurse_submodules(&self) -> bool {
        *self >= Self::RECURSE_SUBMODULES
    }

    pub fn supports_negative_refspecs(&self) -> bool {
        *self >= Self::NEGATIVE_REFSPECS
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.patch_level
        )
    }
}

impl FromStr for GitVersion {
    type Err = GitVersionError;

    /// `2.29.0` のような素のバージョン番号も受け付ける
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("git version") {
            Self::parse(s)
        } else {
            Self::parse(&format!("git version {}", s))
        }
    }
}
