pub mod git_url;
pub mod git_version;
pub mod ref_commit;
pub mod ref_spec;

pub use git_url::{parse_repository_url, RepositoryUrl, RepositoryUrlError, UrlScheme};
pub use git_version::{GitVersion, GitVersionError};
pub use ref_commit::{expand_ref, RefCommit, RefCommitError};
pub use ref_spec::{RefSpec, RefSpecError};
