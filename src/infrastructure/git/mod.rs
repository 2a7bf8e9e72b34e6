pub mod auth;
pub mod fetch;
pub mod git_detector;
pub mod libgit2;
pub mod ls_remote;
pub mod repo_operations;

// Re-export main types for convenience
pub use fetch::{FetchCommand, NativeFetchCommand};
pub use git_detector::{GitDetector, GitExec};
pub use libgit2::{Libgit2FetchCommand, Libgit2LsRemoteCommand};
pub use ls_remote::{LsRemoteCommand, LsRemoteOptions, NativeLsRemoteCommand};
pub use repo_operations::{GitRepoOperations, GitRepoOperationsImpl};
