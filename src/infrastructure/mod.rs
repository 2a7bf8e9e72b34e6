/// Infrastructure layer modules
///
/// This layer provides concrete implementations for external system interactions:
/// - Git operations (ls-remote, fetch) through native git or libgit2
/// - Process execution (git command runner)
/// - SSH key lookup
/// - File system operations (config files)
pub mod filesystem;
pub mod git;
pub mod process;
pub mod ssh;

// Re-export commonly used types
pub use filesystem::config_store::{ConfigStore, ConfigStoreError};
pub use git::{FetchCommand, GitRepoOperations, GitRepoOperationsImpl, LsRemoteCommand};
pub use process::GitCommandLine;
pub use ssh::VcsRootSshKeyManager;
