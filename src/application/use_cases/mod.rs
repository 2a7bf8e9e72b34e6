pub mod list_remote_refs;
pub mod load_commits;
pub mod test_connection;

pub use list_remote_refs::{ListRemoteRefsUseCase, RemoteRefsResult};
pub use load_commits::{LoadCommitsReport, LoadCommitsUseCase, RepositoryLocks};
pub use test_connection::{TestConnectionReport, TestConnectionUseCase};
