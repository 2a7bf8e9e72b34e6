//! # gitvcs - git fetch and ls-remote for build servers
//!
//! `gitvcs` lists the refs of remote git repositories and fetches commits into local
//! clones on behalf of VCS roots. Every root carries its own URL and credentials, and
//! every operation picks either the native git executable or libgit2.
//!
//! ## Features
//!
//! - **ls-remote**: List advertised refs with peeled tags, optionally for many roots in parallel
//! - **fetch**: Fetch refspecs, all branches or all refs, over `--stdin` when git supports it
//! - **Commit loading**: Fetch only what a local clone misses, falling back to a full fetch
//! - **SSH keys**: Uploaded keys, key files and the default key, resolved per root
//! - **Retries**: Transient network failures are retried with a doubling back-off
//!
//! ## Quick Start
//!
//! ```bash
//! gitvcs ls-remote https://github.com/example/project.git --tags
//! gitvcs fetch /var/cache/clones/project https://github.com/example/project.git --refspec main
//! gitvcs load-commits /var/cache/clones/project https://github.com/example/project.git \
//!     main=0123456789abcdef0123456789abcdef01234567
//! ```
//!
//! ## Architecture
//!
//! - [`domain`]: Roots, refs, refspecs, fetch settings and server configuration
//! - [`application`]: Fetch planning and the commit loading workflow
//! - [`infrastructure`]: Native git, libgit2, SSH keys and configuration files
//! - [`presentation`]: CLI interface
//! - [`common`]: Errors, results and retried/timed operations
//!
//! ## Using the Library
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gitvcs::domain::entities::{ServerConfig, VcsRootConfig};
//! use gitvcs::infrastructure::git::LsRemoteOptions;
//! use gitvcs::infrastructure::ssh::key_manager::NoSshKeyManager;
//! use gitvcs::infrastructure::{GitRepoOperations, GitRepoOperationsImpl};
//!
//! # async fn example() -> gitvcs::Result<()> {
//! let operations = GitRepoOperationsImpl::new(ServerConfig::default(), Arc::new(NoSshKeyManager));
//! let root = VcsRootConfig::new("project", "https://github.com/example/project.git");
//!
//! let refs = operations
//!     .ls_remote_command()
//!     .ls_remote(&root, &LsRemoteOptions::default())
//!     .await?;
//! for r in &refs {
//!     println!("{}\t{}", r.commit(), r.ref_name());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

pub mod application;
pub mod common;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use crate::common::error::VcsError;
pub use crate::common::result::VcsResult as Result;
pub use crate::common::result::VcsResult;
