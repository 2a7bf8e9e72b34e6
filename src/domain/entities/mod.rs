pub mod fetch_settings;
pub mod server_config;
pub mod vcs_root;

pub use fetch_settings::{FetchMode, FetchSettings};
pub use server_config::{NativeOperationsConfig, ServerConfig, SshConfig, UrlOverride};
pub use vcs_root::{AuthMethod, AuthSettings, VcsRootConfig};
