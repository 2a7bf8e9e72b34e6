pub mod key_manager;

pub use key_manager::{
    uploaded_key_name, FileSystemSshKeyManager, InMemorySshKeyManager, NoSshKeyManager,
    VcsRootSshKeyManager,
};
