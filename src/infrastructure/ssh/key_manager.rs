//! Lookup of uploaded SSH private keys by repository configuration.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::domain::entities::vcs_root::{AuthMethod, VcsRootConfig};

/// Resolves the private key associated with a repository configuration.
///
/// A missing key is a normal outcome and yields `None`.
#[cfg_attr(test, mockall::automock)]
pub trait VcsRootSshKeyManager: Send + Sync {
    fn get_key(&self, root: &VcsRootConfig) -> Option<String>;
}

/// Name of the uploaded key referenced by `root`, if its auth method uses one.
pub fn uploaded_key_name(root: &VcsRootConfig) -> Option<&str> {
    if root.auth.method != AuthMethod::UploadedKey {
        return None;
    }
    root.auth
        .uploaded_key
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Key manager for setups without uploaded keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSshKeyManager;

impl VcsRootSshKeyManager for NoSshKeyManager {
    fn get_key(&self, _root: &VcsRootConfig) -> Option<String> {
        None
    }
}

/// Keys registered at runtime, keyed by name.
#[derive(Debug, Default)]
pub struct InMemorySshKeyManager {
    keys: RwLock<HashMap<String, String>>,
}

impl InMemorySshKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.add_key(name, key);
        self
    }

    pub fn add_key(&self, name: impl Into<String>, key: impl Into<String>) {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.insert(name.into(), key.into());
    }

    pub fn remove_key(&self, name: &str) -> Option<String> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.remove(name)
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VcsRootSshKeyManager for InMemorySshKeyManager {
    fn get_key(&self, root: &VcsRootConfig) -> Option<String> {
        let name = uploaded_key_name(root)?;
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        let key = keys.get(name).cloned();
        if key.is_none() {
            debug!("SSH key '{}' is not registered", name);
        }
        key
    }
}

/// Keys stored as files named after the key inside one directory.
#[derive(Debug, Clone)]
pub struct FileSystemSshKeyManager {
    keys_dir: PathBuf,
}

impl FileSystemSshKeyManager {
    pub fn new(keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            keys_dir: keys_dir.into(),
        }
    }

    pub fn keys_dir(&self) -> &Path {
        &self.keys_dir
    }

    /// Path of the key file, or `None` when the name would leave the keys directory.
    fn key_path(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.keys_dir.join(relative)),
            _ => None,
        }
    }
}

impl VcsRootSshKeyManager for FileSystemSshKeyManager {
    fn get_key(&self, root: &VcsRootConfig) -> Option<String> {
        let name = uploaded_key_name(root)?;
        let Some(path) = self.key_path(name) else {
            warn!("Ignoring SSH key with invalid name '{}'", name);
            return None;
        };

        match std::fs::read_to_string(&path) {
            Ok(key) => Some(key),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("SSH key '{}' not found in {}", name, self.keys_dir.display());
                None
            }
            Err(e) => {
                warn!("Failed to read SSH key {}: {}", path.display(), e);
                None
            }
        }
    }
}
