use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use validator::Validate;

use crate::common::error::VcsError;
use crate::domain::entities::server_config::ServerConfig;

/// Configuration store related errors
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("Configuration file not found at path: {0}")]
    ConfigFileNotFound(String),

    #[error("Configuration file read failed: {0}")]
    ReadFailed(String),

    #[error("Configuration file write failed: {0}")]
    WriteFailed(String),

    #[error("YAML parsing failed: {0}")]
    YamlParsingFailed(String),

    #[error("YAML serialization failed: {0}")]
    YamlSerializationFailed(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Configuration directory creation failed: {0}")]
    DirectoryCreationFailed(String),
}

impl From<ConfigStoreError> for VcsError {
    fn from(error: ConfigStoreError) -> Self {
        VcsError::config_error_with_source(error.to_string(), error)
    }
}

/// Loads and saves the server configuration as YAML
#[derive(Debug, Clone, Default)]
pub struct ConfigStore;

impl ConfigStore {
    pub fn new() -> Self {
        Self
    }

    /// Read and validate configuration from a YAML file
    pub fn load<P: AsRef<Path>>(&self, config_path: P) -> Result<ServerConfig, ConfigStoreError> {
        let config_path = config_path.as_ref();

        if !config_path.exists() {
            return Err(ConfigStoreError::ConfigFileNotFound(
                config_path.display().to_string(),
            ));
        }

        let contents = fs::read_to_string(config_path)
            .map_err(|e| ConfigStoreError::ReadFailed(e.to_string()))?;

        debug!("Loaded configuration from {}", config_path.display());
        self.from_yaml_str(&contents)
    }

    /// Read configuration from `config_path`, or use defaults when no path is given
    pub fn load_or_default(
        &self,
        config_path: Option<&Path>,
    ) -> Result<ServerConfig, ConfigStoreError> {
        match config_path {
            Some(path) => self.load(path),
            None => Ok(ServerConfig::default()),
        }
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(&self, contents: &str) -> Result<ServerConfig, ConfigStoreError> {
        // An empty document means "all defaults"
        let config: ServerConfig = if contents.trim().is_empty() {
            ServerConfig::default()
        } else {
            serde_yaml::from_str(contents)
                .map_err(|e| ConfigStoreError::YamlParsingFailed(e.to_string()))?
        };
        self.validate(&config)?;
        Ok(config)
    }

    /// Validate and write configuration to a YAML file
    pub fn save<P: AsRef<Path>>(
        &self,
        config_path: P,
        config: &ServerConfig,
    ) -> Result<PathBuf, ConfigStoreError> {
        let config_path = config_path.as_ref();
        self.validate(config)?;

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigStoreError::DirectoryCreationFailed(e.to_string()))?;
        }

        let yaml_content = serde_yaml::to_string(config)
            .map_err(|e| ConfigStoreError::YamlSerializationFailed(e.to_string()))?;

        fs::write(config_path, yaml_content)
            .map_err(|e| ConfigStoreError::WriteFailed(e.to_string()))?;

        Ok(config_path.to_path_buf())
    }

    fn validate(&self, config: &ServerConfig) -> Result<(), ConfigStoreError> {
        config
            .validate()
            .map_err(|e| ConfigStoreError::ValidationFailed(format!("{:?}", e)))?;
        if config.git_path.trim().is_empty() {
            return Err(ConfigStoreError::ValidationFailed(
                "git_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
