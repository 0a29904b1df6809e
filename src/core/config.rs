//! Configuration management for ProtoFlow.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::store::{
    DisabledBackend, FileBackend, MemoryBackend, SessionStore, StorageBackend, DEFAULT_KEY_PREFIX,
};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation API settings
    pub ai: AiConfig,

    /// Session storage settings
    pub storage: StorageConfig,

    /// Input validation thresholds
    pub validation: ValidationConfig,
}

/// Generation API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Provider (gemini, demo)
    pub provider: String,

    /// Model to use
    pub model: String,

    /// API base URL
    pub base_url: String,

    /// Transport timeout in seconds (none by default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Which medium backs the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// One file per field in the session directory
    File,
    /// Process memory only
    Memory,
    /// No persistence at all
    Disabled,
}

/// Session storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage medium
    pub backend: StorageKind,

    /// Session directory for the file medium
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Prefix prepended to every persisted key
    pub key_prefix: String,
}

/// Thresholds applied when a workflow is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum accepted credential length
    pub min_credential_len: usize,

    /// Minimum accepted project description length (trimmed)
    pub min_prompt_len: usize,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.protoflow.toml` in current directory
    /// 2. `~/.config/protoflow/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".protoflow.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "Saved configuration");

        Ok(())
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("protoflow"))
    }

    /// Get the data directory path (for the session directory).
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("protoflow"))
    }
}

impl StorageConfig {
    /// Resolve the session directory for the file medium.
    pub fn session_dir(&self) -> Option<PathBuf> {
        self.dir.clone().or_else(|| Config::data_dir().map(|d| d.join("session")))
    }

    /// Build the configured session store.
    ///
    /// Falls back to the disabled medium when no session directory can be
    /// determined for the file medium.
    pub fn open(&self) -> SessionStore {
        let backend: Box<dyn StorageBackend> = match self.backend {
            StorageKind::File => match self.session_dir() {
                Some(dir) => Box::new(FileBackend::new(dir)),
                None => {
                    tracing::warn!("Could not determine session directory, persistence disabled");
                    Box::new(DisabledBackend)
                }
            },
            StorageKind::Memory => Box::new(MemoryBackend::new()),
            StorageKind::Disabled => Box::new(DisabledBackend),
        };
        SessionStore::from_boxed(backend).with_prefix(self.key_prefix.clone())
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: StorageKind::File, dir: None, key_prefix: DEFAULT_KEY_PREFIX.to_string() }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { min_credential_len: 20, min_prompt_len: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ai.provider, "gemini");
        assert_eq!(config.ai.model, "gemini-2.5-flash");
        assert!(config.ai.timeout_secs.is_none());
        assert_eq!(config.storage.backend, StorageKind::File);
        assert_eq!(config.validation.min_credential_len, 20);
        assert_eq!(config.validation.min_prompt_len, 10);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[ai]"));
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[validation]"));
        assert!(toml_str.contains("backend = \"file\""));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [ai]
            provider = "demo"
            timeout_secs = 30

            [storage]
            backend = "memory"

            [validation]
            min_prompt_len = 25
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ai.provider, "demo");
        assert_eq!(config.ai.model, "gemini-2.5-flash");
        assert_eq!(config.ai.timeout_secs, Some(30));
        assert_eq!(config.storage.backend, StorageKind::Memory);
        assert_eq!(config.storage.key_prefix, "sdlc_");
        assert_eq!(config.validation.min_prompt_len, 25);
        assert_eq!(config.validation.min_credential_len, 20);
    }

    #[test]
    fn test_explicit_session_dir_wins() {
        let storage = StorageConfig { dir: Some(PathBuf::from("/tmp/pf")), ..Default::default() };
        assert_eq!(storage.session_dir(), Some(PathBuf::from("/tmp/pf")));
    }

    #[test]
    fn test_open_disabled_store() {
        let storage = StorageConfig { backend: StorageKind::Disabled, ..Default::default() };
        let store = storage.open();
        assert_eq!(store.backend_name(), "disabled");
        assert!(!store.is_available());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.ai.provider = "demo".to_string();
        config.validation.min_prompt_len = 40;

        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.ai.provider, "demo");
        assert_eq!(loaded.validation.min_prompt_len, 40);
        assert_eq!(loaded.storage.backend, StorageKind::File);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\nkey_prefix = \"pf_\"\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.storage.key_prefix, "pf_");
        assert_eq!(config.storage.open().key(crate::core::StoreField::ApiKey), "pf_api_key");
    }
}
