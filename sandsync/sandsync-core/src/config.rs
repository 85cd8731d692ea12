//! Configuration for the sandbox sync engine.
//!
//! Configuration is a single TOML document with three sections:
//!
//! ```toml
//! profile = "dev"
//!
//! [general]
//! log_level = "info"
//!
//! [sync]
//! excluded_directories = ["node_modules", ".git", ".next"]
//! binary_extensions = ["png", "jpg"]
//! instrumented_extensions = ["tsx", "jsx", "ts", "js"]
//! watch_channel_capacity = 256
//! event_bus_capacity = 1024
//! preload_script_src = "/sandbox-preload-script.js"
//!
//! [mapper]
//! oid_attribute = "data-oid"
//! oid_length = 7
//! inject_preload_script = true
//! ```
//!
//! Any value may be overridden from the environment (see the `ENV_*` constants).

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Environment variable names
pub const ENV_PROFILE: &str = "SANDSYNC_PROFILE";
pub const ENV_LOG_LEVEL: &str = "SANDSYNC_LOG_LEVEL";
pub const ENV_EXCLUDED_DIRS: &str = "SANDSYNC_EXCLUDED_DIRS";
pub const ENV_WATCH_CAPACITY: &str = "SANDSYNC_WATCH_CAPACITY";
pub const ENV_PRELOAD_SCRIPT_SRC: &str = "SANDSYNC_PRELOAD_SCRIPT_SRC";

/// Directories never mirrored nor watched.
pub const DEFAULT_EXCLUDED_DIRECTORIES: &[&str] = &[
    "node_modules",
    ".git",
    ".next",
    "dist",
    "build",
    ".turbo",
    ".vercel",
];

/// Extensions whose bytes are not transferred during indexing.
pub const DEFAULT_BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "tif", "tiff", "avif", "woff",
    "woff2", "ttf", "otf", "eot",
];

/// Instrumented source extensions, in root-layout probe order.
pub const DEFAULT_INSTRUMENTED_EXTENSIONS: &[&str] = &["tsx", "jsx", "ts", "js"];

/// Path fragment identifying the editor preload script.
pub const DEFAULT_PRELOAD_SCRIPT_SRC: &str = "/sandbox-preload-script.js";

/// Configuration profile enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigProfile {
    /// Development profile: verbose logging, preload-script maintenance on watch
    #[default]
    Dev,
    /// Production profile
    Prod,
    /// Test profile for automated testing
    Test,
}

impl ConfigProfile {
    /// Get profile from environment variable or default to Dev
    pub fn from_env() -> Self {
        std::env::var(ENV_PROFILE)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Get the profile name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
            Self::Test => "test",
        }
    }

    /// Whether development-only side effects are enabled
    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

impl std::str::FromStr for ConfigProfile {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            "test" | "testing" => Ok(Self::Test),
            _ => Err(SyncError::Config(format!(
                "Invalid config profile '{}'. Must be one of: dev, prod, test",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ConfigProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

/// Mirroring and watch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Directory names skipped during enumeration and ignored by the watcher
    pub excluded_directories: Vec<String>,
    /// Extensions registered as empty binary placeholders
    pub binary_extensions: Vec<String>,
    /// Extensions eligible for identifier injection, in probe order
    pub instrumented_extensions: Vec<String>,
    /// Capacity of the queue between the change stream and the consumer
    pub watch_channel_capacity: usize,
    /// Capacity of the broadcast side of the event bus
    pub event_bus_capacity: usize,
    /// Path fragment identifying the preload script
    pub preload_script_src: String,
}

/// Identifier injection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperSection {
    /// JSX attribute carrying the identifier
    pub oid_attribute: String,
    /// Length of generated identifiers
    pub oid_length: usize,
    /// Inject the preload script element into root layouts
    pub inject_preload_script: bool,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    profile: ConfigProfile,
    general: GeneralConfig,
    sync: SyncSection,
    mapper: MapperSection,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            excluded_directories: to_strings(DEFAULT_EXCLUDED_DIRECTORIES),
            binary_extensions: to_strings(DEFAULT_BINARY_EXTENSIONS),
            instrumented_extensions: to_strings(DEFAULT_INSTRUMENTED_EXTENSIONS),
            watch_channel_capacity: 256,
            event_bus_capacity: 1024,
            preload_script_src: DEFAULT_PRELOAD_SCRIPT_SRC.to_string(),
        }
    }
}

impl Default for MapperSection {
    fn default() -> Self {
        Self {
            oid_attribute: "data-oid".to_string(),
            oid_length: 7,
            inject_preload_script: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            profile: ConfigProfile::default(),
            general: GeneralConfig::default(),
            sync: SyncSection::default(),
            mapper: MapperSection::default(),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl SyncConfig {
    /// Create a new configuration with the specified profile
    pub fn with_profile(profile: ConfigProfile) -> Self {
        let mut config = Self::default();
        config.general.log_level = match profile {
            ConfigProfile::Dev => "debug",
            ConfigProfile::Prod => "info",
            ConfigProfile::Test => "warn",
        }
        .to_string();
        config.profile = profile;
        config
    }

    /// Get the current configuration profile
    pub fn profile(&self) -> ConfigProfile {
        self.profile
    }

    /// Set the configuration profile
    pub fn set_profile(&mut self, profile: ConfigProfile) {
        self.profile = profile;
    }

    pub fn general(&self) -> &GeneralConfig {
        &self.general
    }

    pub fn general_mut(&mut self) -> &mut GeneralConfig {
        &mut self.general
    }

    pub fn sync(&self) -> &SyncSection {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncSection {
        &mut self.sync
    }

    pub fn mapper(&self) -> &MapperSection {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut MapperSection {
        &mut self.mapper
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("Failed to parse config file: {}", e)))?;

        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a specific path atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be validated, serialized or written
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SyncError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = self.export_toml()?;

        // Write to a temp file, then rename
        let temp_path = path.with_extension("toml.tmp");

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| SyncError::Config(format!("Failed to write config file: {}", e)))?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| SyncError::Config(format!("Failed to rename config file: {}", e)))?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(SyncError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.sync.watch_channel_capacity == 0 {
            return Err(SyncError::Config(
                "watch_channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.sync.event_bus_capacity == 0 {
            return Err(SyncError::Config(
                "event_bus_capacity must be greater than 0".to_string(),
            ));
        }

        if self.sync.instrumented_extensions.is_empty() {
            return Err(SyncError::Config(
                "instrumented_extensions must not be empty".to_string(),
            ));
        }

        if let Some(name) = self
            .sync
            .excluded_directories
            .iter()
            .find(|name| name.is_empty() || name.contains('/'))
        {
            return Err(SyncError::Config(format!(
                "Excluded directory '{}' must be a single non-empty path segment",
                name
            )));
        }

        if self.mapper.oid_attribute.is_empty()
            || !self
                .mapper
                .oid_attribute
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(SyncError::Config(format!(
                "Invalid identifier attribute '{}'",
                self.mapper.oid_attribute
            )));
        }

        if !(4..=32).contains(&self.mapper.oid_length) {
            return Err(SyncError::Config(
                "oid_length must be between 4 and 32".to_string(),
            ));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Merge environment variable overrides into the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_overrides(|key| std::env::var(key).ok())
    }

    /// Merge overrides from an arbitrary key lookup.
    pub fn merge_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(profile) = lookup(ENV_PROFILE) {
            debug!("Overriding profile from environment: {}", profile);
            self.profile = profile.parse()?;
        }

        if let Some(log_level) = lookup(ENV_LOG_LEVEL) {
            debug!("Overriding log_level from environment: {}", log_level);
            self.general.log_level = log_level;
        }

        if let Some(dirs) = lookup(ENV_EXCLUDED_DIRS) {
            debug!("Overriding excluded directories from environment: {}", dirs);
            self.sync.excluded_directories = dirs
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(capacity) = lookup(ENV_WATCH_CAPACITY) {
            self.sync.watch_channel_capacity = capacity.parse().map_err(|_| {
                SyncError::Config(format!(
                    "Invalid {} value '{}': expected a positive integer",
                    ENV_WATCH_CAPACITY, capacity
                ))
            })?;
        }

        if let Some(src) = lookup(ENV_PRELOAD_SCRIPT_SRC) {
            debug!("Overriding preload script src from environment: {}", src);
            self.sync.preload_script_src = src;
        }

        Ok(())
    }

    /// Export configuration to a TOML string
    pub fn export_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("Failed to export config to TOML: {}", e)))
    }

    /// Import configuration from a TOML string
    pub fn import_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| SyncError::Config(format!("Failed to import config from TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.general().log_level, "info");
        assert_eq!(config.profile(), ConfigProfile::Dev);
        assert!(config
            .sync()
            .excluded_directories
            .contains(&"node_modules".to_string()));
        assert_eq!(config.sync().instrumented_extensions[0], "tsx");
        assert_eq!(config.mapper().oid_attribute, "data-oid");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.general_mut().log_level = "loud".to_string();
        assert!(config.validate().is_err());
        config.general_mut().log_level = "info".to_string();

        config.sync_mut().watch_channel_capacity = 0;
        assert!(config.validate().is_err());
        config.sync_mut().watch_channel_capacity = 16;

        config.sync_mut().excluded_directories = vec!["a/b".to_string()];
        assert!(config.validate().is_err());
        config.sync_mut().excluded_directories = vec!["node_modules".to_string()];

        config.mapper_mut().oid_attribute = "data oid".to_string();
        assert!(config.validate().is_err());
        config.mapper_mut().oid_attribute = "data-oid".to_string();

        config.mapper_mut().oid_length = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("production".parse::<ConfigProfile>().unwrap(), ConfigProfile::Prod);
        assert_eq!("TEST".parse::<ConfigProfile>().unwrap(), ConfigProfile::Test);
        assert!("staging".parse::<ConfigProfile>().is_err());
        assert_eq!(ConfigProfile::Dev.to_string(), "dev");
    }

    #[test]
    fn test_profile_defaults() {
        let config = SyncConfig::with_profile(ConfigProfile::Test);
        assert_eq!(config.profile(), ConfigProfile::Test);
        assert_eq!(config.general().log_level, "warn");
        assert!(!config.profile().is_dev());
    }

    #[test]
    fn test_merge_overrides() {
        let overrides: HashMap<&str, &str> = HashMap::from([
            (ENV_LOG_LEVEL, "debug"),
            (ENV_EXCLUDED_DIRS, "node_modules, .cache ,"),
            (ENV_WATCH_CAPACITY, "32"),
            (ENV_PROFILE, "prod"),
        ]);

        let mut config = SyncConfig::default();
        config
            .merge_overrides(|key| overrides.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.general().log_level, "debug");
        assert_eq!(
            config.sync().excluded_directories,
            vec!["node_modules".to_string(), ".cache".to_string()]
        );
        assert_eq!(config.sync().watch_channel_capacity, 32);
        assert_eq!(config.profile(), ConfigProfile::Prod);
    }

    #[test]
    fn test_invalid_override() {
        let mut config = SyncConfig::default();
        let result = config.merge_overrides(|key| {
            (key == ENV_WATCH_CAPACITY).then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sandsync.toml");

        let mut config = SyncConfig::default();
        config.sync_mut().excluded_directories = vec!["vendor".to_string()];
        config.save_to_path(&config_path).await.unwrap();

        assert!(config_path.exists());
        assert!(!config_path.with_extension("toml.tmp").exists());

        let loaded = SyncConfig::load_from_path(&config_path).await.unwrap();
        assert_eq!(loaded.sync().excluded_directories, vec!["vendor".to_string()]);
    }

    #[test]
    fn test_import_rejects_invalid() {
        let mut config = SyncConfig::default();
        config.mapper_mut().oid_length = 64;
        // Export skips validation; import must not.
        let exported = toml::to_string_pretty(&config).unwrap();
        assert!(SyncConfig::import_toml(&exported).is_err());
    }
}
