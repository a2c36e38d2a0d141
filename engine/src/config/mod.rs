//! Configuration management
//!
//! This module handles loading, validation, and management of the Ferusher
//! configuration. Configuration is stored in TOML format at
//! ~/.ferusher/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **analysis**: Default request settings (model, endpoint, prompt, modes)
//! - **transport**: Direct endpoint access or an analysis relay
//! - **cache**: Persistent cache toggles and schema version
//! - **canned**: Delays of the canned analysis
//! - **server**: Bind address of the relay server
//!
//! Every section is optional; missing values take their defaults.
//!
//! # Credentials
//!
//! The credential may be set as `analysis.credential_token`, but the
//! `FERUSHER_API_KEY` environment variable takes precedence and is never
//! written back to disk.
//!
//! # Examples
//!
//! ```no_run
//! use ferusher_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Model: {}", config.analysis.model_name);
//! println!("Cache file: {:?}", config.cache_path());
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::{RequestSettings, QUESTION_PLACEHOLDER};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::CannedTiming;
use crate::db::CURRENT_SCHEMA_VERSION;

/// Environment variable overriding the configured credential
pub const API_KEY_ENV: &str = "FERUSHER_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Default request settings
    #[serde(default)]
    pub analysis: RequestSettings,

    /// Outbound transport
    #[serde(default)]
    pub transport: TransportConfig,

    /// Persistent cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Canned analysis delays
    #[serde(default)]
    pub canned: CannedConfig,

    /// Relay server
    #[serde(default)]
    pub server: ServerConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

/// How completion requests leave the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Talk to `{endpoint_base}/chat/completions` directly
    #[default]
    Direct,
    /// Post to an analysis relay
    Relay,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// Base URL of the relay (required when kind = "relay")
    #[serde(default)]
    pub relay_url: Option<String>,

    /// Timeout of one whole request in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            relay_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Persistent cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Open the cache store at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Write settled analyses back to the store
    #[serde(default = "default_true")]
    pub persist_results: bool,

    /// Schema version to open the store with
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Database file name inside the data directory
    #[serde(default = "default_cache_file")]
    pub file_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persist_results: true,
            schema_version: default_schema_version(),
            file_name: default_cache_file(),
        }
    }
}

/// Canned analysis delays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CannedConfig {
    #[serde(default = "default_word_delay_ms")]
    pub word_delay_ms: u64,

    #[serde(default = "default_full_delay_ms")]
    pub full_delay_ms: u64,
}

impl Default for CannedConfig {
    fn default() -> Self {
        Self {
            word_delay_ms: default_word_delay_ms(),
            full_delay_ms: default_full_delay_ms(),
        }
    }
}

impl CannedConfig {
    pub fn timing(&self) -> CannedTiming {
        CannedTiming {
            word_delay: Duration::from_millis(self.word_delay_ms),
            full_delay: Duration::from_millis(self.full_delay_ms),
        }
    }
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.ferusher")
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

fn default_cache_file() -> String {
    "cache.db".to_string()
}

fn default_word_delay_ms() -> u64 {
    50
}

fn default_full_delay_ms() -> u64 {
    1000
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Config {
    /// Load configuration from the default location (~/.ferusher/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse, validate and process a configuration document
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;
        config.apply_env_overrides();

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Get the default configuration file path (~/.ferusher/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".ferusher").join("config.toml"))
    }

    /// Full path of the cache database
    pub fn cache_path(&self) -> PathBuf {
        self.core.data_dir.join(&self.cache.file_name)
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates enumerated and numeric fields
    /// - Expands ~ in the data directory and creates it
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.analysis.model_name.trim().is_empty() {
            return Err(EngineError::Config("analysis.model_name must not be empty".to_string()));
        }
        if self.analysis.endpoint_base.trim().is_empty() {
            return Err(EngineError::Config(
                "analysis.endpoint_base must not be empty".to_string(),
            ));
        }
        if !self.analysis.prompt_template.contains(QUESTION_PLACEHOLDER) {
            tracing::warn!(
                "analysis.prompt_template has no {} placeholder; the question will not be sent",
                QUESTION_PLACEHOLDER
            );
        }

        if self.transport.timeout_secs == 0 {
            return Err(EngineError::Config(
                "transport.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.transport.kind == TransportKind::Relay
            && self.transport.relay_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(EngineError::Config(
                "transport.relay_url is required when transport.kind = \"relay\"".to_string(),
            ));
        }

        if self.cache.schema_version == 0 {
            return Err(EngineError::Config(
                "cache.schema_version must be at least 1".to_string(),
            ));
        }
        if self.cache.file_name.trim().is_empty() {
            return Err(EngineError::Config("cache.file_name must not be empty".to_string()));
        }

        self.server.bind.parse::<SocketAddr>().map_err(|e| {
            EngineError::Config(format!("Invalid server.bind '{}': {}", self.server.bind, e))
        })?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }

    /// Take the credential from the environment when it is set
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(API_KEY_ENV) {
            if !token.is_empty() {
                self.analysis.credential_token = Some(token);
            }
        }
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.transport.kind, TransportKind::Direct);
        assert_eq!(config.cache.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.canned.word_delay_ms, 50);
        assert_eq!(config.analysis.model_name, "gpt-5-mini");
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = expand_path(&PathBuf::from("~/test")).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_default_config_serializes_without_credential() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        assert!(!toml_string.contains("credential_token"));
        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(deserialized.analysis, config.analysis);
    }

    #[test]
    fn test_canned_timing() {
        let canned = CannedConfig {
            word_delay_ms: 0,
            full_delay_ms: 5,
        };
        assert_eq!(canned.timing().full_delay, Duration::from_millis(5));
        assert!(canned.timing().word_delay.is_zero());
    }
}
