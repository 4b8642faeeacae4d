//! Configuration management for Hashpilot
//!
//! Handles loading, saving, and managing application configuration
//! including the model gateway, orchestrator limits and API keys. Sections
//! owned by other crates (for example `[ledger]`) are kept verbatim and read
//! on demand with [`ConfigManager::section`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default model for the direct gateway
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Round driver settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// General application settings
    #[serde(default)]
    pub general: GeneralConfig,
}

/// How model calls leave the process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// Straight to an OpenAI-compatible `/chat/completions` endpoint
    #[default]
    Direct,
    /// Through a backend function that holds the provider key
    Proxy,
}

/// Model gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub kind: GatewayKind,
    /// Model to use
    pub model: String,
    /// API key (can be loaded from env)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable name for API key
    pub api_key_env: String,
    /// Base URL for the API (optional, for self-hosted or compatible providers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Backend function URL for the proxy gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Extra headers sent to the proxy (project ids, session tokens)
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub proxy_headers: HashMap<String, String>,
    /// Per-attempt timeout
    pub timeout_secs: u64,
    /// Additional attempts for retryable failures
    pub retries: u32,
    /// Base delay of the exponential backoff
    pub retry_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::Direct,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            proxy_url: None,
            proxy_headers: HashMap::new(),
            timeout_secs: 60,
            retries: 2,
            retry_delay_ms: 500,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl GatewayConfig {
    /// Get the API key, checking the environment variable if not set directly
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }

        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

/// Round driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Model calls allowed per user turn
    pub max_rounds: usize,
    /// Instruction message placed at the head of new conversations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            system_prompt: None,
        }
    }
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

/// Configuration manager for loading and saving config
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
    raw: toml::Table,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a config manager with a specific path
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let raw = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            toml::Table::new()
        };
        let config = toml::Value::Table(raw.clone())
            .try_into()
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(Self {
            config_path,
            config,
            raw,
        })
    }

    /// Get the default config path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("hashpilot").join("config.toml"))
    }

    /// Load the raw TOML table from a file
    fn load_from_path(path: &Path) -> Result<toml::Table> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Deserialize a section owned by another crate, defaulting when absent
    pub fn section<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        match self.raw.get(name) {
            Some(value) => value
                .clone()
                .try_into()
                .map_err(|e| Error::Config(format!("Invalid [{}] section: {}", name, e))),
            None => Ok(T::default()),
        }
    }

    /// Replace a foreign section; written out on the next [`save`](Self::save)
    pub fn set_section<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let value = toml::Value::try_from(value)
            .map_err(|e| Error::Config(format!("Failed to serialize [{}]: {}", name, e)))?;
        self.raw.insert(name.to_string(), value);
        Ok(())
    }

    /// Save the current configuration to disk, keeping foreign sections
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let mut table = self.raw.clone();
        match toml::Value::try_from(&self.config) {
            Ok(toml::Value::Table(own)) => table.extend(own),
            Ok(_) => return Err(Error::Config("Config did not serialize to a table".to_string())),
            Err(e) => return Err(Error::Config(format!("Failed to serialize config: {}", e))),
        }

        let content = toml::to_string_pretty(&table)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            config_path: PathBuf::from("config.toml"),
            config: Config::default(),
            raw: toml::Table::new(),
        })
    }
}
