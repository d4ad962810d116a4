//! Configuration for the model, cache, retry policy, and logging.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Env var key for the Together AI API key.
pub const ENV_TOGETHER_API_KEY: &str = "TOGETHER_API_KEY";
/// Env var that overrides the default model.
pub const ENV_AI_MODEL: &str = "AI_MODEL";
/// Model used when neither the config nor `AI_MODEL` name one.
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-4-Maverick-17B-128E-Instruct-FP8";
/// Together AI chat completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.together.xyz/v1/chat/completions";

/// Placeholder keys shipped in sample env files.
const PLACEHOLDER_KEYS: [&str; 2] = ["your_api_key_here", "your_together_ai_api_key_here"];
/// Shortest key we accept as plausibly real.
const MIN_API_KEY_LEN: usize = 20;

/// Complete docquery configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocqueryConfig {
    /// Model and sampling settings
    pub model: ModelConfig,
    /// Analysis cache settings
    pub cache: CacheConfig,
    /// Rate-limit retry settings
    pub retry: RetryConfig,
    /// Log file locations
    pub logging: LoggingConfig,
    /// API keys for completion services
    pub api_keys: ApiKeys,
}

/// API keys for completion services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiKeys {
    /// Together AI API key
    pub together_api_key: Option<String>,
}

/// Model and sampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier
    pub model: String,
    /// Maximum tokens per answer
    pub max_tokens: u32,
    /// Sampling temperature (0.0-1.0)
    pub temperature: f32,
    /// Chat completions endpoint
    pub endpoint: String,
    /// Timeout in seconds for a single HTTP request
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: env::var(ENV_AI_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_owned()),
            max_tokens: 500,
            temperature: 0.7,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            timeout_seconds: 120,
        }
    }
}

/// Analysis cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached answers
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: 50 }
    }
}

/// Retry configuration for rate-limited requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Seconds to wait per retry number (retry `n` waits `n` units)
    pub backoff_unit_seconds: u64,
}

impl RetryConfig {
    /// The backoff unit as a `Duration`.
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_secs(self.backoff_unit_seconds)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit_seconds: 60,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for `app.log` and the interaction logs
    pub log_dir: PathBuf,
    /// Whether interactions are appended to the interaction logs
    pub interaction_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            interaction_log: true,
        }
    }
}

impl DocqueryConfig {
    /// Get the default config directory path (`~/.docquery`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        use dirs::home_dir;
        let home = home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".docquery"))
    }

    /// Get the default config file path (`~/.docquery/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it with defaults if missing
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load and validate config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or fails validation
    pub fn load_from_file(path: &Path) -> Result<Self> {
        use toml::from_str;
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        use toml::to_string_pretty;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# docquery configuration file\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first out-of-range field.
    pub fn validate(&self) -> Result<()> {
        if self.model.max_tokens == 0 {
            return Err(Error::Config("model.max_tokens must be positive".to_owned()));
        }
        if !(0.0..=1.0).contains(&self.model.temperature) {
            return Err(Error::Config(format!(
                "model.temperature must be within [0, 1], got {}",
                self.model.temperature
            )));
        }
        if self.cache.max_size == 0 {
            return Err(Error::Config("cache.max_size must be positive".to_owned()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be positive".to_owned()));
        }
        Ok(())
    }

    /// Get the Together API key, checking config first, then the environment
    pub fn get_api_key(&self) -> Option<String> {
        self.api_keys
            .together_api_key
            .clone()
            .or_else(|| env::var(ENV_TOGETHER_API_KEY).ok())
    }
}

/// Rough sanity check that `api_key` looks like a real credential.
pub fn validate_api_key(api_key: &str) -> bool {
    !api_key.is_empty()
        && api_key.len() >= MIN_API_KEY_LEN
        && !PLACEHOLDER_KEYS.contains(&api_key)
}
