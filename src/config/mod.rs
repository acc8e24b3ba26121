use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::content::{DEFAULT_TEXT_ENDPOINT, DEFAULT_TEXT_MODEL};
use crate::error::ConfigError;
use crate::music::service::{DEFAULT_LOCATION, DEFAULT_MUSIC_MODEL};
use crate::retry::RetryPolicy;
use crate::store::DEFAULT_COLLECTION;

pub const APP_DIR: &str = "music-focus-study";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Longest silence track the music fallback will synthesize
pub const MAX_SILENCE_SECS: u64 = 600;

/// Study configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StudyConfig {
    pub text_generation: TextGenerationConfig,
    pub music_generation: MusicGenerationConfig,
    pub credentials: CredentialsConfig,
    pub store: StoreConfig,
    pub output: OutputConfig,
}

/// Lesson generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextGenerationConfig {
    pub endpoint: String,
    pub model: String,
    /// Takes precedence over `api_key_env`
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for TextGenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TEXT_ENDPOINT.to_string(),
            model: DEFAULT_TEXT_MODEL.to_string(),
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            max_retries: 7,
            retry_delay_secs: 5,
            request_timeout_secs: 60,
        }
    }
}

impl TextGenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// API key from the file, or else from the configured environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty())
            })
    }
}

/// Background music settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicGenerationConfig {
    pub enabled: bool,
    /// Falls back to the service account's project
    pub project_id: Option<String>,
    pub location: String,
    pub model: String,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub retry_timeouts: bool,
    pub request_timeout_secs: u64,
    pub silence_secs: u64,
}

impl Default for MusicGenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_id: None,
            location: DEFAULT_LOCATION.to_string(),
            model: DEFAULT_MUSIC_MODEL.to_string(),
            max_retries: 3,
            retry_delay_secs: 3,
            retry_timeouts: true,
            request_timeout_secs: 120,
            silence_secs: 30,
        }
    }
}

impl MusicGenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_delay_secs))
            .with_timeout_retries(self.retry_timeouts)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Capped at [`MAX_SILENCE_SECS`]
    pub fn silence_duration(&self) -> Duration {
        if self.silence_secs > MAX_SILENCE_SECS {
            log::warn!(
                "music_generation.silence_secs = {} is too long, using {}",
                self.silence_secs,
                MAX_SILENCE_SECS
            );
        }
        Duration::from_secs(self.silence_secs.min(MAX_SILENCE_SECS))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Downloaded service-account JSON key
    pub service_account_path: Option<PathBuf>,
}

/// Result submission settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub enabled: bool,
    pub project_id: Option<String>,
    pub collection: String,
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_id: None,
            collection: DEFAULT_COLLECTION.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where generated section tracks are written
    pub directory: PathBuf,
    pub play_music: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("tracks"),
            play_music: true,
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: StudyConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_path(Self::default_config_path()?)
    }

    /// Load from an explicit file; a missing file gives defaults
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = match Self::load_config(&config_path) {
            Ok(config) => config,
            Err(ConfigError::DeserializationError(e)) => {
                warn!("Ignoring unreadable config {}: {}", config_path.display(), e);
                StudyConfig::default()
            }
            Err(e) => return Err(e),
        };

        Ok(Self { config, config_path })
    }

    pub fn get_config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut StudyConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = StudyConfig::default();
        self.save_config()
    }

    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join(APP_DIR);

        Ok(config_dir.join("config.toml"))
    }

    pub fn load_config(path: &Path) -> Result<StudyConfig, ConfigError> {
        if !path.exists() {
            return Ok(StudyConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: StudyConfig = toml::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;
        Ok(())
    }

    /// Render the active configuration with secrets masked
    pub fn describe(&self) -> String {
        let mut shown = self.config.clone();
        if shown.text_generation.api_key.is_some() {
            shown.text_generation.api_key = Some("********".to_string());
        }
        toml::to_string_pretty(&shown).unwrap_or_else(|e| format!("<unprintable configuration: {}>", e))
    }
}
