//! JSON Configuration Management
//!
//! Handles reading and writing the run configuration file and layering
//! environment overrides on top of it.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::utils::error::{AppError, AppResult};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "REPORT_NARRATOR_CONFIG";

/// Config file used when `REPORT_NARRATOR_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "report-narrator.json";

/// Configuration service for managing run settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigService {
    /// Load the config at `path`, or start from defaults when it does not exist.
    ///
    /// Environment overrides are applied after loading, then the result is
    /// validated.
    pub fn load(path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = path.into();
        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            tracing::info!(path = %config_path.display(), "Config file not found, using defaults");
            AppConfig::default()
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        config.validate().map_err(AppError::validation)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load using `REPORT_NARRATOR_CONFIG`, falling back to the default file name
    pub fn from_env() -> AppResult<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load(path)
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<AppConfig> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &AppConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Get a clone of the current configuration
    pub fn get_config_clone(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Update the configuration with a partial update
    pub fn update_config(&mut self, update: SettingsUpdate) -> AppResult<AppConfig> {
        self.config.apply_update(update);
        self.save()?;
        Ok(self.config.clone())
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &self.config)
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Layer environment variables over a loaded config.
///
/// `lookup` resolves a variable name; non-empty values win over the file.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(key) = get("GEMINI_API_KEY") {
        config.gemini_api_key = Some(key);
    }
    if let Some(key) = get("ANTHROPIC_API_KEY") {
        config.anthropic_api_key = Some(key);
    }
    if let Some(key) = get("OPENAI_API_KEY") {
        config.openai_api_key = Some(key);
    }
    if let Some(value) = get("REPORT_NARRATOR_DRY_RUN") {
        config.dry_run = truthy(&value);
    }
    if let Some(value) = get("REPORT_NARRATOR_PAID_TIER") {
        config.paid_tier = truthy(&value);
    }
    if let Some(value) = get("REPORT_NARRATOR_FORCE_PROVIDER") {
        match value.parse() {
            Ok(provider) => config.force_provider = Some(provider),
            Err(err) => tracing::warn!(value = %value, error = %err, "Ignoring REPORT_NARRATOR_FORCE_PROVIDER"),
        }
    }
}
