//! Configuration management for CrabIntrinsics
//!
//! Acquisition timing and concurrency policy, loaded once from TOML and
//! fixed for the lifetime of an acquirer.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// What to do when a second acquisition arrives while one is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// Queue behind the running acquisition
    #[default]
    Serialize,
    /// Fail immediately with `AlreadyInProgress`
    Reject,
}

/// Polling protocol constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Wait after session start before the first poll, in milliseconds
    pub warm_up_ms: u64,
    /// Wait between unsuccessful polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Number of polls before giving up
    pub max_attempts: u32,
    /// Reuse the first successful calibration for the rest of the process
    pub cache_results: bool,
    pub concurrency: ConcurrencyPolicy,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            warm_up_ms: 500,
            poll_interval_ms: 100,
            max_attempts: 20,
            cache_results: true,
            concurrency: ConcurrencyPolicy::Serialize,
        }
    }
}

const MAX_DELAY_MS: u64 = 10_000;
const MAX_ATTEMPTS_LIMIT: u32 = 1_000;

impl AcquisitionConfig {
    pub fn warm_up(&self) -> Duration {
        Duration::from_millis(self.warm_up_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on time spent between session start and the last poll
    pub fn worst_case_duration(&self) -> Duration {
        self.warm_up() + self.poll_interval() * self.max_attempts.saturating_sub(1)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(format!(
                "max_attempts must be between 1 and {}",
                MAX_ATTEMPTS_LIMIT
            ));
        }
        if self.warm_up_ms > MAX_DELAY_MS {
            return Err(format!("warm_up_ms must be at most {}", MAX_DELAY_MS));
        }
        if self.poll_interval_ms > MAX_DELAY_MS {
            return Err(format!("poll_interval_ms must be at most {}", MAX_DELAY_MS));
        }
        Ok(())
    }

    /// Pull every field into its valid range.
    pub fn clamped(mut self) -> Self {
        if let Err(e) = self.validate() {
            log::warn!("Clamping acquisition config: {}", e);
        }
        self.max_attempts = self.max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT);
        self.warm_up_ms = self.warm_up_ms.min(MAX_DELAY_MS);
        self.poll_interval_ms = self.poll_interval_ms.min(MAX_DELAY_MS);
        self
    }
}

impl IntrinsicsConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: IntrinsicsConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate().map_err(ConfigError::ValidationError)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string =
            toml::to_string_pretty(self).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        fs::write(path, toml_string).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabintrinsics.toml")
    }

    /// Load from default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        self.acquisition.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IntrinsicsConfig::default();
        assert_eq!(config.acquisition.warm_up_ms, 500);
        assert_eq!(config.acquisition.poll_interval_ms, 100);
        assert_eq!(config.acquisition.max_attempts, 20);
        assert!(config.acquisition.cache_results);
        assert_eq!(config.acquisition.concurrency, ConcurrencyPolicy::Serialize);
    }

    #[test]
    fn test_worst_case_duration() {
        let config = AcquisitionConfig::default();
        assert_eq!(config.worst_case_duration(), Duration::from_millis(2_400));
    }

    #[test]
    fn test_config_validation() {
        let config = IntrinsicsConfig::default();
        assert!(config.validate().is_ok());

        let mut no_attempts = config.clone();
        no_attempts.acquisition.max_attempts = 0;
        assert!(no_attempts.validate().is_err());

        let mut slow = config.clone();
        slow.acquisition.poll_interval_ms = 60_000;
        assert!(slow.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("crabintrinsics.toml");

        let mut config = IntrinsicsConfig::default();
        config.acquisition.max_attempts = 7;
        config.acquisition.concurrency = ConcurrencyPolicy::Reject;
        assert!(config.save_to_file(&config_path).is_ok());

        let loaded = IntrinsicsConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: IntrinsicsConfig = toml::from_str("[acquisition]\nmax_attempts = 5\n").unwrap();
        assert_eq!(config.acquisition.max_attempts, 5);
        assert_eq!(config.acquisition.warm_up_ms, 500);
        assert_eq!(config.acquisition.concurrency, ConcurrencyPolicy::Serialize);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bad.toml");
        fs::write(&config_path, "[acquisition]\nmax_attempts = 0\n").unwrap();

        let result = IntrinsicsConfig::load_from_file(&config_path);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_clamped_config_is_valid() {
        let config = AcquisitionConfig {
            max_attempts: 0,
            warm_up_ms: 60_000,
            ..AcquisitionConfig::default()
        }
        .clamped();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.warm_up_ms, 10_000);
        assert_eq!(config.poll_interval_ms, 100);

        let huge = AcquisitionConfig {
            max_attempts: u32::MAX,
            ..AcquisitionConfig::default()
        };
        assert_eq!(huge.clamped().max_attempts, 1_000);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = IntrinsicsConfig::load_from_file("nonexistent_file.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().acquisition.max_attempts, 20);
    }
}
