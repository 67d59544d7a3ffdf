//! Engine configuration
//!
//! Loaded from `config.toml` in the platform config directory. Every field
//! has a default, so a missing or partial file is never an error.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;
use crate::metronome::MetronomeSettings;

/// Environment variable overriding the storage API base URL
pub const API_URL_ENV: &str = "MULTITAKE_API_URL";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub transport: TransportConfig,
    pub storage: StorageConfig,
    pub metronome: MetronomeConfig,
}

/// Host audio settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Output device name; the host default when unset
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            output_device: None,
        }
    }
}

/// Transport timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Delay between `play()` returning and the synchronized start
    pub lookahead_ms: u64,
    /// Pause before a seek re-plays the track set
    pub seek_restart_delay_ms: u64,
    /// Elapsed-time publishing period
    pub report_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: DEFAULT_LOOKAHEAD_MS,
            seek_restart_delay_ms: DEFAULT_SEEK_RESTART_DELAY_MS,
            report_interval_ms: DEFAULT_REPORT_INTERVAL_MS,
        }
    }
}

impl TransportConfig {
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn seek_restart_delay(&self) -> Duration {
        Duration::from_millis(self.seek_restart_delay_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms.max(1))
    }
}

/// Where takes are fetched from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub api_url: String,
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl StorageConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Metronome defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub poll_interval_ms: u64,
    pub master_gain: f32,
    pub settings: MetronomeSettings,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_METRONOME_POLL_MS,
            master_gain: DEFAULT_METRONOME_GAIN,
            settings: MetronomeSettings::default(),
        }
    }
}

impl MetronomeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl EngineConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("org", "multitake", "multitake")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Parse from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(config.with_env_overrides())
    }

    /// Load from the default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        let loaded = Self::default_path().and_then(|path| Self::load(&path));
        match loaded {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default().with_env_overrides()
            }
        }
    }

    /// Write as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.storage.api_url = url;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("audio.sample_rate must be > 0".into()));
        }
        if self.audio.channels == 0 {
            return Err(ConfigError::Invalid("audio.channels must be > 0".into()));
        }
        if self.metronome.settings.bpm == 0 {
            return Err(ConfigError::Invalid("metronome.settings.bpm must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [transport]
            lookahead_ms = 50

            [metronome.settings]
            bpm = 90
            "#,
        )
        .unwrap();

        assert_eq!(config.transport.lookahead_ms, 50);
        assert_eq!(config.transport.seek_restart_delay_ms, DEFAULT_SEEK_RESTART_DELAY_MS);
        assert_eq!(config.metronome.settings.bpm, 90);
        assert_eq!(config.metronome.settings.count_in, 2);
        assert_eq!(config.audio.sample_rate, 48_000);
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        let result = EngineConfig::from_toml("[audio]\nsample_rate = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("multitake-config-{}", std::process::id()));
        let path = dir.join("config.toml");

        let mut config = EngineConfig::default();
        config.storage.api_url = "https://example.test/api".into();
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        if std::env::var(API_URL_ENV).is_err() {
            assert_eq!(loaded, config);
        }

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("multitake-definitely-missing/config.toml");
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.transport, TransportConfig::default());
    }
}
