//! Configuration file support for the sampler engine
//!
//! Configuration is stored in TOML format, by default at:
//! - Linux: `~/.config/vibe-sampler/config.toml`
//! - macOS: `~/Library/Application Support/vibe-sampler/config.toml`
//! - Windows: `%APPDATA%\vibe-sampler\config.toml`

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Largest voice pool the engine accepts.
pub const MAX_POLYPHONY: usize = 256;

/// Sample interpolation used when reading between frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Two-point linear
    #[default]
    Linear,
    /// Four-point cubic Hermite
    Cubic,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Voice pool capacity
    pub polyphony: usize,
    /// Length of the bounded control -> render event queue
    pub event_queue_capacity: usize,
    /// Linear gain applied to the mixed block
    pub master_gain: f32,
    pub interpolation: Interpolation,
    /// Frames the planar scratch buffer holds
    pub max_block_frames: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            polyphony: 64,
            event_queue_capacity: 1024,
            master_gain: 0.5,
            interpolation: Interpolation::Linear,
            max_block_frames: 1024,
        }
    }
}

impl SamplerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: SamplerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Invalid(format!(
                "Config file not found at {:?}",
                path
            )));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from the default location, or return the default
    /// if there is none or it cannot be read
    pub fn load_or_default() -> Self {
        Self::default_path()
            .and_then(Self::load)
            .unwrap_or_else(|e| {
                log::debug!("Using default sampler config: {}", e);
                Self::default()
            })
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> ConfigResult<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "vibe-sampler") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(ConfigError::Invalid(
                "Could not determine config directory".to_string(),
            ))
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be > 0".to_string()));
        }
        if !(1..=MAX_POLYPHONY).contains(&self.polyphony) {
            return Err(ConfigError::Invalid(format!(
                "polyphony must be within 1..={}, got {}",
                MAX_POLYPHONY, self.polyphony
            )));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.max_block_frames == 0 {
            return Err(ConfigError::Invalid(
                "max_block_frames must be > 0".to_string(),
            ));
        }
        if !self.master_gain.is_finite() || self.master_gain < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "master_gain must be a finite, non-negative number, got {}",
                self.master_gain
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SamplerConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.polyphony, 64);
        assert_eq!(config.interpolation, Interpolation::Linear);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SamplerConfig {
            interpolation: Interpolation::Cubic,
            polyphony: 8,
            ..SamplerConfig::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("interpolation = \"cubic\""));
        let parsed = SamplerConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = SamplerConfig::from_toml_str("polyphony = 16\n").unwrap();
        assert_eq!(config.polyphony, 16);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.event_queue_capacity, 1024);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            SamplerConfig::from_toml_str("polyphony = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SamplerConfig::from_toml_str("polyphony = 257"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SamplerConfig::from_toml_str("sample_rate = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SamplerConfig::from_toml_str("interpolation = \"sinc\""),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let config = SamplerConfig {
            master_gain: 0.25,
            ..SamplerConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SamplerConfig::load(&path).unwrap(), config);
        assert!(SamplerConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
