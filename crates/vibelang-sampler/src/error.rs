//! Error types for the sampler engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SynthError>;

/// Caller misuse and control-channel failures.
///
/// None of these is raised on the render path; a rejected call leaves the
/// engine state unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    /// Preset index out of range
    #[error("Invalid preset index {index} (container has {count} presets)")]
    InvalidPresetIndex { index: usize, count: usize },

    /// Note, velocity or program outside its valid range
    #[error("Invalid value {value} for {parameter}")]
    InvalidEventParameter { parameter: &'static str, value: u32 },

    /// The render side has not drained the event queue
    #[error("Event queue is full")]
    EventQueueFull,

    /// The engine on the other end of a handle was dropped
    #[error("Engine is gone")]
    Disconnected,

    /// Rejected configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors from reading or writing the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Values that parse but make no sense
    #[error("Configuration error: {0}")]
    Invalid(String),
}

impl From<ConfigError> for SynthError {
    fn from(error: ConfigError) -> Self {
        SynthError::InvalidConfig(error.to_string())
    }
}
