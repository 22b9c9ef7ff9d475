// Error types for configuration loading

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
