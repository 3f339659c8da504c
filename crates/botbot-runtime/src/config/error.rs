//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the runner configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The merged sources could not be extracted into the schema.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A value is present but not acceptable.
    #[error("Invalid configuration: {message}")]
    ValidationError { message: String },

    /// A required value is empty.
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Two chatbots share an id.
    #[error("Duplicate chatbot id: {0}")]
    DuplicateChatBotId(i64),

    /// Two channels share an id.
    #[error("Duplicate channel id: {0}")]
    DuplicateChannelId(i64),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
