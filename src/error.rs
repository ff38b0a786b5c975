//! Error types for medqa.

use crate::service::availability::ModelState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MedqaError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Model loading errors
    #[error("Model path not found: {path}")]
    ModelPathNotFound { path: String },

    #[error("Model load failed: {message}")]
    ModelLoad { message: String },

    // Availability errors
    #[error("Model not loaded (state: {state})")]
    ModelUnavailable { state: ModelState },

    #[error("Invalid model state transition: {from} -> {to}")]
    InvalidTransition { from: ModelState, to: ModelState },

    // Request errors
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Generation failed: {message}")]
    Generation { message: String },

    #[error("Generation timed out after {secs}s")]
    GenerationTimeout { secs: u64 },

    // HTTP errors
    #[error("Server error: {message}")]
    Server { message: String },

    #[error("HTTP request failed: {message}")]
    Http { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl MedqaError {
    /// Build a generation error from any displayable failure.
    pub fn generation(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Generation {
            message: format!("{context}: {err}"),
        }
    }

    /// Build a load error from any displayable failure.
    pub fn model_load(context: &str, err: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            message: format!("{context}: {err}"),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, MedqaError>;
