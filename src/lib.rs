//! medqa - Medical question answering over a fine-tuned language model
//!
//! Wraps a question in the model's prompt markers, generates a continuation,
//! strips markers and artifacts, repairs casing, and serves the result over
//! HTTP behind a write-once availability gate.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod answer;
#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod client;
pub mod config;
pub mod defaults;
pub mod error;
pub mod model;
pub mod server;
pub mod service;
pub mod text;

// Core pipeline
pub use answer::{AnswerPipeline, PromptTemplate, Question};
pub use model::backend::{InferenceBackend, MockBackend, SamplingParams};
pub use service::InferenceService;
pub use service::availability::{Availability, ModelState};

// Text normalization
pub use text::{TextChain, TextStage, cleanup, normalize_case};

// Error handling
pub use error::{MedqaError, Result};

// Config
pub use config::{Config, DecodeStrategy, PromptConvention};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
