//! Tokenizer + causal language model collaborators.

pub mod adapter;
pub mod backend;
#[cfg(feature = "candle")]
pub mod llama;

use crate::config::ModelConfig;
use crate::error::Result;
use backend::InferenceBackend;

/// Load the backend compiled into this build.
#[cfg(feature = "candle")]
pub fn load_backend(config: &ModelConfig) -> Result<Box<dyn InferenceBackend>> {
    Ok(Box::new(llama::LlamaBackend::load(config)?))
}

/// Load the backend compiled into this build.
#[cfg(not(feature = "candle"))]
pub fn load_backend(_config: &ModelConfig) -> Result<Box<dyn InferenceBackend>> {
    Err(crate::error::MedqaError::ModelLoad {
        message: "built without the `candle` feature; no model backend available".to_string(),
    })
}
