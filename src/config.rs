use crate::defaults;
use crate::error::{MedqaError, Result};
use crate::model::backend::SamplingParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub generation: GenerationConfig,
    pub prompt: PromptConfig,
    pub server: ServerConfig,
}

/// Where the base model and adapter come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Hugging Face repository of the base causal LM.
    pub base_repo: String,
    pub revision: String,
    /// Local directory with `adapter_config.json`, `adapter_model.safetensors`
    /// and the fine-tuned `tokenizer.json`.
    pub adapter_path: PathBuf,
    /// Target vocabulary size for the embedding resize. 0 keeps the base size.
    pub resize_embeddings: usize,
    pub dtype: ModelDtype,
    pub use_kv_cache: bool,
}

/// Weight precision used for inference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelDtype {
    F32,
    F16,
    Bf16,
}

/// Sampling parameters passed to the generation call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub repetition_penalty: f32,
    pub max_new_tokens: usize,
    pub seed: u64,
}

/// Prompt marker convention and decode strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    pub convention: PromptConvention,
    pub role_open: String,
    pub role_close: String,
    pub reasoning_marker: String,
    pub decode: DecodeStrategy,
    /// Literal strings removed from the decoded text under `strip_markers`.
    pub special_markers: Vec<String>,
}

/// How the question is wrapped before tokenization
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PromptConvention {
    /// `<open>question<close>`
    RoleTags,
    /// `<marker>question`
    ReasoningPrefix,
}

/// How generated token ids are turned back into answer text
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStrategy {
    /// Decode with special tokens kept, then remove the prompt and every
    /// configured marker as literal substrings.
    StripMarkers,
    /// Decode with special tokens suppressed, then drop the echoed prompt
    /// prefix.
    SkipSpecialTokens,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request generation timeout (e.g. "90s", "5m"). "0s" disables it.
    pub generation_timeout: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_repo: defaults::BASE_REPO.to_string(),
            revision: defaults::BASE_REVISION.to_string(),
            adapter_path: PathBuf::from(defaults::ADAPTER_PATH),
            resize_embeddings: defaults::RESIZE_EMBEDDINGS,
            dtype: ModelDtype::F32,
            use_kv_cache: true,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: defaults::TEMPERATURE,
            top_p: defaults::TOP_P,
            top_k: defaults::TOP_K,
            repetition_penalty: defaults::REPETITION_PENALTY,
            max_new_tokens: defaults::MAX_NEW_TOKENS,
            seed: defaults::SEED,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            convention: PromptConvention::RoleTags,
            role_open: defaults::ROLE_OPEN.to_string(),
            role_close: defaults::ROLE_CLOSE.to_string(),
            reasoning_marker: defaults::REASONING_MARKER.to_string(),
            decode: DecodeStrategy::StripMarkers,
            special_markers: defaults::SPECIAL_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            generation_timeout: "0s".to_string(),
        }
    }
}

impl GenerationConfig {
    /// Sampling parameters for one generation call.
    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repetition_penalty: self.repetition_penalty,
            max_new_tokens: self.max_new_tokens,
            seed: self.seed,
        }
    }
}

impl ServerConfig {
    /// Parsed generation timeout; `None` when disabled.
    pub fn generation_timeout(&self) -> Result<Option<Duration>> {
        let duration = humantime::parse_duration(self.generation_timeout.trim()).map_err(|e| {
            MedqaError::ConfigInvalidValue {
                key: "server.generation_timeout".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok((!duration.is_zero()).then_some(duration))
    }

    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PromptConvention {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "role_tags" => Some(Self::RoleTags),
            "reasoning_prefix" => Some(Self::ReasoningPrefix),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MedqaError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                MedqaError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(MedqaError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - MEDQA_BASE_REPO → model.base_repo
    /// - MEDQA_ADAPTER_PATH → model.adapter_path
    /// - MEDQA_HOST → server.host
    /// - MEDQA_PORT → server.port
    /// - MEDQA_PROMPT_CONVENTION → prompt.convention
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(repo) = std::env::var("MEDQA_BASE_REPO")
            && !repo.is_empty()
        {
            self.model.base_repo = repo;
        }

        if let Ok(path) = std::env::var("MEDQA_ADAPTER_PATH")
            && !path.is_empty()
        {
            self.model.adapter_path = PathBuf::from(path);
        }

        if let Ok(host) = std::env::var("MEDQA_HOST")
            && !host.is_empty()
        {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("MEDQA_PORT")
            && !port.is_empty()
        {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!("Ignoring MEDQA_PORT={port:?}: {e}"),
            }
        }

        if let Ok(convention) = std::env::var("MEDQA_PROMPT_CONVENTION")
            && !convention.is_empty()
        {
            match PromptConvention::parse(&convention) {
                Some(c) => self.prompt.convention = c,
                None => tracing::warn!("Ignoring unknown MEDQA_PROMPT_CONVENTION={convention:?}"),
            }
        }

        self
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| MedqaError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        let generation = &self.generation;
        if !(generation.temperature > 0.0) {
            return Err(invalid("generation.temperature", "must be positive"));
        }
        if !(generation.top_p > 0.0 && generation.top_p <= 1.0) {
            return Err(invalid("generation.top_p", "must be in (0, 1]"));
        }
        if generation.top_k == 0 {
            return Err(invalid("generation.top_k", "must be at least 1"));
        }
        if !(generation.repetition_penalty > 0.0) {
            return Err(invalid("generation.repetition_penalty", "must be positive"));
        }
        if generation.max_new_tokens == 0 {
            return Err(invalid("generation.max_new_tokens", "must be at least 1"));
        }

        match self.prompt.convention {
            PromptConvention::RoleTags => {
                if self.prompt.role_open.is_empty() || self.prompt.role_close.is_empty() {
                    return Err(invalid(
                        "prompt.role_open",
                        "role_tags convention needs both role_open and role_close",
                    ));
                }
            }
            PromptConvention::ReasoningPrefix => {
                if self.prompt.reasoning_marker.is_empty() {
                    return Err(invalid(
                        "prompt.reasoning_marker",
                        "reasoning_prefix convention needs a marker",
                    ));
                }
            }
        }
        if self.prompt.special_markers.iter().any(|m| m.is_empty()) {
            return Err(invalid("prompt.special_markers", "markers must be non-empty"));
        }

        if self.model.base_repo.trim().is_empty() {
            return Err(invalid("model.base_repo", "must not be empty"));
        }

        self.server.generation_timeout()?;
        Ok(())
    }

    /// Resolve a dotted key path (e.g. `generation.top_k`) to a display string.
    pub fn get_value_by_path(&self, key: &str) -> Result<String> {
        let root = toml::Value::try_from(self)
            .map_err(|e| MedqaError::Other(format!("Serialize config: {e}")))?;

        let mut current = &root;
        for part in key.split('.') {
            current = current
                .get(part)
                .ok_or_else(|| MedqaError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "unknown key".to_string(),
                })?;
        }

        Ok(match current {
            toml::Value::String(s) => s.clone(),
            toml::Value::Table(_) => toml::to_string_pretty(current)
                .map_err(|e| MedqaError::Other(format!("Serialize section: {e}")))?,
            other => other.to_string(),
        })
    }

    /// Render this configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MedqaError::Other(format!("Serialize config: {e}")))
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/medqa/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("medqa")
            .join("config.toml")
    }
}
