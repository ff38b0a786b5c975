//! Llama-family causal LM backend running on candle.
//!
//! Resolves the base model from the Hugging Face hub, resizes its vocabulary
//! to match the fine-tuned tokenizer, merges the LoRA adapter and samples
//! with top-k → top-p → temperature plus a repetition penalty.

use crate::config::{ModelConfig, ModelDtype};
use crate::error::{MedqaError, Result};
use crate::model::adapter::{
    ADAPTER_WEIGHTS_FILENAME, AdapterConfig, TOKENIZER_FILENAME, VOCAB_TENSORS, merge_lora,
    resize_vocab_rows,
};
use crate::model::backend::{Encoding, InferenceBackend, SamplingParams};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tokenizers::Tokenizer;

/// Sharded checkpoint index on the hub.
const WEIGHTS_INDEX_FILENAME: &str = "model.safetensors.index.json";

/// Single-file checkpoint on the hub.
const WEIGHTS_FILENAME: &str = "model.safetensors";

/// Marker the fine-tuned model emits at the end of an answer.
const END_OF_TEXT: &str = "<|endoftext|>";

/// Base Llama model with a merged LoRA adapter.
pub struct LlamaBackend {
    model: Llama,
    config: Config,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    use_kv_cache: bool,
    eos_ids: Vec<u32>,
    generations: u64,
    model_name: String,
}

impl LlamaBackend {
    /// Load base weights, resize the vocabulary, merge the adapter.
    ///
    /// Downloads base model files on first call.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let adapter_dir = &config.adapter_path;
        if !adapter_dir.is_dir() {
            return Err(MedqaError::ModelPathNotFound {
                path: adapter_dir.display().to_string(),
            });
        }

        let device = select_device()?;
        tracing::info!(device = device_label(&device), "Selected compute device");
        let dtype = match config.dtype {
            ModelDtype::F32 => DType::F32,
            ModelDtype::F16 => DType::F16,
            ModelDtype::Bf16 => DType::BF16,
        };

        let api = Api::new().map_err(|e| MedqaError::model_load("HF Hub API init", e))?;
        let repo = api.repo(Repo::with_revision(
            config.base_repo.clone(),
            RepoType::Model,
            config.revision.clone(),
        ));

        // Model config, with the vocabulary widened to the fine-tuned tokenizer
        let config_path = repo
            .get("config.json")
            .map_err(|e| MedqaError::model_load("Download config.json", e))?;
        let config_bytes = std::fs::read(&config_path)
            .map_err(|e| MedqaError::model_load(&format!("Read {}", config_path.display()), e))?;
        let mut llama_config: LlamaConfig = serde_json::from_slice(&config_bytes)
            .map_err(|e| MedqaError::model_load("Parse Llama config", e))?;
        if config.resize_embeddings > 0 {
            llama_config.vocab_size = config.resize_embeddings;
        }
        let vocab_size = llama_config.vocab_size;
        let llama_config = llama_config.into_config(false);

        // Base weights
        let mut tensors: HashMap<String, Tensor> = HashMap::new();
        for path in weight_files(&repo)? {
            tracing::debug!("Loading weights from {}", path.display());
            let shard = candle_core::safetensors::load(&path, &device)
                .map_err(|e| MedqaError::model_load(&format!("Load {}", path.display()), e))?;
            for (name, tensor) in shard {
                let tensor = tensor
                    .to_dtype(dtype)
                    .map_err(|e| MedqaError::model_load(&format!("Convert {name}"), e))?;
                tensors.insert(name, tensor);
            }
        }

        if config.resize_embeddings > 0 {
            for name in VOCAB_TENSORS {
                if let Some(tensor) = tensors.get(*name) {
                    let resized = resize_vocab_rows(tensor, vocab_size)
                        .map_err(|e| MedqaError::model_load(&format!("Resize {name}"), e))?;
                    tensors.insert((*name).to_string(), resized);
                }
            }
        }

        // Adapter
        let adapter_config = AdapterConfig::load(adapter_dir)?;
        let adapter_path = adapter_dir.join(ADAPTER_WEIGHTS_FILENAME);
        let adapter = candle_core::safetensors::load(&adapter_path, &device)
            .map_err(|e| MedqaError::model_load(&format!("Load {}", adapter_path.display()), e))?;
        let stats = merge_lora(&mut tensors, adapter, &adapter_config)?;
        tracing::info!(
            merged = stats.merged,
            replaced = stats.replaced,
            skipped = stats.skipped,
            "Adapter merged"
        );

        let vb = VarBuilder::from_tensors(tensors, dtype, &device);
        let model = Llama::load(vb, &llama_config)
            .map_err(|e| MedqaError::model_load("Init Llama model", e))?;

        // Tokenizer saved with the adapter carries the added role markers
        let local_tokenizer = adapter_dir.join(TOKENIZER_FILENAME);
        let tokenizer_path = if local_tokenizer.is_file() {
            local_tokenizer
        } else {
            repo.get(TOKENIZER_FILENAME)
                .map_err(|e| MedqaError::model_load("Download tokenizer", e))?
        };
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            MedqaError::model_load(&format!("Load tokenizer {}", tokenizer_path.display()), e)
        })?;

        let mut eos_ids = match &llama_config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => Vec::new(),
        };
        if let Some(id) = tokenizer.token_to_id(END_OF_TEXT)
            && !eos_ids.contains(&id)
        {
            eos_ids.push(id);
        }

        Ok(Self {
            model,
            config: llama_config,
            tokenizer,
            device,
            dtype,
            use_kv_cache: config.use_kv_cache,
            eos_ids,
            generations: 0,
            model_name: config.base_repo.clone(),
        })
    }
}

/// First CUDA GPU when built with `cuda` and one is present, CPU otherwise.
fn select_device() -> Result<Device> {
    #[cfg(feature = "cuda")]
    {
        Device::cuda_if_available(0).map_err(|e| MedqaError::model_load("Select CUDA device", e))
    }
    #[cfg(not(feature = "cuda"))]
    {
        Ok(Device::Cpu)
    }
}

fn device_label(device: &Device) -> &'static str {
    if device.is_cuda() {
        "CUDA"
    } else if device.is_metal() {
        "Metal"
    } else {
        "CPU"
    }
}

/// Resolve the safetensors files of the base checkpoint.
fn weight_files(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    let index_path = match repo.get(WEIGHTS_INDEX_FILENAME) {
        Ok(path) => path,
        Err(_) => {
            let single = repo
                .get(WEIGHTS_FILENAME)
                .map_err(|e| MedqaError::model_load("Download model weights", e))?;
            return Ok(vec![single]);
        }
    };

    let index_bytes = std::fs::read(&index_path)
        .map_err(|e| MedqaError::model_load(&format!("Read {}", index_path.display()), e))?;
    let index: serde_json::Value = serde_json::from_slice(&index_bytes)
        .map_err(|e| MedqaError::model_load("Parse weight index", e))?;
    let weight_map = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| MedqaError::ModelLoad {
            message: "weight index has no weight_map".to_string(),
        })?;

    let shards: BTreeSet<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
    shards
        .into_iter()
        .map(|file| {
            repo.get(file)
                .map_err(|e| MedqaError::model_load(&format!("Download {file}"), e))
        })
        .collect()
}

impl InferenceBackend for LlamaBackend {
    fn encode(&mut self, prompt: &str) -> Result<Encoding> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| MedqaError::generation("Tokenize", e))?;
        Ok(Encoding {
            ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        })
    }

    fn generate(&mut self, input: &Encoding, params: &SamplingParams) -> Result<Vec<u32>> {
        let mut tokens = input.attended_ids();
        if tokens.is_empty() {
            return Err(MedqaError::Generation {
                message: "empty prompt encoding".to_string(),
            });
        }

        let mut cache = Cache::new(self.use_kv_cache, self.dtype, &self.config, &self.device)
            .map_err(|e| MedqaError::generation("Create KV cache", e))?;

        // Vary the seed per call so repeated questions are sampled independently
        let seed = params.seed.wrapping_add(self.generations);
        self.generations += 1;
        let mut logits_processor = LogitsProcessor::from_sampling(
            seed,
            Sampling::TopKThenTopP {
                k: params.top_k,
                p: params.top_p,
                temperature: params.temperature,
            },
        );

        let mut index_pos = 0;
        for index in 0..params.max_new_tokens {
            let (context_size, context_index) = if self.use_kv_cache && index > 0 {
                (1, index_pos)
            } else {
                (tokens.len(), 0)
            };
            let context = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(context, &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| MedqaError::generation("Create input tensor", e))?;

            let logits = self
                .model
                .forward(&input, context_index, &mut cache)
                .and_then(|l| l.squeeze(0))
                .map_err(|e| MedqaError::generation("Forward pass", e))?;
            let logits = if params.repetition_penalty == 1.0 {
                logits
            } else {
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    params.repetition_penalty,
                    &tokens,
                )
                .map_err(|e| MedqaError::generation("Repetition penalty", e))?
            };
            index_pos += context.len();

            let next_token = logits_processor
                .sample(&logits)
                .map_err(|e| MedqaError::generation("Sample", e))?;
            tokens.push(next_token);

            if self.eos_ids.contains(&next_token) {
                break;
            }
        }

        Ok(tokens)
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| MedqaError::generation("Detokenize", e))
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llama_backend_is_send() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<LlamaBackend>();
    }

    #[test]
    fn cpu_build_selects_cpu_device() {
        let device = select_device().unwrap();
        if cfg!(feature = "cuda") {
            // Falls back to the CPU on machines without a GPU
            assert!(device.is_cuda() || device.is_cpu());
        } else {
            assert!(device.is_cpu(), "non-CUDA build must run on the CPU");
        }
        assert_eq!(device_label(&Device::Cpu), "CPU");
    }

    #[test]
    fn load_missing_adapter_dir_fails_before_download() {
        let config = ModelConfig {
            adapter_path: PathBuf::from("/nonexistent/medqa-adapter"),
            ..Default::default()
        };
        match LlamaBackend::load(&config) {
            Err(MedqaError::ModelPathNotFound { path }) => {
                assert!(path.contains("medqa-adapter"));
            }
            Err(other) => panic!("expected ModelPathNotFound, got: {other}"),
            Ok(_) => panic!("load should fail without an adapter directory"),
        }
    }
}
