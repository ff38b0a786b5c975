//! PEFT LoRA adapter support.
//!
//! The adapter is merged into the base weight map before the model is
//! built, so inference runs on plain dense weights:
//! `W' = W + (B · A) · scaling`.
//!
//! Tensors saved through `modules_to_save` (typically the resized
//! `embed_tokens` and `lm_head`) replace the base tensors outright.

use crate::error::{MedqaError, Result};
use serde::Deserialize;
use std::path::Path;

/// Adapter hyper-parameters file inside the adapter directory.
pub const ADAPTER_CONFIG_FILENAME: &str = "adapter_config.json";

/// Adapter weights file inside the adapter directory.
pub const ADAPTER_WEIGHTS_FILENAME: &str = "adapter_model.safetensors";

/// Tokenizer saved alongside the adapter.
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// Base-model tensors whose first dimension is the vocabulary.
pub const VOCAB_TENSORS: &[&str] = &["model.embed_tokens.weight", "lm_head.weight"];

/// Subset of `adapter_config.json` needed for merging.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdapterConfig {
    pub r: usize,
    pub lora_alpha: f64,
    #[serde(default)]
    pub use_rslora: bool,
    #[serde(default)]
    pub fan_in_fan_out: bool,
    #[serde(default)]
    pub base_model_name_or_path: Option<String>,
}

impl AdapterConfig {
    /// Read `adapter_config.json` from an adapter directory.
    pub fn load(adapter_dir: &Path) -> Result<Self> {
        let path = adapter_dir.join(ADAPTER_CONFIG_FILENAME);
        let bytes = std::fs::read(&path)
            .map_err(|e| MedqaError::model_load(&format!("Read {}", path.display()), e))?;
        Self::from_json(&bytes)
    }

    fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes)
            .map_err(|e| MedqaError::model_load("Parse adapter config", e))?;
        if config.r == 0 {
            return Err(MedqaError::ModelLoad {
                message: "adapter rank r must be positive".to_string(),
            });
        }
        Ok(config)
    }

    /// Multiplier applied to `B · A`.
    pub fn scaling(&self) -> f64 {
        if self.use_rslora {
            self.lora_alpha / (self.r as f64).sqrt()
        } else {
            self.lora_alpha / self.r as f64
        }
    }
}

/// What an adapter tensor contributes to the base weight map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterTensor {
    /// Down projection for the named base weight.
    LoraA(String),
    /// Up projection for the named base weight.
    LoraB(String),
    /// Full replacement of the named base tensor.
    Replace(String),
}

/// Map a PEFT tensor name onto the base weight it targets.
///
/// Returns `None` for tensors that carry nothing to merge (frozen copies of
/// the original module, embedding-LoRA factors).
pub fn classify_key(key: &str) -> Option<AdapterTensor> {
    let key = key.strip_prefix("base_model.model.").unwrap_or(key);
    if key.contains(".original_module.") || key.contains("lora_embedding_") {
        return None;
    }
    let key = key
        .replace(".modules_to_save.default.", ".")
        .replace(".default.", ".");

    if let Some(prefix) = key.strip_suffix(".lora_A.weight") {
        return Some(AdapterTensor::LoraA(format!("{prefix}.weight")));
    }
    if let Some(prefix) = key.strip_suffix(".lora_B.weight") {
        return Some(AdapterTensor::LoraB(format!("{prefix}.weight")));
    }
    if key.ends_with(".weight") || key.ends_with(".bias") {
        return Some(AdapterTensor::Replace(key));
    }
    None
}

#[cfg(feature = "candle")]
pub use merge::{MergeStats, merge_lora, resize_vocab_rows};

#[cfg(feature = "candle")]
mod merge {
    use super::{AdapterConfig, AdapterTensor, classify_key};
    use crate::error::{MedqaError, Result};
    use candle_core::{DType, Tensor};
    use std::collections::HashMap;

    /// Counts reported after a merge.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct MergeStats {
        pub merged: usize,
        pub replaced: usize,
        pub skipped: usize,
    }

    /// Fold every LoRA pair into `base` and apply full replacements.
    pub fn merge_lora(
        base: &mut HashMap<String, Tensor>,
        adapter: HashMap<String, Tensor>,
        config: &AdapterConfig,
    ) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        let mut pairs: HashMap<String, (Option<Tensor>, Option<Tensor>)> = HashMap::new();

        for (key, tensor) in adapter {
            match classify_key(&key) {
                Some(AdapterTensor::LoraA(target)) => pairs.entry(target).or_default().0 = Some(tensor),
                Some(AdapterTensor::LoraB(target)) => pairs.entry(target).or_default().1 = Some(tensor),
                Some(AdapterTensor::Replace(target)) => {
                    let dtype = base.get(&target).map(|t| t.dtype()).unwrap_or(tensor.dtype());
                    let tensor = tensor
                        .to_dtype(dtype)
                        .map_err(|e| MedqaError::model_load(&format!("Convert {target}"), e))?;
                    base.insert(target, tensor);
                    stats.replaced += 1;
                }
                None => {
                    tracing::debug!("Skipping adapter tensor {key}");
                    stats.skipped += 1;
                }
            }
        }

        let scaling = config.scaling();
        for (target, pair) in pairs {
            let (Some(a), Some(b)) = pair else {
                return Err(MedqaError::ModelLoad {
                    message: format!("Incomplete LoRA pair for {target}"),
                });
            };
            let weight = base.get(&target).ok_or_else(|| MedqaError::ModelLoad {
                message: format!("Adapter targets unknown base weight {target}"),
            })?;
            let merged = merged_weight(weight, &a, &b, scaling, config.fan_in_fan_out)
                .map_err(|e| MedqaError::model_load(&format!("Merge {target}"), e))?;
            base.insert(target, merged);
            stats.merged += 1;
        }

        Ok(stats)
    }

    fn merged_weight(
        weight: &Tensor,
        a: &Tensor,
        b: &Tensor,
        scaling: f64,
        fan_in_fan_out: bool,
    ) -> candle_core::Result<Tensor> {
        let a = a.to_dtype(DType::F32)?;
        let b = b.to_dtype(DType::F32)?;
        let mut delta = b.matmul(&a)?.affine(scaling, 0.0)?;
        if fan_in_fan_out {
            delta = delta.t()?;
        }
        let merged = (weight.to_dtype(DType::F32)? + delta)?;
        merged.to_dtype(weight.dtype())
    }

    /// Resize the vocabulary dimension of `tensor` to `rows`.
    ///
    /// Extra rows are initialised to the mean of the existing rows; surplus
    /// rows are cut.
    pub fn resize_vocab_rows(tensor: &Tensor, rows: usize) -> candle_core::Result<Tensor> {
        let (current, cols) = tensor.dims2()?;
        if rows == current {
            return Ok(tensor.clone());
        }
        if rows < current {
            return tensor.narrow(0, 0, rows);
        }
        let mean = tensor.to_dtype(DType::F32)?.mean_keepdim(0)?;
        let padding = mean
            .broadcast_as((rows - current, cols))?
            .to_dtype(tensor.dtype())?
            .contiguous()?;
        Tensor::cat(&[tensor, &padding], 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_lora_factors_target_base_weight() {
        assert_eq!(
            classify_key("base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight"),
            Some(AdapterTensor::LoraA(
                "model.layers.0.self_attn.q_proj.weight".to_string()
            ))
        );
        assert_eq!(
            classify_key("base_model.model.model.layers.3.mlp.down_proj.lora_B.default.weight"),
            Some(AdapterTensor::LoraB(
                "model.layers.3.mlp.down_proj.weight".to_string()
            ))
        );
    }

    #[test]
    fn classify_modules_to_save_replaces_base_tensor() {
        assert_eq!(
            classify_key("base_model.model.model.embed_tokens.modules_to_save.default.weight"),
            Some(AdapterTensor::Replace("model.embed_tokens.weight".to_string()))
        );
        assert_eq!(
            classify_key("base_model.model.lm_head.weight"),
            Some(AdapterTensor::Replace("lm_head.weight".to_string()))
        );
    }

    #[test]
    fn classify_skips_original_module_copies() {
        assert_eq!(
            classify_key("base_model.model.lm_head.original_module.weight"),
            None
        );
        assert_eq!(
            classify_key("base_model.model.model.embed_tokens.lora_embedding_A"),
            None
        );
    }

    #[test]
    fn adapter_config_scaling() {
        let config = AdapterConfig::from_json(br#"{"r": 16, "lora_alpha": 32}"#).unwrap();
        assert_eq!(config.scaling(), 2.0);
        assert!(!config.fan_in_fan_out);

        let rs = AdapterConfig::from_json(br#"{"r": 16, "lora_alpha": 32, "use_rslora": true}"#)
            .unwrap();
        assert_eq!(rs.scaling(), 8.0);
    }

    #[test]
    fn adapter_config_rejects_zero_rank() {
        assert!(AdapterConfig::from_json(br#"{"r": 0, "lora_alpha": 8}"#).is_err());
    }

    #[test]
    fn adapter_config_load_missing_dir_is_load_error() {
        let err = AdapterConfig::load(Path::new("/nonexistent/adapter")).unwrap_err();
        assert!(matches!(err, MedqaError::ModelLoad { .. }));
    }

    #[cfg(feature = "candle")]
    mod candle_merge {
        use super::super::*;
        use candle_core::{Device, Tensor};
        use std::collections::HashMap;

        fn config(r: usize, alpha: f64) -> AdapterConfig {
            AdapterConfig {
                r,
                lora_alpha: alpha,
                use_rslora: false,
                fan_in_fan_out: false,
                base_model_name_or_path: None,
            }
        }

        #[test]
        fn merge_adds_scaled_low_rank_delta() {
            let device = Device::Cpu;
            let mut base = HashMap::new();
            base.insert(
                "model.layers.0.self_attn.q_proj.weight".to_string(),
                Tensor::zeros((2, 3), candle_core::DType::F32, &device).unwrap(),
            );

            // B (2x1) · A (1x3) = [[1,2,3],[2,4,6]]
            let a = Tensor::new(&[[1f32, 2., 3.]], &device).unwrap();
            let b = Tensor::new(&[[1f32], [2.]], &device).unwrap();
            let mut adapter = HashMap::new();
            adapter.insert(
                "base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight".to_string(),
                a,
            );
            adapter.insert(
                "base_model.model.model.layers.0.self_attn.q_proj.lora_B.weight".to_string(),
                b,
            );

            let stats = merge_lora(&mut base, adapter, &config(1, 2.0)).unwrap();
            assert_eq!(stats.merged, 1);

            let merged: Vec<Vec<f32>> = base["model.layers.0.self_attn.q_proj.weight"]
                .to_vec2()
                .unwrap();
            assert_eq!(merged, vec![vec![2., 4., 6.], vec![4., 8., 12.]]);
        }

        #[test]
        fn merge_rejects_unknown_target() {
            let device = Device::Cpu;
            let mut base = HashMap::new();
            let mut adapter = HashMap::new();
            adapter.insert(
                "base_model.model.model.layers.9.mlp.up_proj.lora_A.weight".to_string(),
                Tensor::zeros((1, 2), candle_core::DType::F32, &device).unwrap(),
            );
            adapter.insert(
                "base_model.model.model.layers.9.mlp.up_proj.lora_B.weight".to_string(),
                Tensor::zeros((2, 1), candle_core::DType::F32, &device).unwrap(),
            );
            assert!(merge_lora(&mut base, adapter, &config(1, 1.0)).is_err());
        }

        #[test]
        fn merge_rejects_half_pair() {
            let device = Device::Cpu;
            let mut base = HashMap::new();
            base.insert(
                "model.layers.0.mlp.up_proj.weight".to_string(),
                Tensor::zeros((2, 2), candle_core::DType::F32, &device).unwrap(),
            );
            let mut adapter = HashMap::new();
            adapter.insert(
                "base_model.model.model.layers.0.mlp.up_proj.lora_A.weight".to_string(),
                Tensor::zeros((1, 2), candle_core::DType::F32, &device).unwrap(),
            );
            assert!(merge_lora(&mut base, adapter, &config(1, 1.0)).is_err());
        }

        #[test]
        fn resize_pads_with_mean_row() {
            let device = Device::Cpu;
            let t = Tensor::new(&[[1f32, 2.], [3., 4.]], &device).unwrap();
            let resized = resize_vocab_rows(&t, 3).unwrap();
            let rows: Vec<Vec<f32>> = resized.to_vec2().unwrap();
            assert_eq!(rows, vec![vec![1., 2.], vec![3., 4.], vec![2., 3.]]);
        }

        #[test]
        fn resize_truncates_surplus_rows() {
            let device = Device::Cpu;
            let t = Tensor::new(&[[1f32], [2.], [3.]], &device).unwrap();
            let rows: Vec<Vec<f32>> = resize_vocab_rows(&t, 2).unwrap().to_vec2().unwrap();
            assert_eq!(rows, vec![vec![1.], vec![2.]]);
        }
    }
}
