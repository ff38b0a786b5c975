//! Default configuration constants for medqa.
//!
//! These are the operating defaults of the deployed medical QA model. Every
//! value here is overridable through the configuration file.

/// Base causal language model on the Hugging Face hub.
pub const BASE_REPO: &str = "deepseek-ai/DeepSeek-R1-Distill-Llama-8B";

/// Hub revision of the base model.
pub const BASE_REVISION: &str = "main";

/// Directory holding the PEFT adapter weights and the fine-tuned tokenizer.
pub const ADAPTER_PATH: &str = "deepseek_medical_qa_peft";

/// Vocabulary size the base model's embeddings are resized to before the
/// adapter is applied. Matches the tokenizer the adapter was trained with
/// (base vocabulary plus the added role markers).
pub const RESIZE_EMBEDDINGS: usize = 128_270;

/// Sampling temperature.
pub const TEMPERATURE: f64 = 0.7;

/// Nucleus sampling threshold.
pub const TOP_P: f64 = 0.9;

/// Top-k cutoff applied before nucleus sampling.
pub const TOP_K: usize = 50;

/// Repetition penalty applied over the whole context.
pub const REPETITION_PENALTY: f32 = 1.2;

/// Maximum number of generated tokens per answer.
pub const MAX_NEW_TOKENS: usize = 200;

/// Seed for the sampling RNG.
pub const SEED: u64 = 299_792_458;

/// Marker placed before the question in the role-tag convention.
pub const ROLE_OPEN: &str = "<|patient|>";

/// Marker placed after the question in the role-tag convention.
pub const ROLE_CLOSE: &str = "<|endofprompt|>";

/// Prefix used by the reasoning-tag convention.
pub const REASONING_MARKER: &str = "<think>";

/// Special-token strings removed from decoded text, in removal order.
pub const SPECIAL_MARKERS: &[&str] = &[
    "<|endoftext|>",
    "<|doctor|>",
    "<\u{ff5c}begin\u{2581}of\u{2581}sentence\u{ff5c}>",
];

/// Address the HTTP server binds to.
pub const HOST: &str = "0.0.0.0";

/// Port the HTTP server listens on.
pub const PORT: u16 = 5000;

/// Base URL used by the CLI client commands.
pub const SERVER_URL: &str = "http://127.0.0.1:5000";

/// Report the compute device compiled into this build.
///
/// A `cuda` build still falls back to the CPU when no GPU is present; the
/// backend logs the device it actually selected.
pub fn compute_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "candle") {
        "CPU"
    } else {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_defaults_are_within_operating_ranges() {
        assert!((0.6..=0.7).contains(&TEMPERATURE));
        assert!((200..=256).contains(&MAX_NEW_TOKENS));
        assert_eq!(TOP_P, 0.9);
        assert_eq!(TOP_K, 50);
        assert_eq!(REPETITION_PENALTY, 1.2);
    }

    #[test]
    fn special_markers_include_begin_of_sentence() {
        assert!(
            SPECIAL_MARKERS
                .iter()
                .any(|m| m.contains("begin\u{2581}of\u{2581}sentence")),
            "BOS marker should be stripped by default"
        );
    }

    #[test]
    fn compute_backend_matches_compiled_feature() {
        let expected = if cfg!(feature = "cuda") {
            "CUDA"
        } else if cfg!(feature = "candle") {
            "CPU"
        } else {
            "none"
        };
        assert_eq!(compute_backend(), expected);
    }
}
