//! Question → cleaned answer, one request at a time.

use crate::answer::prompt::{PromptTemplate, Question, strip_echo, strip_markers};
use crate::config::{Config, DecodeStrategy, GenerationConfig, PromptConfig};
use crate::error::{MedqaError, Result};
use crate::model::backend::{Encoding, InferenceBackend, SamplingParams};
use crate::service::availability::ModelState;
use crate::text::TextChain;

/// Configuration-driven answer pipeline.
///
/// Holds no model state; the caller supplies the backend and the observed
/// availability for every request.
pub struct AnswerPipeline {
    template: PromptTemplate,
    decode: DecodeStrategy,
    markers: Vec<String>,
    sampling: SamplingParams,
    normalizer: TextChain,
}

impl AnswerPipeline {
    pub fn new(prompt: &PromptConfig, generation: &GenerationConfig) -> Self {
        Self {
            template: PromptTemplate::from_config(prompt),
            decode: prompt.decode,
            markers: prompt.special_markers.clone(),
            sampling: generation.sampling_params(),
            normalizer: TextChain::answer_normalization(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.prompt, &config.generation)
    }

    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Answer one question.
    ///
    /// # Errors
    /// - `ModelUnavailable` when `state` is not `Ready`; the backend is not touched
    /// - `Generation` for any tokenizer or model failure
    pub fn generate_answer(
        &self,
        question: &Question,
        state: ModelState,
        backend: &mut dyn InferenceBackend,
    ) -> Result<String> {
        if !state.is_ready() {
            return Err(MedqaError::ModelUnavailable { state });
        }

        let prompt = self.template.build(question);
        let input = backend.encode(&prompt)?;
        let output = backend.generate(&input, &self.sampling)?;
        let raw = self.decode_output(backend, &prompt, &input, &output)?;
        tracing::trace!(raw = %raw, "Decoded generation");

        Ok(self.normalizer.apply(&raw))
    }

    fn decode_output(
        &self,
        backend: &dyn InferenceBackend,
        prompt: &str,
        input: &Encoding,
        output: &[u32],
    ) -> Result<String> {
        match self.decode {
            DecodeStrategy::StripMarkers => {
                let decoded = backend.decode(output, false)?;
                Ok(strip_markers(&decoded, prompt, &self.markers))
            }
            DecodeStrategy::SkipSpecialTokens => {
                let decoded = backend.decode(output, true)?;
                if let Some(rest) = decoded.strip_prefix(prompt) {
                    return Ok(rest.to_string());
                }
                // Markers are suppressed in the output, so compare against
                // the prompt decoded the same way
                let echoed = backend.decode(&input.attended_ids(), true)?;
                Ok(strip_echo(&decoded, &[echoed.as_str()]).to_string())
            }
        }
    }
}
