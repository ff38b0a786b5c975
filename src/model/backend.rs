use crate::error::{MedqaError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tokenized prompt as handed to the generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    pub ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl Encoding {
    /// Ids whose attention mask is set. Padding positions are dropped.
    pub fn attended_ids(&self) -> Vec<u32> {
        self.ids
            .iter()
            .zip(self.attention_mask.iter())
            .filter(|(_, mask)| **mask != 0)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub repetition_penalty: f32,
    pub max_new_tokens: usize,
    pub seed: u64,
}

/// Tokenizer and causal language model pair.
///
/// The pair is treated as one shared resource: implementations are not
/// required to be re-entrant, callers serialize access.
pub trait InferenceBackend: Send + 'static {
    /// Tokenize a prompt, adding the model's own special tokens (BOS).
    fn encode(&mut self, prompt: &str) -> Result<Encoding>;

    /// Sample a continuation.
    ///
    /// Returns the prompt ids followed by the generated ids.
    fn generate(&mut self, input: &Encoding, params: &SamplingParams) -> Result<Vec<u32>>;

    /// Turn ids back into text, optionally suppressing special tokens.
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String>;

    /// Return the name of the loaded model for logging.
    fn name(&self) -> &str;
}

/// Call counts recorded by [`MockBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub encode: usize,
    pub generate: usize,
    pub decode: usize,
}

#[derive(Debug, Default)]
struct MockCounters {
    encode: AtomicUsize,
    generate: AtomicUsize,
    decode: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    last_params: Mutex<Option<SamplingParams>>,
}

/// Marks one generate call as in flight until dropped.
struct InFlight<'a>(&'a MockCounters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a MockCounters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock backend for testing
///
/// Tokenizes one id per `char`, echoes the prompt and appends a fixed
/// continuation. Clones share their call counters.
#[derive(Debug, Clone)]
pub struct MockBackend {
    model_name: String,
    continuation: String,
    special_tokens: Vec<String>,
    should_fail: bool,
    delay: Option<Duration>,
    counters: Arc<MockCounters>,
}

impl MockBackend {
    /// Create a new mock backend with an empty continuation
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            continuation: String::new(),
            special_tokens: Vec::new(),
            should_fail: false,
            delay: None,
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Text appended after the echoed prompt
    pub fn with_continuation(mut self, continuation: &str) -> Self {
        self.continuation = continuation.to_string();
        self
    }

    /// Strings treated as special tokens (removed when decoding with
    /// `skip_special_tokens`)
    pub fn with_special_tokens(mut self, tokens: &[&str]) -> Self {
        self.special_tokens = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Configure the mock to fail on generate
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Block for `delay` inside generate
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls made so far across all clones
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            encode: self.counters.encode.load(Ordering::SeqCst),
            generate: self.counters.generate.load(Ordering::SeqCst),
            decode: self.counters.decode.load(Ordering::SeqCst),
        }
    }

    /// Most generate calls ever observed running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Sampling parameters of the most recent generate call
    pub fn last_params(&self) -> Option<SamplingParams> {
        self.counters
            .last_params
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

impl InferenceBackend for MockBackend {
    fn encode(&mut self, prompt: &str) -> Result<Encoding> {
        self.counters.encode.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<u32> = prompt.chars().map(u32::from).collect();
        let attention_mask = vec![1; ids.len()];
        Ok(Encoding {
            ids,
            attention_mask,
        })
    }

    fn generate(&mut self, input: &Encoding, params: &SamplingParams) -> Result<Vec<u32>> {
        self.counters.generate.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.counters);
        if let Ok(mut last) = self.counters.last_params.lock() {
            *last = Some(params.clone());
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.should_fail {
            return Err(MedqaError::Generation {
                message: "mock generation failure".to_string(),
            });
        }

        let mut output = input.attended_ids();
        output.extend(self.continuation.chars().map(u32::from));
        Ok(output)
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.counters.decode.fetch_add(1, Ordering::SeqCst);
        let mut text: String = ids.iter().filter_map(|&id| char::from_u32(id)).collect();
        if skip_special_tokens {
            for token in &self.special_tokens {
                text = text.replace(token.as_str(), "");
            }
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
