//! The single owned inference object shared by every request handler.

pub mod availability;

use crate::answer::{AnswerPipeline, Question};
use crate::config::Config;
use crate::error::{MedqaError, Result};
use crate::model::backend::InferenceBackend;
use availability::{Availability, ModelState};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Availability gate, the loaded backend and the answer pipeline.
///
/// The backend is installed once on successful load. Generations are
/// serialized behind its mutex.
pub struct InferenceService {
    availability: Availability,
    backend: OnceLock<Mutex<Box<dyn InferenceBackend>>>,
    pipeline: AnswerPipeline,
    model_name: String,
}

impl InferenceService {
    pub fn new(config: &Config) -> Self {
        Self {
            availability: Availability::new(),
            backend: OnceLock::new(),
            pipeline: AnswerPipeline::from_config(config),
            model_name: config.model.base_repo.clone(),
        }
    }

    /// Run `loader` once, driving Unloaded → Loading → Ready | Failed.
    ///
    /// A load failure is recorded and logged, not returned: the service
    /// keeps reporting not-ready. Only a second load attempt is an error.
    pub fn load_with<F>(&self, loader: F) -> Result<ModelState>
    where
        F: FnOnce() -> Result<Box<dyn InferenceBackend>>,
    {
        self.availability.begin_loading()?;
        tracing::info!(model = %self.model_name, "Loading model");
        let started = Instant::now();

        match loader() {
            Ok(backend) => {
                let name = backend.name().to_string();
                if self.backend.set(Mutex::new(backend)).is_err() {
                    self.availability.mark_failed("backend already installed")?;
                    return Ok(ModelState::Failed);
                }
                self.availability.mark_ready()?;
                tracing::info!(
                    backend = %name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model loaded"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Model load failed");
                self.availability.mark_failed(e.to_string())?;
            }
        }
        Ok(self.availability.state())
    }

    pub fn state(&self) -> ModelState {
        self.availability.state()
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.availability.failure_message()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Human-readable status line for `/status`.
    pub fn status_message(&self) -> String {
        match self.state() {
            ModelState::Ready => "Model loaded and ready".to_string(),
            ModelState::Failed => match self.failure_message() {
                Some(reason) => format!("Model failed to load: {reason}"),
                None => "Model failed to load".to_string(),
            },
            state => format!("Model not loaded (state: {state})"),
        }
    }

    /// Answer on the calling thread, waiting for the backend lock.
    pub fn answer(&self, question: &Question) -> Result<String> {
        let state = self.state();
        // Installed strictly before the state turns Ready
        let Some(backend) = self.backend.get() else {
            return Err(MedqaError::ModelUnavailable { state });
        };
        // A panicked generation leaves no partial state behind in the backend
        let mut guard = backend.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovering model lock after a panicked generation");
            poisoned.into_inner()
        });

        let started = Instant::now();
        let answer = self
            .pipeline
            .generate_answer(question, state, guard.as_mut())?;
        tracing::info!(
            question_chars = question.as_str().chars().count(),
            answer_chars = answer.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answered"
        );
        Ok(answer)
    }

    /// Answer on the blocking pool, optionally bounded by `timeout`.
    ///
    /// On timeout the caller gets `GenerationTimeout`; the generation itself
    /// runs to completion and then releases the backend.
    pub async fn answer_blocking(
        self: Arc<Self>,
        question: Question,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let task = tokio::task::spawn_blocking(move || self.answer(&question));

        let joined = match timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| MedqaError::GenerationTimeout {
                    secs: limit.as_secs(),
                })?,
            None => task.await,
        };

        joined.map_err(|e| MedqaError::generation("Generation task", e))?
    }
}
