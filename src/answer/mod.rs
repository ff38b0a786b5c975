//! Answer generation: prompt construction, model call, decode, normalization.

pub mod pipeline;
pub mod prompt;

pub use pipeline::AnswerPipeline;
pub use prompt::{PromptTemplate, Question};
