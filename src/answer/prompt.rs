//! Question validation, prompt wrapping and marker stripping.

use crate::config::{PromptConfig, PromptConvention};
use crate::error::{MedqaError, Result};
use std::fmt;

/// A question that is known to contain non-whitespace text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    /// Reject empty and whitespace-only input. The text is kept verbatim.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(MedqaError::InvalidInput {
                message: "No question provided".to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed text placed around the question before tokenization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    prefix: String,
    suffix: String,
}

impl PromptTemplate {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Pick the markers of the configured convention.
    pub fn from_config(config: &PromptConfig) -> Self {
        match config.convention {
            PromptConvention::RoleTags => Self::new(&config.role_open, &config.role_close),
            PromptConvention::ReasoningPrefix => Self::new(&config.reasoning_marker, ""),
        }
    }

    pub fn build(&self, question: &Question) -> String {
        format!("{}{}{}", self.prefix, question.as_str(), self.suffix)
    }

    /// Inverse of [`build`](Self::build): the question text between the markers.
    pub fn strip<'a>(&self, prompt: &'a str) -> Option<&'a str> {
        prompt
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())
    }
}

/// Remove the echoed prompt and every marker as literal substrings.
///
/// The prompt goes first: it contains markers, and removing those first
/// would leave a prompt that no longer matches.
pub fn strip_markers<S: AsRef<str>>(raw: &str, prompt: &str, markers: &[S]) -> String {
    let mut text = if prompt.is_empty() {
        raw.to_string()
    } else {
        raw.replace(prompt, "")
    };
    for marker in markers {
        let marker = marker.as_ref();
        if !marker.is_empty() {
            text = text.replace(marker, "");
        }
    }
    text
}

/// Drop the first matching echoed prefix, if the output starts with one.
pub fn strip_echo<'a>(raw: &'a str, echoes: &[&str]) -> &'a str {
    echoes
        .iter()
        .filter(|echo| !echo.is_empty())
        .find_map(|echo| raw.strip_prefix(*echo))
        .unwrap_or(raw)
}
