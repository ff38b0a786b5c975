//! JSON bodies exchanged over HTTP.

use crate::error::MedqaError;
use serde::{Deserialize, Serialize};

/// `GET /status` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ReadyStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyStatus {
    Ready,
    NotReady,
}

/// `POST /get_answer` request, either form field or JSON member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionPayload {
    #[serde(default)]
    pub question: Option<String>,
}

/// Successful `POST /get_answer` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

/// Any failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl From<&MedqaError> for ErrorResponse {
    fn from(err: &MedqaError) -> Self {
        match err {
            MedqaError::InvalidInput { message } => Self::new(message.clone()),
            MedqaError::ModelUnavailable { .. } => Self::new("Model not loaded")
                .with_message("Restart the server to load the model again"),
            other => Self::new(other.to_string()),
        }
    }
}
