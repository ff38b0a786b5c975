//! HTTP client for a running medqa server.

use crate::error::{MedqaError, Result};
use crate::server::protocol::{AnswerResponse, ErrorResponse, QuestionPayload, StatusResponse};
use reqwest::StatusCode;

/// Thin wrapper around `reqwest` bound to one server.
#[derive(Debug, Clone)]
pub struct MedqaClient {
    base_url: String,
    http: reqwest::Client,
}

impl MedqaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /status`. A not-ready server (503) is a successful call.
    pub async fn status(&self) -> Result<StatusResponse> {
        let response = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .map_err(|e| connect_error(&self.base_url, e))?;

        response.json::<StatusResponse>().await.map_err(|e| MedqaError::Http {
            message: format!("Failed to parse status response: {e}"),
        })
    }

    /// `POST /get_answer` as a form, the way the browser page submits it.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let payload = QuestionPayload {
            question: Some(question.to_string()),
        };
        let response = self
            .http
            .post(format!("{}/get_answer", self.base_url))
            .form(&payload)
            .send()
            .await
            .map_err(|e| connect_error(&self.base_url, e))?;

        let status = response.status();
        if status.is_success() {
            let body: AnswerResponse = response.json().await.map_err(|e| MedqaError::Http {
                message: format!("Failed to parse answer: {e}"),
            })?;
            return Ok(body.answer);
        }

        let body = response
            .json::<ErrorResponse>()
            .await
            .unwrap_or_else(|_| ErrorResponse::new(status.to_string()));
        Err(error_from_response(status, body))
    }
}

fn connect_error(base_url: &str, err: reqwest::Error) -> MedqaError {
    MedqaError::Http {
        message: format!("Failed to reach {base_url}: {err}"),
    }
}

fn error_from_response(status: StatusCode, body: ErrorResponse) -> MedqaError {
    if status == StatusCode::BAD_REQUEST {
        return MedqaError::InvalidInput {
            message: body.error,
        };
    }
    let message = match body.message {
        Some(detail) => format!("{} ({status}): {detail}", body.error),
        None => format!("{} ({status})", body.error),
    };
    MedqaError::Http { message }
}
