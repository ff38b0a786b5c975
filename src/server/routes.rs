//! HTTP handlers.

use crate::answer::Question;
use crate::error::{MedqaError, Result};
use crate::server::protocol::{
    AnswerResponse, ErrorResponse, QuestionPayload, ReadyStatus, StatusResponse,
};
use crate::service::InferenceService;
use axum::extract::{FromRequest, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

const INDEX_HTML: &str = include_str!("index.html");

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InferenceService>,
    pub generation_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(service: Arc<InferenceService>, generation_timeout: Option<Duration>) -> Self {
        Self {
            service,
            generation_timeout,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/get_answer", post(get_answer))
        // The chat frontend is served from a different origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP status for an error raised while answering.
pub fn status_code(err: &MedqaError) -> StatusCode {
    match err {
        MedqaError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        MedqaError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn status(State(state): State<AppState>) -> (StatusCode, Json<StatusResponse>) {
    let service = &state.service;
    let (code, status) = if service.state().is_ready() {
        (StatusCode::OK, ReadyStatus::Ready)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, ReadyStatus::NotReady)
    };
    (
        code,
        Json(StatusResponse {
            status,
            message: service.status_message(),
        }),
    )
}

async fn get_answer(State(state): State<AppState>, request: Request) -> Response {
    match answer_request(&state, request).await {
        Ok(answer) => Json(AnswerResponse { answer }).into_response(),
        Err(e) => {
            let code = status_code(&e);
            if code.is_server_error() && code != StatusCode::SERVICE_UNAVAILABLE {
                tracing::error!(error = %e, "Answer failed");
            } else {
                tracing::debug!(error = %e, status = code.as_u16(), "Answer rejected");
            }
            (code, Json(ErrorResponse::from(&e))).into_response()
        }
    }
}

async fn answer_request(state: &AppState, request: Request) -> Result<String> {
    // Readiness is checked before the request body is looked at
    let observed = state.service.state();
    if !observed.is_ready() {
        return Err(MedqaError::ModelUnavailable { state: observed });
    }

    let raw = extract_question(request).await.unwrap_or_default();
    let question = Question::parse(&raw)?;
    tracing::debug!(chars = raw.chars().count(), "Question received");

    Arc::clone(&state.service)
        .answer_blocking(question, state.generation_timeout)
        .await
}

/// Form field `question` for form posts, JSON member `question` otherwise.
async fn extract_question(request: Request) -> Option<String> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));

    let payload = if is_form {
        Form::<QuestionPayload>::from_request(request, &())
            .await
            .ok()
            .map(|Form(payload)| payload)
    } else {
        Json::<QuestionPayload>::from_request(request, &())
            .await
            .ok()
            .map(|Json(payload)| payload)
    };
    payload.and_then(|p| p.question)
}
