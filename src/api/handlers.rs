//! HTTP request handlers

use super::types::{
    AutoDialogRequest, AutoDialogResponse, ConversationMode, ErrorResponse, ScriptChatRequest,
    VersionResponse, WireMessage,
};
use super::AppState;
use crate::llm::{CompletionRequest, CompletionService, LlmError, LlmErrorKind};
use crate::system_prompt::{build_system_prompt, opening_instruction};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Create the API router
#[must_use]
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Streaming role-play reply
        .route("/functions/v1/script-chat", post(script_chat))
        .route("/api/script-chat", post(script_chat))
        // One-shot automatic dialogue
        .route("/functions/v1/auto-dialog", post(auto_dialog))
        .route("/api/auto-dialog", post(auto_dialog))
        // Version
        .route("/version", get(get_version))
        .layer(cors)
        .with_state(state)
}

// ============================================================
// Composer
// ============================================================

async fn script_chat(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: ScriptChatRequest = parse_body(&body)?;
    let service = upstream(&state)?;

    tracing::info!(
        mode = %request.mode,
        messages = request.messages.len(),
        objections = request.objections.len(),
        "Composing script-chat reply"
    );
    let system = build_system_prompt(request.mode, &request.script_content, &request.objections);
    let relay = service
        .stream(&CompletionRequest::new(system, request.messages))
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(relay),
    )
        .into_response())
}

async fn auto_dialog(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AutoDialogResponse>, AppError> {
    let request: AutoDialogRequest = parse_body(&body)?;
    let service = upstream(&state)?;

    let mode = ConversationMode::Auto;
    let system = build_system_prompt(mode, &request.script_content, &request.objections);
    let opening = WireMessage::user(opening_instruction(mode));
    let response = service
        .complete(&CompletionRequest::new(system, vec![opening]))
        .await?;

    let conversation = if response.text.is_empty() {
        "Empty response".to_string()
    } else {
        response.text
    };
    let chars = conversation.chars().count();
    tracing::info!(chars, "Auto dialogue generated");

    Ok(Json(AutoDialogResponse {
        conversation,
        model: service.model_id().to_string(),
    }))
}

async fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: concat!("script-chat ", env!("CARGO_PKG_VERSION")),
    })
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed request body");
        AppError::Internal(e.to_string())
    })
}

fn upstream(state: &AppState) -> Result<&Arc<dyn CompletionService>, AppError> {
    state.completion.as_ref().ok_or_else(|| {
        tracing::error!("SCRIPT_CHAT_API_KEY is not configured");
        AppError::Internal("SCRIPT_CHAT_API_KEY is not configured".to_string())
    })
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    /// Carries the gateway's `Retry-After`, if it sent one
    RateLimited(Option<Duration>),
    PaymentRequired,
    /// Any other upstream failure; details stay in the log
    Upstream,
    Internal(String),
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        match e.kind {
            LlmErrorKind::RateLimit => AppError::RateLimited(e.retry_after),
            LlmErrorKind::PaymentRequired => AppError::PaymentRequired,
            _ => AppError::Upstream,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retry_after = if let AppError::RateLimited(Some(wait)) = &self {
            Some(HeaderValue::from(wait.as_secs()))
        } else {
            None
        };
        let (status, message) = match self {
            AppError::RateLimited(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "Слишком много запросов, попробуйте позже".to_string(),
            ),
            AppError::PaymentRequired => (
                StatusCode::PAYMENT_REQUIRED,
                "Требуется пополнение баланса AI".to_string(),
            ),
            AppError::Upstream => (StatusCode::INTERNAL_SERVER_ERROR, "Ошибка AI".to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        let mut response = (status, body).into_response();
        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
