use super::state::AppState;
use crate::chat::{
    IgnoreReason, InteractionState, ListenOutcome, SPEECH_START_FAILED_NOTICE,
    SPEECH_UNSUPPORTED_NOTICE,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetInputRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    /// Optional text replacing the input field before sending
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ListenResponse {
    pub state: InteractionState,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /chat/transcript
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.chat.transcript().await))
}

/// GET /chat/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.chat.status().await))
}

/// PUT /chat/input
pub async fn set_input(
    State(state): State<AppState>,
    Json(req): Json<SetInputRequest>,
) -> impl IntoResponse {
    if state.chat.set_input(req.text).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::CONFLICT, "A reply is still streaming")
    }
}

/// POST /chat/submit
/// Send the input field; the reply streams in the background
pub async fn submit(
    State(state): State<AppState>,
    body: Option<Json<SubmitRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let message = match state.chat.begin_exchange(req.text).await {
        Ok(message) => message,
        Err(IgnoreReason::Busy) => {
            return error_response(StatusCode::CONFLICT, "A reply is still streaming")
        }
        Err(IgnoreReason::Blank) => {
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, "Input is blank")
        }
    };

    info!("Submitted message ({} chars)", message.len());

    let chat = Arc::clone(&state.chat);
    tokio::spawn(async move {
        chat.stream_reply(message).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            status: "sending".to_string(),
            message: "Reply is streaming".to_string(),
        }),
    )
        .into_response()
}

/// POST /chat/listen/toggle
pub async fn toggle_listen(State(state): State<AppState>) -> impl IntoResponse {
    match state.chat.toggle_listen().await {
        ListenOutcome::Started | ListenOutcome::Stopped => (
            StatusCode::OK,
            Json(ListenResponse {
                state: state.chat.state().await,
            }),
        )
            .into_response(),
        ListenOutcome::Unavailable => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, SPEECH_UNSUPPORTED_NOTICE)
        }
        ListenOutcome::Failed => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, SPEECH_START_FAILED_NOTICE)
        }
        ListenOutcome::Busy => error_response(StatusCode::CONFLICT, "A reply is still streaming"),
    }
}

/// POST /chat/mute/toggle
pub async fn toggle_mute(State(state): State<AppState>) -> impl IntoResponse {
    let muted = state.chat.toggle_mute().await;
    (StatusCode::OK, Json(MuteResponse { muted }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
