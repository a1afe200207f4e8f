//! Router for the chat API

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use axum_extra::extract::cookie::CookieJar;

use super::public;
use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::api::utils::{ensure_session, existing_session};
use crate::chat::{ChatError, ChatOutcome};

type SharedState = Arc<AppState>;

/// Run one safety filtered chat turn for the caller's session
async fn chat_handler(
    State(state): State<SharedState>,
    jar: CookieJar,
    payload: Result<Json<public::ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::bad_request(anyhow::anyhow!(e.body_text())))?;
    let (jar, session_id) = ensure_session(jar);

    // The session cookie goes out on every response, errors included
    let outcome = match state.pipeline.handle(&session_id, &payload.message).await {
        Ok(outcome) => outcome,
        Err(ChatError::EmptyMessage) => {
            let err = ApiError::bad_request(ChatError::EmptyMessage);
            return Ok((jar, err).into_response());
        }
        Err(ChatError::Completion(e)) => return Ok((jar, ApiError::from(e)).into_response()),
    };

    let resp = match outcome {
        ChatOutcome::Accepted { message, timestamp } => (
            StatusCode::OK,
            Json(public::ChatResponse {
                message,
                timestamp: timestamp.to_rfc3339(),
            }),
        )
            .into_response(),
        ChatOutcome::InputFiltered { classification } => (
            StatusCode::BAD_REQUEST,
            Json(public::FilteredResponse::input(classification)),
        )
            .into_response(),
        ChatOutcome::OutputFiltered { classification } => (
            StatusCode::BAD_REQUEST,
            Json(public::FilteredResponse::output(classification)),
        )
            .into_response(),
    };

    Ok((jar, resp).into_response())
}

/// Forget the caller's conversation history
async fn clear_handler(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Json<public::ClearResponse> {
    if let Some(session_id) = existing_session(&jar) {
        state.pipeline.sessions().clear(&session_id);
        tracing::info!("Cleared session {}", session_id);
    }
    Json(public::ClearResponse::cleared())
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/clear", post(clear_handler))
}
