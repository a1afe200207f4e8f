//! Router for the health API

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;

use super::public;
use crate::api::state::AppState;

type SharedState = Arc<AppState>;

async fn health_check(State(state): State<SharedState>) -> Json<public::HealthResponse> {
    let pipeline = &state.pipeline;
    Json(public::HealthResponse {
        status: String::from("healthy"),
        timestamp: Utc::now().to_rfc3339(),
        model: pipeline.model().to_string(),
        safety_model: pipeline.safety_model().to_string(),
        sessions: pipeline.sessions().session_count(),
        safety_check_failures: pipeline.safety_check_failures(),
    })
}

/// Create the health router
pub fn router() -> Router<SharedState> {
    Router::new().route("/health", get(health_check))
}
