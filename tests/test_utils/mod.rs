//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use serde_json::json;

use balrog::api::{AppState, SESSION_COOKIE, app};
use balrog::chat::FailPolicy;
use balrog::core::{AppConfig, LogLevel};
use balrog::openai::CompletionOptions;

pub const MAIN_MODEL: &str = "gpt-4o";
pub const SAFETY_MODEL: &str = "meta-llama/Llama-Guard-7b";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

/// Config pointing the main and safety models at two mock servers.
pub fn test_config(main_url: &str, safety_url: &str) -> AppConfig {
    AppConfig {
        host: String::from("127.0.0.1"),
        port: 5000,
        openai_api_base: format!("{}/v1", main_url),
        openai_api_key: String::from("test-api-key"),
        openai_model: String::from(MAIN_MODEL),
        safety_api_base: format!("{}/v1", safety_url),
        safety_api_key: String::from("test-safety-key"),
        safety_model: String::from(SAFETY_MODEL),
        system_message: None,
        history_limit: 20,
        request_timeout: Duration::from_secs(5),
        completion_options: CompletionOptions::default(),
        fail_policy: FailPolicy::Open,
        static_dir: None,
        log_level: LogLevel::Debug,
    }
}

pub fn test_app_with_config(config: AppConfig) -> TestApp {
    let state = Arc::new(AppState::new(config));
    TestApp {
        router: app(Arc::clone(&state)),
        state,
    }
}

/// Creates a test application whose upstream models are served by
/// the given mock servers.
pub fn test_app(main: &mockito::Server, safety: &mockito::Server) -> TestApp {
    test_app_with_config(test_config(&main.url(), &safety.url()))
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_to_json(body: Body) -> serde_json::Value {
    serde_json::from_str(&body_to_string(body).await).unwrap()
}

/// An OpenAI compatible chat completion response body
pub fn completion_body(content: &str) -> String {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1694268190,
        "model": "test",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

/// Mocks the safety model's verdict on user input
pub async fn mock_input_check(server: &mut mockito::Server, verdict: &str) -> mockito::Mock {
    server
        .mock("POST", "/v1/chat/completions")
        .match_body(mockito::Matcher::Regex("Check if this input".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body(verdict))
        .create_async()
        .await
}

/// Mocks the safety model's verdict on model output
pub async fn mock_output_check(server: &mut mockito::Server, verdict: &str) -> mockito::Mock {
    server
        .mock("POST", "/v1/chat/completions")
        .match_body(mockito::Matcher::Regex("Check if this output".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body(verdict))
        .create_async()
        .await
}

pub async fn mock_reply(server: &mut mockito::Server, reply: &str) -> mockito::Mock {
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body(reply))
        .create_async()
        .await
}

pub fn chat_request(message: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/api/chat")
        .method("POST")
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(json!({ "message": message }).to_string()))
        .unwrap()
}

/// The `name=value` pair of the session cookie set by a response
pub fn session_cookie<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{}=", SESSION_COOKIE)))
        .map(String::from)
}

/// Session ID from a `name=value` cookie pair
pub fn session_id(cookie: &str) -> String {
    cookie
        .split_once('=')
        .map(|(_, id)| id.to_string())
        .unwrap_or_default()
}
