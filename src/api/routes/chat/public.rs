//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::api::public::ErrorType;

pub const INPUT_FILTERED_ERROR: &str = "Content filtered by safety model";
pub const OUTPUT_FILTERED_ERROR: &str = "Response filtered by safety model";

#[derive(Deserialize)]
pub struct ChatRequest {
    // A missing message is treated the same as an empty one
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilteredResponse {
    pub error: String,
    pub classification: String,
    pub r#type: ErrorType,
}

impl FilteredResponse {
    pub fn input(classification: String) -> Self {
        Self {
            error: INPUT_FILTERED_ERROR.to_string(),
            classification,
            r#type: ErrorType::InputFiltered,
        }
    }

    pub fn output(classification: String) -> Self {
        Self {
            error: OUTPUT_FILTERED_ERROR.to_string(),
            classification,
            r#type: ErrorType::OutputFiltered,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub status: String,
}

impl ClearResponse {
    pub fn cleared() -> Self {
        Self {
            status: String::from("cleared"),
        }
    }
}
