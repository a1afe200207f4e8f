//! Public types for the health API
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub model: String,
    pub safety_model: String,
    // Number of live chat sessions
    pub sessions: usize,
    pub safety_check_failures: u64,
}
