//! The core models for a conversation with the LLM.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::openai::{Message, Role};

/// One message in a conversation. Turns are never modified after
/// they are created.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Turn {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Message::new(turn.role, &turn.content)
    }
}
