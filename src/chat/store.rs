use std::sync::Arc;

use dashmap::DashMap;

use super::models::Turn;

/// In-memory conversation history keyed by session ID.
///
/// Cloning is cheap and every clone shares the same sessions. Locking
/// is per session so concurrent requests from different sessions never
/// wait on each other. Nothing survives a restart.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Vec<Turn>>>,
    // Max turns kept per session, `None` keeps everything
    history_limit: Option<usize>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the newest `limit` turns of each session. A limit of
    /// zero disables trimming.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            sessions: Arc::default(),
            history_limit: (limit > 0).then_some(limit),
        }
    }

    pub fn append(&self, session_id: &str, turn: Turn) {
        let mut turns = self.sessions.entry(session_id.to_string()).or_default();
        turns.push(turn);

        if let Some(limit) = self.history_limit {
            let overflow = turns.len().saturating_sub(limit);
            if overflow > 0 {
                turns.drain(..overflow);
            }
        }
    }

    pub fn history(&self, session_id: &str) -> Vec<Turn> {
        self.sessions
            .get(session_id)
            .map(|turns| turns.value().clone())
            .unwrap_or_default()
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
