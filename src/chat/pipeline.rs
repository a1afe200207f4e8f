//! The safety filtered chat turn.
//!
//! Every user message goes through up to three sequential model
//! calls: the safety model checks the input, the main model answers,
//! and the safety model checks the answer. Only content that passed
//! its check is written to the session history.
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::models::Turn;
use super::store::SessionStore;
use crate::openai::{CompletionError, CompletionOptions, Message, Role, SharedCompleter};
use crate::safety::{Classification, ContentKind, SAFETY_CHECK_FAILED, SafetyClassifier};

/// What to do with content when the safety model can't be reached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailPolicy {
    /// Treat the content as safe
    #[default]
    Open,
    /// Treat the content as unsafe
    Closed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChatOutcome {
    Accepted {
        message: String,
        timestamp: DateTime<Utc>,
    },
    InputFiltered {
        classification: String,
    },
    OutputFiltered {
        classification: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Empty message")]
    EmptyMessage,
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

pub struct FilteringPipeline {
    client: SharedCompleter,
    model: String,
    options: CompletionOptions,
    system_message: Option<String>,
    classifier: SafetyClassifier,
    fail_policy: FailPolicy,
    sessions: SessionStore,
    safety_check_failures: AtomicU64,
}

impl FilteringPipeline {
    /// Use `FilteringPipeline::builder()` to construct a pipeline.
    pub fn builder(
        client: SharedCompleter,
        model: &str,
        classifier: SafetyClassifier,
    ) -> PipelineBuilder {
        PipelineBuilder::new(client, model, classifier)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn safety_model(&self) -> &str {
        self.classifier.model()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Number of safety checks that errored and were resolved by the
    /// fail policy instead of a verdict.
    pub fn safety_check_failures(&self) -> u64 {
        self.safety_check_failures.load(Ordering::Relaxed)
    }

    /// Runs one chat turn for the session.
    ///
    /// Returns `Err` only when the message is empty or the main model
    /// call fails. A failed main model call leaves the user's turn in
    /// the history.
    pub async fn handle(&self, session_id: &str, message: &str) -> Result<ChatOutcome, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let verdict = self.screen(message, ContentKind::Input).await;
        if !verdict.is_safe() {
            tracing::warn!("Unsafe input detected: {}", verdict.label());
            return Ok(ChatOutcome::InputFiltered {
                classification: verdict.label(),
            });
        }

        self.sessions.append(session_id, Turn::user(message));

        let messages = self.transcript(session_id);
        let reply = self
            .client
            .complete(&self.model, &messages, &self.options)
            .await
            .inspect_err(|e| tracing::error!("LLM client error: {}", e))?;

        let verdict = self.screen(&reply, ContentKind::Output).await;
        if !verdict.is_safe() {
            tracing::warn!("Unsafe output detected: {}", verdict.label());
            return Ok(ChatOutcome::OutputFiltered {
                classification: verdict.label(),
            });
        }

        let turn = Turn::assistant(&reply);
        let timestamp = turn.timestamp();
        self.sessions.append(session_id, turn);

        tracing::info!(
            "Completed turn for session {} ({} turns in history)",
            session_id,
            self.sessions.history(session_id).len()
        );

        Ok(ChatOutcome::Accepted {
            message: reply,
            timestamp,
        })
    }

    /// The messages sent to the main model: the optional system
    /// message followed by the session history.
    fn transcript(&self, session_id: &str) -> Vec<Message> {
        let history = self.sessions.history(session_id);
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system_message) = &self.system_message {
            messages.push(Message::new(Role::System, system_message));
        }
        messages.extend(history.iter().map(Message::from));
        messages
    }

    async fn screen(&self, content: &str, kind: ContentKind) -> Classification {
        match self.classifier.classify(content, kind).await {
            Ok(classification) => classification,
            Err(e) => {
                self.safety_check_failures.fetch_add(1, Ordering::Relaxed);
                match self.fail_policy {
                    FailPolicy::Open => {
                        tracing::error!("Safety model error on {}: {}. Allowing content", kind, e);
                        Classification::Safe
                    }
                    FailPolicy::Closed => {
                        tracing::error!("Safety model error on {}: {}. Blocking content", kind, e);
                        Classification::Unsafe {
                            category: Some(SAFETY_CHECK_FAILED.to_string()),
                        }
                    }
                }
            }
        }
    }
}

pub struct PipelineBuilder {
    client: SharedCompleter,
    model: String,
    options: CompletionOptions,
    system_message: Option<String>,
    classifier: SafetyClassifier,
    fail_policy: FailPolicy,
    sessions: SessionStore,
}

impl PipelineBuilder {
    pub fn new(client: SharedCompleter, model: &str, classifier: SafetyClassifier) -> Self {
        Self {
            client,
            model: model.to_string(),
            options: CompletionOptions::default(),
            system_message: None,
            classifier,
            fail_policy: FailPolicy::default(),
            sessions: SessionStore::new(),
        }
    }

    pub fn build(self) -> FilteringPipeline {
        FilteringPipeline {
            client: self.client,
            model: self.model,
            options: self.options,
            system_message: self.system_message,
            classifier: self.classifier,
            fail_policy: self.fail_policy,
            sessions: self.sessions,
            safety_check_failures: AtomicU64::new(0),
        }
    }

    pub fn options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn system_message(mut self, system_message: Option<String>) -> Self {
        self.system_message = system_message;
        self
    }

    pub fn fail_policy(mut self, fail_policy: FailPolicy) -> Self {
        self.fail_policy = fail_policy;
        self
    }

    pub fn sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::openai::Completer;

    const MAIN: &str = "main-model";
    const GUARD: &str = "guard-model";

    /// Replies with canned responses per model, in order, and records
    /// every request it receives.
    #[derive(Default)]
    struct ScriptedCompleter {
        replies: Mutex<HashMap<String, VecDeque<Result<String, CompletionError>>>>,
        requests: Mutex<Vec<(String, Vec<Message>)>>,
    }

    impl ScriptedCompleter {
        fn reply(self, model: &str, reply: Result<&str, CompletionError>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(model.to_string())
                .or_default()
                .push_back(reply.map(String::from));
            self
        }

        fn requests_for(&self, model: &str) -> Vec<Vec<Message>> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == model)
                .map(|(_, msgs)| msgs.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Completer for ScriptedCompleter {
        async fn complete(
            &self,
            model: &str,
            messages: &[Message],
            _options: &CompletionOptions,
        ) -> Result<String, CompletionError> {
            self.requests
                .lock()
                .unwrap()
                .push((model.to_string(), messages.to_vec()));
            self.replies
                .lock()
                .unwrap()
                .get_mut(model)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| panic!("No scripted reply left for {}", model))
        }
    }

    fn upstream_error() -> CompletionError {
        CompletionError::Upstream {
            status: 500,
            body: String::from("boom"),
        }
    }

    fn pipeline(completer: &Arc<ScriptedCompleter>) -> PipelineBuilder {
        let shared: SharedCompleter = completer.clone();
        let classifier = SafetyClassifier::new(shared.clone(), GUARD);
        FilteringPipeline::builder(shared, MAIN, classifier)
    }

    #[tokio::test]
    async fn it_accepts_a_safe_turn() {
        let completer = Arc::new(
            ScriptedCompleter::default()
                .reply(GUARD, Ok("safe"))
                .reply(MAIN, Ok("Hi there!"))
                .reply(GUARD, Ok("safe")),
        );
        let pipeline = pipeline(&completer).build();

        let outcome = pipeline.handle("s1", "Hello").await.unwrap();

        match outcome {
            ChatOutcome::Accepted { message, .. } => assert_eq!(message, "Hi there!"),
            other => panic!("Expected accepted, got {:?}", other),
        }
        let history = pipeline.sessions().history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content(), "Hello");
        assert_eq!(history[1].content(), "Hi there!");
        assert_eq!(pipeline.safety_check_failures(), 0);
    }

    #[tokio::test]
    async fn it_blocks_unsafe_input() {
        let completer = Arc::new(ScriptedCompleter::default().reply(GUARD, Ok("unsafe\nviolence")));
        let pipeline = pipeline(&completer).build();

        let outcome = pipeline.handle("s1", "<harmful content>").await.unwrap();

        assert_eq!(
            outcome,
            ChatOutcome::InputFiltered {
                classification: String::from("violence")
            }
        );
        assert!(pipeline.sessions().history("s1").is_empty());
        // The main model is never called
        assert!(completer.requests_for(MAIN).is_empty());
    }

    #[tokio::test]
    async fn it_blocks_unsafe_output_but_keeps_the_user_turn() {
        let completer = Arc::new(
            ScriptedCompleter::default()
                .reply(GUARD, Ok("safe"))
                .reply(MAIN, Ok("something terrible"))
                .reply(GUARD, Ok("unsafe\nS1")),
        );
        let pipeline = pipeline(&completer).build();

        let outcome = pipeline.handle("s1", "Tell me a story").await.unwrap();

        assert_eq!(
            outcome,
            ChatOutcome::OutputFiltered {
                classification: String::from("S1")
            }
        );
        let history = pipeline.sessions().history("s1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role(), Role::User);
        assert_eq!(history[0].content(), "Tell me a story");
    }

    #[tokio::test]
    async fn it_fails_open_when_the_safety_model_errors() {
        let completer = Arc::new(
            ScriptedCompleter::default()
                .reply(GUARD, Err(upstream_error()))
                .reply(MAIN, Ok("Hi there!"))
                .reply(GUARD, Err(CompletionError::EmptyResponse)),
        );
        let pipeline = pipeline(&completer).build();

        let outcome = pipeline.handle("s1", "Hello").await.unwrap();

        assert!(matches!(outcome, ChatOutcome::Accepted { .. }));
        assert_eq!(pipeline.sessions().history("s1").len(), 2);
        assert_eq!(pipeline.safety_check_failures(), 2);
    }

    #[tokio::test]
    async fn it_fails_closed_when_configured() {
        let completer = Arc::new(ScriptedCompleter::default().reply(GUARD, Err(upstream_error())));
        let pipeline = pipeline(&completer).fail_policy(FailPolicy::Closed).build();

        let outcome = pipeline.handle("s1", "Hello").await.unwrap();

        assert_eq!(
            outcome,
            ChatOutcome::InputFiltered {
                classification: String::from(SAFETY_CHECK_FAILED)
            }
        );
        assert!(pipeline.sessions().history("s1").is_empty());
        assert_eq!(pipeline.safety_check_failures(), 1);
    }

    #[tokio::test]
    async fn it_fails_closed_on_the_output_check() {
        let completer = Arc::new(
            ScriptedCompleter::default()
                .reply(GUARD, Ok("safe"))
                .reply(MAIN, Ok("Hi there!"))
                .reply(GUARD, Err(CompletionError::EmptyResponse)),
        );
        let pipeline = pipeline(&completer).fail_policy(FailPolicy::Closed).build();

        let outcome = pipeline.handle("s1", "Hello").await.unwrap();

        assert_eq!(
            outcome,
            ChatOutcome::OutputFiltered {
                classification: String::from(SAFETY_CHECK_FAILED)
            }
        );
        let history = pipeline.sessions().history("s1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role(), Role::User);
        assert_eq!(pipeline.safety_check_failures(), 1);
    }

    #[tokio::test]
    async fn it_surfaces_main_model_errors() {
        let completer = Arc::new(
            ScriptedCompleter::default()
                .reply(GUARD, Ok("safe"))
                .reply(MAIN, Err(upstream_error())),
        );
        let pipeline = pipeline(&completer).build();

        let result = pipeline.handle("s1", "Hello").await;

        assert!(matches!(
            result,
            Err(ChatError::Completion(CompletionError::Upstream { status: 500, .. }))
        ));
        // The user turn already passed its check so it stays
        assert_eq!(pipeline.sessions().history("s1").len(), 1);
    }

    #[tokio::test]
    async fn it_rejects_empty_messages_without_calling_anything() {
        let completer = Arc::new(ScriptedCompleter::default());
        let pipeline = pipeline(&completer).build();

        let result = pipeline.handle("s1", "   \n").await;

        assert!(matches!(result, Err(ChatError::EmptyMessage)));
        assert!(completer.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn it_sends_system_message_and_history_to_the_model() {
        let completer = Arc::new(
            ScriptedCompleter::default()
                .reply(GUARD, Ok("safe"))
                .reply(MAIN, Ok("first answer"))
                .reply(GUARD, Ok("safe"))
                .reply(GUARD, Ok("safe"))
                .reply(MAIN, Ok("second answer"))
                .reply(GUARD, Ok("safe")),
        );
        let pipeline = pipeline(&completer)
            .system_message(Some(String::from("You are terse.")))
            .build();

        pipeline.handle("s1", "first").await.unwrap();
        pipeline.handle("s1", "second").await.unwrap();

        let requests = completer.requests_for(MAIN);
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1],
            vec![
                Message::new(Role::System, "You are terse."),
                Message::new(Role::User, "first"),
                Message::new(Role::Assistant, "first answer"),
                Message::new(Role::User, "second"),
            ]
        );

        // The safety model only ever sees the single piece of content
        let guard_requests = completer.requests_for(GUARD);
        assert!(guard_requests.iter().all(|r| r.len() == 1));
        assert!(guard_requests[1][0].content.contains("first answer"));
    }

    #[tokio::test]
    async fn it_keeps_sessions_apart() {
        let completer = Arc::new(
            ScriptedCompleter::default()
                .reply(GUARD, Ok("safe"))
                .reply(MAIN, Ok("answer a"))
                .reply(GUARD, Ok("safe"))
                .reply(GUARD, Ok("safe"))
                .reply(MAIN, Ok("answer b"))
                .reply(GUARD, Ok("safe")),
        );
        let pipeline = pipeline(&completer).build();

        pipeline.handle("a", "from a").await.unwrap();
        pipeline.handle("b", "from b").await.unwrap();

        // Session b's request only contains its own turn
        let requests = completer.requests_for(MAIN);
        assert_eq!(requests[1], vec![Message::new(Role::User, "from b")]);

        pipeline.sessions().clear("a");
        assert!(pipeline.sessions().history("a").is_empty());
        assert_eq!(pipeline.sessions().history("b").len(), 2);
    }
}
