use std::fmt;

use crate::openai::{CompletionError, CompletionOptions, Message, Role, SharedCompleter};

/// Label used when a failed safety check blocks content.
pub const SAFETY_CHECK_FAILED: &str = "Safety check failed";

/// What the safety model decided about a piece of content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    Safe,
    Unsafe { category: Option<String> },
}

impl Classification {
    pub fn is_safe(&self) -> bool {
        matches!(self, Classification::Safe)
    }

    /// Label returned to API callers for blocked content: the category
    /// when the safety model gave one, otherwise the bare verdict.
    pub fn label(&self) -> String {
        match self {
            Classification::Safe => String::from("safe"),
            Classification::Unsafe {
                category: Some(category),
            } => category.clone(),
            Classification::Unsafe { category: None } => String::from("unsafe"),
        }
    }
}

/// Which side of the conversation is being checked. Only changes the
/// wording of the prompt sent to the safety model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Input,
    Output,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Input => write!(f, "input"),
            ContentKind::Output => write!(f, "output"),
        }
    }
}

/// Parse the raw reply of a Llama Guard style safety model.
///
/// The first line decides: `safe` (any case, surrounding whitespace
/// ignored) is safe and anything else is unsafe. Remaining lines are
/// the violated category, e.g. `"unsafe\nS1"`. Returns `None` for a
/// blank reply.
pub fn parse_classification(raw: &str) -> Option<Classification> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut lines = raw.lines();
    let verdict = lines.next().unwrap_or_default().trim();
    if verdict.eq_ignore_ascii_case("safe") {
        return Some(Classification::Safe);
    }

    let category = lines
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let category = if category.is_empty() {
        None
    } else {
        Some(category)
    };

    Some(Classification::Unsafe { category })
}

pub fn safety_prompt(content: &str, kind: ContentKind) -> String {
    format!("[INST] Task: Check if this {kind} is safe\n\n{content}[/INST]")
}

/// Asks a safety model whether content is acceptable.
#[derive(Clone)]
pub struct SafetyClassifier {
    client: SharedCompleter,
    model: String,
    options: CompletionOptions,
}

impl SafetyClassifier {
    pub fn new(client: SharedCompleter, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
            options: CompletionOptions {
                max_tokens: 100,
                temperature: 0.1,
            },
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn classify(
        &self,
        content: &str,
        kind: ContentKind,
    ) -> Result<Classification, CompletionError> {
        let messages = vec![Message::new(Role::User, &safety_prompt(content, kind))];
        let reply = self
            .client
            .complete(&self.model, &messages, &self.options)
            .await?;

        tracing::debug!("Safety model replied for {}: {:?}", kind, reply);

        parse_classification(&reply).ok_or(CompletionError::EmptyResponse)
    }
}
