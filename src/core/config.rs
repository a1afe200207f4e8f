use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};

use crate::chat::{FailPolicy, FilteringPipeline, SessionStore};
use crate::openai::{CompletionOptions, OpenAiClient, SharedCompleter};
use crate::safety::SafetyClassifier;

use super::logging::LogLevel;

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub openai_api_base: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub safety_api_base: String,
    pub safety_api_key: String,
    pub safety_model: String,
    pub system_message: Option<String>,
    pub history_limit: usize,
    pub request_timeout: Duration,
    pub completion_options: CompletionOptions,
    pub fail_policy: FailPolicy,
    pub static_dir: Option<String>,
    pub log_level: LogLevel,
}

impl AppConfig {
    /// Checks values that clap can't check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("Port must be between 1 and 65535");
        }
        for url in [&self.openai_api_base, &self.safety_api_base] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("API endpoint must be a valid HTTP/HTTPS URL: {}", url);
            }
        }
        if self.openai_model.trim().is_empty() || self.safety_model.trim().is_empty() {
            bail!("Model names must not be empty");
        }
        if !(0.0..=2.0).contains(&self.completion_options.temperature) {
            bail!("Temperature must be between 0 and 2");
        }
        Ok(())
    }

    /// Clients for the main model and the safety model. The safety
    /// model reuses the main client when both share an endpoint and key.
    fn completers(&self) -> (SharedCompleter, SharedCompleter) {
        let client: SharedCompleter = Arc::new(OpenAiClient::new(
            &self.openai_api_base,
            &self.openai_api_key,
            self.request_timeout,
        ));

        let safety_client: SharedCompleter = if self.safety_api_base == self.openai_api_base
            && self.safety_api_key == self.openai_api_key
        {
            Arc::clone(&client)
        } else {
            Arc::new(OpenAiClient::new(
                &self.safety_api_base,
                &self.safety_api_key,
                self.request_timeout,
            ))
        };

        (client, safety_client)
    }

    pub fn safety_classifier(&self) -> SafetyClassifier {
        let (_, safety_client) = self.completers();
        SafetyClassifier::new(safety_client, &self.safety_model)
    }

    /// Builds the chat pipeline with a fresh, empty session store.
    pub fn pipeline(&self) -> FilteringPipeline {
        let (client, safety_client) = self.completers();
        let classifier = SafetyClassifier::new(safety_client, &self.safety_model);

        FilteringPipeline::builder(client, &self.openai_model, classifier)
            .options(self.completion_options)
            .system_message(self.system_message.clone())
            .fail_policy(self.fail_policy)
            .sessions(SessionStore::with_history_limit(self.history_limit))
            .build()
    }
}
