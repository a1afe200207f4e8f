use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

pub mod chat;
pub mod classify;
pub mod serve;

use crate::chat::FailPolicy;
use crate::core::{AppConfig, LogLevel, logging};
use crate::openai::CompletionOptions;

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Run the API server (default)
    Serve {},
    /// Start an interactive chat session in the terminal
    Chat {},
    /// Ask the safety model about a single piece of text
    Classify {
        text: String,
        /// Check the text as a model response instead of user input
        #[arg(long, action, default_value = "false")]
        output: bool,
    },
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// API endpoint URL for the LLM (e.g. https://api.openai.com/v1)
    #[arg(long, env = "BALROG_API")]
    api: String,

    /// Model name to use (e.g. gpt-4o-mini)
    #[arg(long, env = "BALROG_MODEL")]
    model: String,

    /// API key for authentication
    #[arg(long, env = "BALROG_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Safety model name (e.g. meta-llama/Llama-Guard-7b)
    #[arg(long, env = "BALROG_SAFETY_MODEL")]
    safety_model: String,

    /// API endpoint URL for the safety model [default: --api]
    #[arg(long, env = "BALROG_SAFETY_API")]
    safety_api: Option<String>,

    /// API key for the safety model [default: --api-key]
    #[arg(long, env = "BALROG_SAFETY_API_KEY", hide_env_values = true)]
    safety_api_key: Option<String>,

    /// Set the server host address
    #[arg(long, env = "BALROG_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to host the web interface on
    #[arg(long, env = "BALROG_PORT", default_value = "5000")]
    port: u16,

    /// System message sent before the conversation
    #[arg(long, env = "BALROG_SYSTEM_MESSAGE")]
    system_message: Option<String>,

    /// Number of turns kept per session (0 keeps everything)
    #[arg(long, env = "BALROG_HISTORY_LIMIT", default_value = "20")]
    history_limit: usize,

    /// Timeout in seconds for each outbound model request
    #[arg(long, env = "BALROG_TIMEOUT_SECS", default_value = "60")]
    timeout: u64,

    #[arg(long, default_value = "1000")]
    max_tokens: u32,

    #[arg(long, default_value = "0.7")]
    temperature: f32,

    /// Block content when the safety model can't be reached instead
    /// of allowing it
    #[arg(long, env = "BALROG_FAIL_CLOSED", action, default_value = "false")]
    fail_closed: bool,

    /// Directory of static files to serve for non-API paths
    #[arg(long, env = "BALROG_STATIC_DIR")]
    static_dir: Option<String>,

    #[arg(long, env = "BALROG_LOG_LEVEL", value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Shorthand for --log-level debug
    #[arg(long, action, default_value = "false")]
    debug: bool,
}

impl ConfigArgs {
    fn into_config(self) -> AppConfig {
        let safety_api_base = self.safety_api.unwrap_or_else(|| self.api.clone());
        let safety_api_key = self.safety_api_key.unwrap_or_else(|| self.api_key.clone());

        AppConfig {
            host: self.host,
            port: self.port,
            openai_api_base: self.api,
            openai_api_key: self.api_key,
            openai_model: self.model,
            safety_api_base,
            safety_api_key,
            safety_model: self.safety_model,
            system_message: self.system_message,
            history_limit: self.history_limit,
            request_timeout: Duration::from_secs(self.timeout),
            completion_options: CompletionOptions {
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
            fail_policy: if self.fail_closed {
                FailPolicy::Closed
            } else {
                FailPolicy::Open
            },
            static_dir: self.static_dir,
            log_level: if self.debug {
                LogLevel::Debug
            } else {
                self.log_level
            },
        }
    }
}

#[derive(Parser)]
#[command(author, version, about = "Balrog - LLM chat interface with safety model filtering", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    let config = args.config.into_config();

    logging::init(config.log_level);

    config
        .validate()
        .inspect_err(|e| tracing::error!("Invalid configuration: {}", e))?;

    // Handle each sub command
    match args.command.unwrap_or(Command::Serve {}) {
        Command::Serve {} => {
            serve::run(config).await?;
        }
        Command::Chat {} => {
            chat::run(config).await?;
        }
        Command::Classify { text, output } => {
            classify::run(config, &text, output).await?;
        }
    }

    Ok(())
}
