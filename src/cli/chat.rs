use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use uuid::Uuid;

use crate::chat::{ChatError, ChatOutcome};
use crate::core::AppConfig;

pub async fn run(config: AppConfig) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    // Same pipeline as the server, with a single local session
    let pipeline = config.pipeline();
    let session_id = Uuid::new_v4().to_string();

    println!(
        "Chatting with {} (safety model: {}). Type /clear to reset, Ctrl-D to quit.",
        pipeline.model(),
        pipeline.safety_model()
    );

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = rl.add_history_entry(line) {
                    tracing::debug!("Failed to record REPL history: {}", e);
                }

                if line == "/clear" {
                    pipeline.sessions().clear(&session_id);
                    println!("Conversation cleared");
                    continue;
                }

                match pipeline.handle(&session_id, line).await {
                    Ok(ChatOutcome::Accepted { message, .. }) => println!("{}", message),
                    Ok(ChatOutcome::InputFiltered { classification }) => {
                        println!("[blocked] Content filtered by safety model: {}", classification)
                    }
                    Ok(ChatOutcome::OutputFiltered { classification }) => {
                        println!("[blocked] Response filtered by safety model: {}", classification)
                    }
                    Err(ChatError::EmptyMessage) => continue,
                    Err(e) => println!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
