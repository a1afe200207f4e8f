use anyhow::Result;

use crate::core::AppConfig;
use crate::safety::{Classification, ContentKind};

/// Prints the safety model's verdict for `text`. Classifier errors are
/// returned as is, the fail policy only applies to chat turns.
pub async fn run(config: AppConfig, text: &str, output: bool) -> Result<()> {
    let kind = if output {
        ContentKind::Output
    } else {
        ContentKind::Input
    };
    let classifier = config.safety_classifier();

    match classifier.classify(text, kind).await? {
        Classification::Safe => println!("safe"),
        unsafe_content => println!("unsafe: {}", unsafe_content.label()),
    }

    Ok(())
}
