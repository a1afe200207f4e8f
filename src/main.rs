use anyhow::Result;
use balrog::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
