use anyhow::Result;

use crate::api;
use crate::core::AppConfig;

pub async fn run(config: AppConfig) -> Result<()> {
    api::serve(config).await
}
