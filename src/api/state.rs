use crate::chat::FilteringPipeline;
use crate::core::AppConfig;

pub struct AppState {
    pub config: AppConfig,
    // Owns the session store for the lifetime of the server
    pub pipeline: FilteringPipeline,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let pipeline = config.pipeline();
        Self { config, pipeline }
    }
}
