pub mod models;
pub mod pipeline;
pub mod store;

pub use models::Turn;
pub use pipeline::{ChatError, ChatOutcome, FailPolicy, FilteringPipeline, PipelineBuilder};
pub use store::SessionStore;
