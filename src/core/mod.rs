mod config;
pub mod logging;

pub use config::AppConfig;
pub use logging::LogLevel;
