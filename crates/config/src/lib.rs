pub mod models;

pub use models::{
    AppConfig, LogLevel, ObservabilityConfig, OutputFormat, ServerConfig, WorkerConfig,
};
