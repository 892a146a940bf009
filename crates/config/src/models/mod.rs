pub mod app_config;
pub mod observability;
pub mod server;
pub mod worker;

pub use app_config::AppConfig;
pub use observability::{LogLevel, ObservabilityConfig, OutputFormat};
pub use server::ServerConfig;
pub use worker::WorkerConfig;
