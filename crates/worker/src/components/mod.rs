pub mod health_reporter;
pub mod processor_tracker_client;
pub mod server_client;

pub use health_reporter::WorkerHealthReporter;
pub use processor_tracker_client::{HttpProcessorTrackerClient, ProcessorTrackerClient};
pub use server_client::{HttpServerClient, ServerClient};
