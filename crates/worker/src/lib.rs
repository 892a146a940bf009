//! Worker 侧任务追踪子系统：请求路由、追踪器注册表、轻量级与重量级追踪器以及健康上报。

pub mod components;
pub mod processor;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod tracker;

pub use components::{
    HttpProcessorTrackerClient, HttpServerClient, ProcessorTrackerClient, ServerClient,
    WorkerHealthReporter,
};
pub use processor::{BasicProcessor, ProcessResult, ProcessorRegistry, TaskContext};
pub use registry::{Installed, TrackerRegistry};
pub use router::{Responder, TaskTrackerRouter};
pub use runtime::{WorkerRuntime, WorkerRuntimeBuilder};
pub use tracker::{HeavyTaskTracker, LightTaskTracker, TaskTracker};
