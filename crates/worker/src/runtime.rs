use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::info;
use tracker_config::{ServerConfig, WorkerConfig};
use tracker_domain::TrackerKind;
use tracker_errors::TrackerResult;

use crate::components::{
    HttpProcessorTrackerClient, HttpServerClient, ProcessorTrackerClient, ServerClient,
};
use crate::processor::ProcessorRegistry;
use crate::registry::TrackerRegistry;
use crate::tracker::{HeavyTaskTracker, LightTaskTracker, TaskTracker};

/// Worker 进程内任务追踪子系统的共享上下文
pub struct WorkerRuntime {
    pub config: WorkerConfig,
    pub light_trackers: TrackerRegistry<LightTaskTracker>,
    pub heavy_trackers: TrackerRegistry<HeavyTaskTracker>,
    pub processors: Arc<ProcessorRegistry>,
    pub server_client: Arc<dyn ServerClient>,
    pub processor_tracker_client: Arc<dyn ProcessorTrackerClient>,
}

impl WorkerRuntime {
    pub fn builder(config: WorkerConfig) -> WorkerRuntimeBuilder {
        WorkerRuntimeBuilder::new(config)
    }

    /// 任一类别达到上限即视为过载
    pub fn is_overload(&self) -> bool {
        self.light_trackers.current_size() >= self.config.max_lightweight_task_num
            || self.heavy_trackers.current_size() >= self.config.max_heavyweight_task_num
    }

    /// 停止全部存活的追踪器
    pub async fn shutdown(&self) {
        let light = self.light_trackers.all();
        let heavy = self.heavy_trackers.all();
        info!(
            "Stopping {} light and {} heavy task trackers",
            light.len(),
            heavy.len()
        );
        join_all(light.iter().map(|tracker| tracker.stop_task())).await;
        join_all(heavy.iter().map(|tracker| tracker.stop_task())).await;
    }
}

pub struct WorkerRuntimeBuilder {
    config: WorkerConfig,
    server_url: Option<String>,
    request_timeout: Duration,
    processors: Option<Arc<ProcessorRegistry>>,
    server_client: Option<Arc<dyn ServerClient>>,
    processor_tracker_client: Option<Arc<dyn ProcessorTrackerClient>>,
}

impl WorkerRuntimeBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            server_url: None,
            request_timeout: Duration::from_secs(10),
            processors: None,
            server_client: None,
            processor_tracker_client: None,
        }
    }

    /// 使用服务端配置构建默认 HTTP 客户端
    pub fn server_config(mut self, server: &ServerConfig) -> Self {
        self.server_url = server.server_url.clone();
        self.request_timeout = Duration::from_secs(server.request_timeout_seconds);
        self
    }

    pub fn processors(mut self, processors: Arc<ProcessorRegistry>) -> Self {
        self.processors = Some(processors);
        self
    }

    pub fn server_client(mut self, client: Arc<dyn ServerClient>) -> Self {
        self.server_client = Some(client);
        self
    }

    pub fn processor_tracker_client(mut self, client: Arc<dyn ProcessorTrackerClient>) -> Self {
        self.processor_tracker_client = Some(client);
        self
    }

    pub fn build(self) -> TrackerResult<Arc<WorkerRuntime>> {
        let server_client = match self.server_client {
            Some(client) => client,
            None => Arc::new(HttpServerClient::new(self.server_url, self.request_timeout)?),
        };
        let processor_tracker_client = match self.processor_tracker_client {
            Some(client) => client,
            None => Arc::new(HttpProcessorTrackerClient::new(Duration::from_millis(
                self.config.dispatch_timeout_ms,
            ))?),
        };

        Ok(Arc::new(WorkerRuntime {
            config: self.config,
            light_trackers: TrackerRegistry::new(TrackerKind::Light),
            heavy_trackers: TrackerRegistry::new(TrackerKind::Heavy),
            processors: self.processors.unwrap_or_default(),
            server_client,
            processor_tracker_client,
        }))
    }
}
