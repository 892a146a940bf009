use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracker_domain::{TaskTrackerStartTaskReq, TaskTrackerStopInstanceReq};
use tracker_errors::{TrackerError, TrackerResult};

/// 与远端 ProcessorTracker 的出站通信
#[async_trait]
pub trait ProcessorTrackerClient: Send + Sync {
    async fn start_task(&self, address: &str, request: TaskTrackerStartTaskReq) -> TrackerResult<()>;

    async fn stop_instance(
        &self,
        address: &str,
        request: TaskTrackerStopInstanceReq,
    ) -> TrackerResult<()>;
}

pub struct HttpProcessorTrackerClient {
    http_client: reqwest::Client,
}

impl HttpProcessorTrackerClient {
    pub fn new(request_timeout: Duration) -> TrackerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TrackerError::network(format!("Failed to build http client: {e}")))?;
        Ok(Self { http_client })
    }

    async fn post<B: serde::Serialize + Sync>(&self, url: String, body: &B) -> TrackerResult<()> {
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| TrackerError::network(format!("{url}: {e}")))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TrackerError::network(format!(
                "{url}: HTTP {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl ProcessorTrackerClient for HttpProcessorTrackerClient {
    async fn start_task(&self, address: &str, request: TaskTrackerStartTaskReq) -> TrackerResult<()> {
        debug!(
            "Dispatch task {} of instance {} to {}",
            request.task_id, request.instance_id, address
        );
        self.post(format!("http://{address}/processorTracker/startTask"), &request)
            .await
    }

    async fn stop_instance(
        &self,
        address: &str,
        request: TaskTrackerStopInstanceReq,
    ) -> TrackerResult<()> {
        debug!(
            "Stop instance {} on processor tracker {}",
            request.instance_id, address
        );
        self.post(format!("http://{address}/processorTracker/stopInstance"), &request)
            .await
    }
}
