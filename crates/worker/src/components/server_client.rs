use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};
use tracker_domain::{InstanceStatusReport, WorkerHeartbeat};
use tracker_errors::{TrackerError, TrackerResult};

/// 与调度服务端的出站通信
#[async_trait]
pub trait ServerClient: Send + Sync {
    async fn report_instance_status(&self, report: InstanceStatusReport) -> TrackerResult<()>;

    async fn report_worker_heartbeat(&self, heartbeat: WorkerHeartbeat) -> TrackerResult<()>;
}

pub struct HttpServerClient {
    server_url: Option<String>,
    http_client: reqwest::Client,
}

impl HttpServerClient {
    pub fn new(server_url: Option<String>, request_timeout: Duration) -> TrackerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TrackerError::network(format!("Failed to build http client: {e}")))?;
        Ok(Self {
            server_url,
            http_client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.server_url.is_some()
    }

    async fn post<B: serde::Serialize + Sync>(&self, url: &str, body: &B) -> TrackerResult<()> {
        match self.http_client.post(url).json(body).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    Ok(())
                } else {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    Err(TrackerError::network(format!(
                        "Server responded HTTP {status} - {body}"
                    )))
                }
            }
            Err(e) => Err(TrackerError::network(format!("Server connection error: {e}"))),
        }
    }
}

#[async_trait]
impl ServerClient for HttpServerClient {
    async fn report_instance_status(&self, report: InstanceStatusReport) -> TrackerResult<()> {
        let Some(ref server_url) = self.server_url else {
            debug!(
                "No server URL configured, skipping status report of instance {}",
                report.instance_id
            );
            return Ok(());
        };

        let url = format!("{server_url}/server/reportInstanceStatus");
        match self.post(&url, &report).await {
            Ok(()) => {
                info!(
                    "Reported instance {} status {} to server",
                    report.instance_id, report.status
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to report instance {} status: {}",
                    report.instance_id, e
                );
                Err(e)
            }
        }
    }

    async fn report_worker_heartbeat(&self, heartbeat: WorkerHeartbeat) -> TrackerResult<()> {
        let Some(ref server_url) = self.server_url else {
            debug!("No server URL configured, skipping heartbeat");
            return Ok(());
        };

        let url = format!("{server_url}/server/workerHeartbeat");
        self.post(&url, &heartbeat).await?;
        debug!(
            "Heartbeat sent for worker {} (light={}, heavy={}, overload={})",
            heartbeat.worker_address,
            heartbeat.light_task_tracker_num,
            heartbeat.heavy_task_tracker_num,
            heartbeat.overload
        );
        Ok(())
    }
}
