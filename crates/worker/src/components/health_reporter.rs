use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracker_domain::WorkerHeartbeat;
use tracker_errors::TrackerResult;

use crate::runtime::WorkerRuntime;

/// 周期性向服务端上报 Worker 负载，只读访问追踪器注册表
pub struct WorkerHealthReporter {
    runtime: Arc<WorkerRuntime>,
    report_interval: Duration,
}

impl WorkerHealthReporter {
    pub fn new(runtime: Arc<WorkerRuntime>) -> Self {
        let report_interval = Duration::from_secs(runtime.config.health_report_interval_secs);
        Self {
            runtime,
            report_interval,
        }
    }

    pub fn build_heartbeat(&self) -> WorkerHeartbeat {
        let config = &self.runtime.config;
        let light = self.runtime.light_trackers.current_size();
        let heavy = self.runtime.heavy_trackers.current_size();
        WorkerHeartbeat {
            worker_address: config.worker_address.clone(),
            app_name: config.app_name.clone(),
            heartbeat_time: Utc::now(),
            light_task_tracker_num: light,
            heavy_task_tracker_num: heavy,
            overload: self.runtime.is_overload(),
        }
    }

    pub async fn report_once(&self) -> TrackerResult<()> {
        let heartbeat = self.build_heartbeat();
        if heartbeat.overload {
            warn!(
                "Worker {} is overload: light={}, heavy={}",
                heartbeat.worker_address,
                heartbeat.light_task_tracker_num,
                heartbeat.heavy_task_tracker_num
            );
        }
        self.runtime
            .server_client
            .report_worker_heartbeat(heartbeat)
            .await
    }

    pub fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let mut ticker = interval(self.report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.report_once().await {
                            error!("Failed to send worker heartbeat: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Health reporter shutting down");
                        break;
                    }
                }
            }
        })
    }
}
