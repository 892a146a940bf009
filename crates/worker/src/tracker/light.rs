use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracker_domain::{
    InstanceDetail, InstanceStatus, InstanceStatusReport, ServerScheduleJobReq, TaskDetail,
};
use tracker_errors::TrackerError;

use super::TaskTracker;
use crate::processor::{ProcessResult, TaskContext};
use crate::runtime::WorkerRuntime;

struct LightState {
    status: InstanceStatus,
    finished_time: Option<DateTime<Utc>>,
    result: Option<String>,
    handle: Option<JoinHandle<()>>,
}

/// 单机、单次执行的任务实例，在本 Worker 上直接调用处理器
pub struct LightTaskTracker {
    req: ServerScheduleJobReq,
    runtime: Arc<WorkerRuntime>,
    actual_trigger_time: DateTime<Utc>,
    state: Mutex<LightState>,
    self_ref: Weak<Self>,
}

impl LightTaskTracker {
    /// 仅构造，不访问注册表，供 `atomic_create` 的工厂函数使用
    pub fn create(req: ServerScheduleJobReq, runtime: Arc<WorkerRuntime>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            req,
            runtime,
            actual_trigger_time: Utc::now(),
            state: Mutex::new(LightState {
                status: InstanceStatus::Created,
                finished_time: None,
                result: None,
                handle: None,
            }),
            self_ref: self_ref.clone(),
        })
    }

    pub async fn start(&self) {
        let Some(this) = self.self_ref.upgrade() else {
            return;
        };

        let mut state = self.state.lock().await;
        if state.status != InstanceStatus::Created {
            return;
        }
        state.status = InstanceStatus::Running;
        info!(
            "Light task tracker start instance {} with processor {}",
            self.req.instance_id, self.req.processor_info
        );
        state.handle = Some(tokio::spawn(async move {
            let (success, result) = this.run_processor().await;
            let status = if success {
                InstanceStatus::Finished
            } else {
                InstanceStatus::Failed
            };
            this.finish(status, result).await;
        }));
    }

    async fn run_processor(&self) -> (bool, Option<String>) {
        let Some(processor) = self.runtime.processors.get(&self.req.processor_info).await else {
            let err = TrackerError::processor_not_found(self.req.processor_info.clone());
            warn!("Instance {} failed: {}", self.req.instance_id, err);
            return (false, Some(err.to_string()));
        };

        let ctx = TaskContext {
            instance_id: self.req.instance_id,
            job_id: self.req.job_id,
            wf_instance_id: self.req.wf_instance_id,
            job_params: self.req.job_params.clone(),
            instance_params: self.req.instance_params.clone(),
        };

        // 处理器由用户实现，panic 也要让实例进入终态
        let run = AssertUnwindSafe(processor.process(ctx)).catch_unwind();
        let outcome = if self.req.instance_timeout_ms > 0 {
            match tokio::time::timeout(Duration::from_millis(self.req.instance_timeout_ms), run)
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        "Instance {} timeout after {}ms",
                        self.req.instance_id, self.req.instance_timeout_ms
                    );
                    return (false, Some("instance timeout".to_string()));
                }
            }
        } else {
            run.await
        };

        match outcome {
            Ok(Ok(ProcessResult { success, msg })) => (success, msg),
            Ok(Err(e)) => {
                error!("Processor of instance {} failed: {}", self.req.instance_id, e);
                (false, Some(e.to_string()))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    "Processor of instance {} panicked: {}",
                    self.req.instance_id, message
                );
                (false, Some(format!("processor panicked: {message}")))
            }
        }
    }

    /// 进入终态后移出注册表并上报服务端，重复调用无效果
    async fn finish(&self, status: InstanceStatus, result: Option<String>) {
        {
            let mut state = self.state.lock().await;
            if state.status.is_terminal() {
                return;
            }
            state.status = status;
            state.finished_time = Some(Utc::now());
            state.result = result.clone();
            if status == InstanceStatus::Stopped {
                if let Some(handle) = state.handle.take() {
                    handle.abort();
                }
            }
        }

        if let Some(this) = self.self_ref.upgrade() {
            self.runtime
                .light_trackers
                .remove_if_same(self.req.instance_id, &this);
        }
        info!(
            "Light task tracker finished instance {} with {}",
            self.req.instance_id, status
        );

        let report = InstanceStatusReport {
            instance_id: self.req.instance_id,
            job_id: self.req.job_id,
            wf_instance_id: self.req.wf_instance_id,
            status,
            result,
            wf_context: HashMap::new(),
            source_address: self.runtime.config.worker_address.clone(),
            report_time: Utc::now(),
        };
        let server_client = Arc::clone(&self.runtime.server_client);
        tokio::spawn(async move {
            if let Err(e) = server_client.report_instance_status(report).await {
                debug!("Status report dropped: {}", e);
            }
        });
    }
}

#[async_trait]
impl TaskTracker for LightTaskTracker {
    fn instance_id(&self) -> i64 {
        self.req.instance_id
    }

    async fn fetch_running_status(&self) -> InstanceDetail {
        let state = self.state.lock().await;
        let mut task_detail = TaskDetail {
            total: 1,
            ..TaskDetail::default()
        };
        match state.status {
            InstanceStatus::Created | InstanceStatus::Dispatching => task_detail.waiting_dispatch = 1,
            InstanceStatus::Running => task_detail.running = 1,
            InstanceStatus::Finished => task_detail.succeed = 1,
            InstanceStatus::Failed | InstanceStatus::Stopped => task_detail.failed = 1,
        }

        InstanceDetail {
            instance_id: self.req.instance_id,
            status: state.status,
            actual_trigger_time: self.actual_trigger_time,
            finished_time: state.finished_time,
            result: state.result.clone(),
            task_detail,
            executors: Vec::new(),
            wf_context: HashMap::new(),
            sub_instance_details: Vec::new(),
        }
    }

    async fn stop_task(&self) {
        self.finish(InstanceStatus::Stopped, Some("stopped by server".to_string()))
            .await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
