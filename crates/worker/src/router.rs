use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use tracker_domain::{
    AskResponse, ProcessorMapTaskRequest, ProcessorReportTaskStatusReq,
    ProcessorTrackerStatusReportReq, ServerQueryInstanceStatusReq, ServerScheduleJobReq,
    ServerStopInstanceReq, TaskRecord, TrackerKind, TrackerRequest,
};
use tracker_errors::{TrackerError, TrackerResult};

use crate::registry::Installed;
use crate::runtime::WorkerRuntime;
use crate::tracker::{HeavyTaskTracker, LightTaskTracker, TaskTracker};

/// 请求方的应答通道，丢弃即表示不应答
pub struct Responder {
    tx: Option<oneshot::Sender<AskResponse>>,
}

impl Responder {
    pub fn new(tx: oneshot::Sender<AskResponse>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, oneshot::Receiver<AskResponse>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    pub fn reply(self, response: AskResponse) {
        if let Some(tx) = self.tx {
            if tx.send(response).is_err() {
                debug!("Requester is gone, response dropped");
            }
        }
    }
}

/// 按请求类型分发到任务追踪器。
///
/// 不同实例的请求可以并发进入，同一实例由追踪器内部的锁串行化。
pub struct TaskTrackerRouter {
    runtime: Arc<WorkerRuntime>,
}

impl TaskTrackerRouter {
    pub fn new(runtime: Arc<WorkerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<WorkerRuntime> {
        &self.runtime
    }

    /// 解码失败的请求记录后丢弃
    pub async fn dispatch_raw(&self, payload: Value, responder: Responder) {
        match serde_json::from_value::<TrackerRequest>(payload) {
            Ok(request) => self.dispatch(request, responder).await,
            Err(e) => warn!("receive unknown request: {}", e),
        }
    }

    pub async fn dispatch(&self, request: TrackerRequest, responder: Responder) {
        debug!(
            "Route {} for instance {}",
            request.message_type_str(),
            request.instance_id()
        );
        match request {
            TrackerRequest::ServerScheduleJob(req) => self.on_server_schedule_job(req).await,
            TrackerRequest::ProcessorReportTaskStatus(req) => {
                self.on_processor_report_task_status(req, responder).await
            }
            TrackerRequest::ProcessorMapTask(req) => {
                self.on_processor_map_task(req, responder).await
            }
            TrackerRequest::ProcessorTrackerStatusReport(req) => {
                self.on_processor_tracker_status_report(req).await
            }
            TrackerRequest::ServerStopInstance(req) => self.on_server_stop_instance(req).await,
            TrackerRequest::ServerQueryInstanceStatus(req) => {
                self.on_server_query_instance_status(req, responder).await
            }
        }
    }

    async fn on_server_schedule_job(&self, req: ServerScheduleJobReq) {
        let instance_id = req.instance_id;
        let kind = TrackerKind::classify(req.execute_type, req.time_expression_type);

        if self.runtime.heavy_trackers.get(instance_id).is_some()
            || self.runtime.light_trackers.get(instance_id).is_some()
        {
            warn!(
                "{}, ignore duplicate schedule request",
                TrackerError::DuplicateTracker { instance_id }
            );
            return;
        }

        if let Err(e) = self.check_admission(kind) {
            counter!("task_tracker_rejected_total", "kind" => kind.as_str()).increment(1);
            warn!("Reject schedule request of instance {}: {}", instance_id, e);
            return;
        }

        let runtime = Arc::clone(&self.runtime);
        match kind {
            TrackerKind::Light => {
                match self
                    .runtime
                    .light_trackers
                    .atomic_create(instance_id, |_| LightTaskTracker::create(req, runtime))
                {
                    Installed::Created(tracker) => tracker.start().await,
                    Installed::Existing(_) => warn!(
                        "{}, lost the creation race",
                        TrackerError::DuplicateTracker { instance_id }
                    ),
                }
            }
            TrackerKind::Heavy => {
                match self
                    .runtime
                    .heavy_trackers
                    .atomic_create(instance_id, |_| HeavyTaskTracker::create(req, runtime))
                {
                    Installed::Created(tracker) => tracker.start().await,
                    Installed::Existing(_) => warn!(
                        "{}, lost the creation race",
                        TrackerError::DuplicateTracker { instance_id }
                    ),
                }
            }
        }
    }

    fn check_admission(&self, kind: TrackerKind) -> TrackerResult<()> {
        let config = &self.runtime.config;
        match kind {
            TrackerKind::Light => {
                let current = self.runtime.light_trackers.current_size();
                let limit = config.lightweight_overload_limit();
                if current >= limit {
                    return Err(TrackerError::Overload {
                        kind: kind.as_str(),
                        current,
                        limit,
                    });
                }
                if current >= config.max_lightweight_task_num {
                    warn!(
                        "Light task tracker num {} reaches {}, worker is busy",
                        current, config.max_lightweight_task_num
                    );
                }
            }
            TrackerKind::Heavy => {
                let current = self.runtime.heavy_trackers.current_size();
                let limit = config.max_heavyweight_task_num;
                if current >= limit {
                    return Err(TrackerError::Overload {
                        kind: kind.as_str(),
                        current,
                        limit,
                    });
                }
            }
        }
        Ok(())
    }

    async fn on_processor_report_task_status(
        &self,
        req: ProcessorReportTaskStatusReq,
        responder: Responder,
    ) {
        // 终态上报先应答，请求方不需要等待处理结果
        if req.status.is_finished() {
            responder.reply(AskResponse::of(true));
        }

        let Some(tracker) = self.runtime.heavy_trackers.get(req.instance_id) else {
            warn!(
                "{}, ignore report of task {}",
                TrackerError::tracker_not_found(req.instance_id),
                req.task_id
            );
            return;
        };

        tracker.process_report(req).await;
    }

    async fn on_processor_map_task(&self, req: ProcessorMapTaskRequest, responder: Responder) {
        let Some(tracker) = self.runtime.heavy_trackers.get(req.instance_id) else {
            let err = TrackerError::tracker_not_found(req.instance_id);
            warn!("{}, reject map request {}", err, req.task_name);
            responder.reply(AskResponse::failed(err.user_message()));
            return;
        };

        let count = req.sub_tasks.len();
        let outcome = match req
            .sub_tasks
            .into_iter()
            .map(|sub_task| TaskRecord::from_sub_task(req.sub_instance_id, &req.task_name, sub_task))
            .collect::<TrackerResult<Vec<_>>>()
        {
            Ok(tasks) => tracker.submit_task(tasks).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                debug!(
                    "Instance {} accepted map request {} with {} tasks",
                    req.instance_id, req.task_name, count
                );
                responder.reply(AskResponse::of(true));
            }
            Err(e) => {
                warn!(
                    "Submit {} tasks of {} to instance {} failed: {}",
                    count, req.task_name, req.instance_id, e
                );
                responder.reply(AskResponse::failed(e.user_message()));
            }
        }
    }

    async fn on_processor_tracker_status_report(&self, req: ProcessorTrackerStatusReportReq) {
        let Some(tracker) = self.runtime.heavy_trackers.get(req.instance_id) else {
            debug!(
                "{}, drop heartbeat from {}",
                TrackerError::tracker_not_found(req.instance_id),
                req.address
            );
            return;
        };
        tracker.receive_processor_tracker_heartbeat(&req).await;
    }

    async fn on_server_stop_instance(&self, req: ServerStopInstanceReq) {
        if let Some(tracker) = self.runtime.heavy_trackers.get(req.instance_id) {
            tracker.stop_task().await;
        } else if let Some(tracker) = self.runtime.light_trackers.get(req.instance_id) {
            tracker.stop_task().await;
        } else {
            warn!(
                "{}, ignore stop request",
                TrackerError::tracker_not_found(req.instance_id)
            );
        }
    }

    async fn on_server_query_instance_status(
        &self,
        req: ServerQueryInstanceStatusReq,
        responder: Responder,
    ) {
        let detail = if let Some(tracker) = self.runtime.heavy_trackers.get(req.instance_id) {
            tracker.fetch_running_status().await
        } else if let Some(tracker) = self.runtime.light_trackers.get(req.instance_id) {
            tracker.fetch_running_status().await
        } else {
            let err = TrackerError::tracker_not_found(req.instance_id);
            warn!("{}, query failed", err);
            responder.reply(AskResponse::failed(err.user_message()));
            return;
        };

        match serde_json::to_value(detail) {
            Ok(data) => responder.reply(AskResponse::succeed(Some(data))),
            Err(e) => {
                let err = TrackerError::from(e);
                warn!("Serialize detail of instance {} failed: {}", req.instance_id, err);
                responder.reply(AskResponse::failed(err.user_message()));
            }
        }
    }
}
