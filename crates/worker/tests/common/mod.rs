#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracker_config::WorkerConfig;
use tracker_domain::{
    AskResponse, ExecuteType, InstanceStatusReport, ServerScheduleJobReq, TaskTrackerStartTaskReq,
    TaskTrackerStopInstanceReq, TimeExpressionType, TrackerRequest, WorkerHeartbeat,
};
use tracker_errors::{TrackerError, TrackerResult};
use tracker_worker::{
    BasicProcessor, ProcessResult, ProcessorRegistry, ProcessorTrackerClient, Responder,
    ServerClient, TaskContext, TaskTrackerRouter, WorkerRuntime,
};

pub const LOCAL_ADDRESS: &str = "127.0.0.1:27777";

#[derive(Default)]
pub struct RecordingServerClient {
    pub reports: Mutex<Vec<InstanceStatusReport>>,
    pub heartbeats: Mutex<Vec<WorkerHeartbeat>>,
    pub fail: bool,
}

impl RecordingServerClient {
    pub fn reports(&self) -> Vec<InstanceStatusReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn heartbeats(&self) -> Vec<WorkerHeartbeat> {
        self.heartbeats.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServerClient for RecordingServerClient {
    async fn report_instance_status(&self, report: InstanceStatusReport) -> TrackerResult<()> {
        self.reports.lock().unwrap().push(report);
        Ok(())
    }

    async fn report_worker_heartbeat(&self, heartbeat: WorkerHeartbeat) -> TrackerResult<()> {
        if self.fail {
            return Err(TrackerError::network("server unavailable"));
        }
        self.heartbeats.lock().unwrap().push(heartbeat);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingProcessorTrackerClient {
    pub dispatched: Mutex<Vec<(String, TaskTrackerStartTaskReq)>>,
    pub stopped: Mutex<Vec<(String, i64)>>,
}

impl RecordingProcessorTrackerClient {
    /// (address, sub_instance_id, task_id)
    pub fn dispatched(&self) -> Vec<(String, i64, String)> {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .map(|(address, req)| (address.clone(), req.sub_instance_id, req.task_id.clone()))
            .collect()
    }

    pub fn stopped(&self) -> Vec<(String, i64)> {
        self.stopped.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessorTrackerClient for RecordingProcessorTrackerClient {
    async fn start_task(&self, address: &str, request: TaskTrackerStartTaskReq) -> TrackerResult<()> {
        self.dispatched
            .lock()
            .unwrap()
            .push((address.to_string(), request));
        Ok(())
    }

    async fn stop_instance(
        &self,
        address: &str,
        request: TaskTrackerStopInstanceReq,
    ) -> TrackerResult<()> {
        self.stopped
            .lock()
            .unwrap()
            .push((address.to_string(), request.instance_id));
        Ok(())
    }
}

/// 立即返回成功
pub struct EchoProcessor;

#[async_trait]
impl BasicProcessor for EchoProcessor {
    async fn process(&self, ctx: TaskContext) -> TrackerResult<ProcessResult> {
        Ok(ProcessResult::success(format!(
            "echo {}",
            ctx.job_params.unwrap_or_default()
        )))
    }
}

/// 立即返回失败
pub struct FailingProcessor;

#[async_trait]
impl BasicProcessor for FailingProcessor {
    async fn process(&self, _ctx: TaskContext) -> TrackerResult<ProcessResult> {
        Ok(ProcessResult::failed("boom"))
    }
}

/// 永不结束，只能被停止或超时
pub struct PendingProcessor;

#[async_trait]
impl BasicProcessor for PendingProcessor {
    async fn process(&self, _ctx: TaskContext) -> TrackerResult<ProcessResult> {
        std::future::pending::<()>().await;
        Ok(ProcessResult::success("unreachable"))
    }
}

/// 处理过程中 panic
pub struct PanickingProcessor;

#[async_trait]
impl BasicProcessor for PanickingProcessor {
    async fn process(&self, _ctx: TaskContext) -> TrackerResult<ProcessResult> {
        panic!("kaboom");
    }
}

pub struct TestHarness {
    pub runtime: Arc<WorkerRuntime>,
    pub router: Arc<TaskTrackerRouter>,
    pub server: Arc<RecordingServerClient>,
    pub processor_trackers: Arc<RecordingProcessorTrackerClient>,
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        worker_address: LOCAL_ADDRESS.to_string(),
        processor_tracker_timeout_ms: 1_000,
        liveness_check_interval_ms: 200,
        ..WorkerConfig::default()
    }
}

pub async fn harness(config: WorkerConfig) -> TestHarness {
    let processors = Arc::new(ProcessorRegistry::new());
    processors.register("echo", Arc::new(EchoProcessor)).await;
    processors.register("failing", Arc::new(FailingProcessor)).await;
    processors.register("pending", Arc::new(PendingProcessor)).await;
    processors.register("panicking", Arc::new(PanickingProcessor)).await;

    let server = Arc::new(RecordingServerClient::default());
    let processor_trackers = Arc::new(RecordingProcessorTrackerClient::default());
    let runtime = WorkerRuntime::builder(config)
        .processors(processors)
        .server_client(server.clone())
        .processor_tracker_client(processor_trackers.clone())
        .build()
        .unwrap();

    TestHarness {
        router: Arc::new(TaskTrackerRouter::new(Arc::clone(&runtime))),
        runtime,
        server,
        processor_trackers,
    }
}

pub fn schedule_req(
    instance_id: i64,
    execute_type: ExecuteType,
    time_expression_type: TimeExpressionType,
    workers: &[&str],
) -> ServerScheduleJobReq {
    ServerScheduleJobReq {
        instance_id,
        job_id: 1,
        wf_instance_id: None,
        execute_type,
        time_expression_type,
        time_expression: None,
        processor_info: "echo".to_string(),
        job_params: Some("hello".to_string()),
        instance_params: None,
        task_retry_num: 0,
        instance_timeout_ms: 0,
        all_worker_address: workers.iter().map(|w| w.to_string()).collect(),
    }
}

impl TestHarness {
    pub async fn send(&self, request: TrackerRequest) {
        self.router.dispatch(request, Responder::none()).await;
    }

    /// 返回 None 表示路由没有应答
    pub async fn ask(&self, request: TrackerRequest) -> Option<AskResponse> {
        let (responder, rx) = Responder::channel();
        self.router.dispatch(request, responder).await;
        rx.await.ok()
    }

    pub async fn schedule(&self, req: ServerScheduleJobReq) {
        self.send(TrackerRequest::ServerScheduleJob(req)).await;
        settle().await;
    }
}

/// 让派生出的副作用任务运行完，不推进时钟
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}
