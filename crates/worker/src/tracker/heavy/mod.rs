mod state;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracker_domain::{
    InstanceDetail, ProcessorReportTaskStatusReq, ProcessorTrackerStatusReportReq,
    ServerScheduleJobReq, TaskRecord, TaskStatus, TaskTrackerStopInstanceReq, TimeExpressionType,
};
use tracker_errors::TrackerResult;

use self::state::{Effect, HeavyTrackerSettings, HeavyTrackerState};
use super::TaskTracker;
use crate::runtime::WorkerRuntime;

/// 重量级任务追踪器：把子任务分发到远端 ProcessorTracker 并汇总状态。
///
/// 所有状态变更都在 `state` 锁内同步完成，网络调用以副作用形式在锁外派生执行。
pub struct HeavyTaskTracker {
    instance_id: i64,
    time_expression_type: TimeExpressionType,
    period: Option<Duration>,
    state: Mutex<HeavyTrackerState>,
    runtime: Arc<WorkerRuntime>,
    sub_instance_done: Arc<Notify>,
    shutdown_tx: broadcast::Sender<()>,
    self_ref: Weak<Self>,
}

impl HeavyTaskTracker {
    /// 仅构造，不访问注册表，供 `atomic_create` 的工厂函数使用
    pub fn create(req: ServerScheduleJobReq, runtime: Arc<WorkerRuntime>) -> Arc<Self> {
        let settings = HeavyTrackerSettings {
            worker_address: runtime.config.worker_address.clone(),
            processor_tracker_timeout: Duration::from_millis(
                runtime.config.processor_tracker_timeout_ms,
            ),
            max_appended_wf_context_length: runtime.config.max_appended_wf_context_length,
        };
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new_cyclic(|self_ref| Self {
            instance_id: req.instance_id,
            time_expression_type: req.time_expression_type,
            period: req.period_ms().map(Duration::from_millis),
            state: Mutex::new(HeavyTrackerState::new(req, settings, Instant::now())),
            runtime,
            sub_instance_done: Arc::new(Notify::new()),
            shutdown_tx,
            self_ref: self_ref.clone(),
        })
    }

    /// 派发首个子实例并启动后台存活检测与周期调度
    pub async fn start(&self) {
        let shutdown_rx = self.shutdown_tx.subscribe();
        let effects = {
            let mut state = self.state.lock().await;
            state.start(Instant::now())
        };
        info!(
            "Heavy task tracker started instance {} ({:?})",
            self.instance_id, self.time_expression_type
        );
        self.apply(effects);

        let liveness_every = Duration::from_millis(self.runtime.config.liveness_check_interval_ms);
        tokio::spawn(Self::run_background(
            self.self_ref.clone(),
            shutdown_rx,
            liveness_every,
            self.time_expression_type,
            self.period,
            Arc::clone(&self.sub_instance_done),
        ));
    }

    pub async fn submit_task(&self, tasks: Vec<TaskRecord>) -> TrackerResult<()> {
        let mut effects = Vec::new();
        let submitted = {
            let mut state = self.state.lock().await;
            state.submit_tasks(tasks, Instant::now(), &mut effects)
        };
        self.apply(effects);
        submitted
    }

    /// 合并上下文、广播派发与状态更新在同一次加锁内完成
    pub async fn process_report(&self, req: ProcessorReportTaskStatusReq) {
        let effects = {
            let mut state = self.state.lock().await;
            state.process_report(req, Instant::now())
        };
        self.apply(effects);
    }

    pub async fn update_task_status(
        &self,
        sub_instance_id: i64,
        task_id: &str,
        status: TaskStatus,
        report_time: i64,
        result: Option<String>,
    ) {
        let effects = {
            let mut state = self.state.lock().await;
            state.update_task_status(
                sub_instance_id,
                task_id,
                status,
                report_time,
                result,
                Instant::now(),
            )
        };
        self.apply(effects);
    }

    pub async fn broadcast(
        &self,
        success: bool,
        sub_instance_id: i64,
        task_id: &str,
        result: Option<String>,
    ) {
        let effects = {
            let mut state = self.state.lock().await;
            state.broadcast(success, sub_instance_id, task_id, result, Instant::now())
        };
        self.apply(effects);
    }

    pub async fn update_appended_wf_context(&self, appended: HashMap<String, String>) {
        let mut state = self.state.lock().await;
        state.merge_wf_context(appended);
    }

    pub async fn receive_processor_tracker_heartbeat(&self, req: &ProcessorTrackerStatusReportReq) {
        let mut state = self.state.lock().await;
        state.receive_heartbeat(&req.address, req.remain_task_num, Instant::now());
    }

    pub async fn check_liveness(&self) {
        let effects = {
            let mut state = self.state.lock().await;
            state.check_liveness(Instant::now())
        };
        self.apply(effects);
    }

    async fn launch_sub_instance(&self) {
        let effects = {
            let mut state = self.state.lock().await;
            state.launch_sub_instance(Instant::now())
        };
        self.apply(effects);
    }

    async fn is_terminal(&self) -> bool {
        self.state.lock().await.status().is_terminal()
    }

    async fn run_background(
        tracker: Weak<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
        liveness_every: Duration,
        time_expression_type: TimeExpressionType,
        period: Option<Duration>,
        sub_instance_done: Arc<Notify>,
    ) {
        let mut liveness = interval_at(Instant::now() + liveness_every, liveness_every);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut rate = match (time_expression_type, period) {
            (TimeExpressionType::FixedRate, Some(period)) => {
                let mut rate = interval_at(Instant::now() + period, period);
                rate.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Some(rate)
            }
            _ => None,
        };
        let delay = match time_expression_type {
            TimeExpressionType::FixedDelay => period,
            _ => None,
        };
        let mut next_delayed_launch: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = liveness.tick() => {
                    let Some(tracker) = tracker.upgrade() else { break };
                    tracker.check_liveness().await;
                    if tracker.is_terminal().await {
                        break;
                    }
                }
                _ = tick_optional(rate.as_mut()) => {
                    let Some(tracker) = tracker.upgrade() else { break };
                    tracker.launch_sub_instance().await;
                }
                _ = sub_instance_done.notified(), if delay.is_some() => {
                    if let Some(delay) = delay {
                        next_delayed_launch = Some(Instant::now() + delay);
                    }
                }
                _ = sleep_until_optional(next_delayed_launch) => {
                    next_delayed_launch = None;
                    let Some(tracker) = tracker.upgrade() else { break };
                    tracker.launch_sub_instance().await;
                }
            }
        }
        debug!("Background loop of heavy task tracker exited");
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Dispatch { address, request } => {
                    let client = Arc::clone(&self.runtime.processor_tracker_client);
                    let timeout = Duration::from_millis(self.runtime.config.dispatch_timeout_ms);
                    tokio::spawn(async move {
                        let task_id = request.task_id.clone();
                        match tokio::time::timeout(timeout, client.start_task(&address, request))
                            .await
                        {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                warn!("Dispatch task {} to {} failed: {}", task_id, address, e)
                            }
                            Err(_) => warn!("Dispatch task {} to {} timeout", task_id, address),
                        }
                    });
                }
                Effect::StopProcessorTrackers { addresses } => {
                    for address in addresses {
                        let client = Arc::clone(&self.runtime.processor_tracker_client);
                        let request = TaskTrackerStopInstanceReq {
                            instance_id: self.instance_id,
                            task_tracker_address: self.runtime.config.worker_address.clone(),
                        };
                        tokio::spawn(async move {
                            if let Err(e) = client.stop_instance(&address, request).await {
                                debug!("Stop request to {} failed: {}", address, e);
                            }
                        });
                    }
                }
                Effect::SubInstanceCompleted { sub_instance_id } => {
                    debug!(
                        "Sub instance {} of instance {} completed",
                        sub_instance_id, self.instance_id
                    );
                    self.sub_instance_done.notify_one();
                }
                Effect::Terminated(report) => {
                    if let Some(this) = self.self_ref.upgrade() {
                        self.runtime
                            .heavy_trackers
                            .remove_if_same(self.instance_id, &this);
                    }
                    let _ = self.shutdown_tx.send(());

                    let server_client = Arc::clone(&self.runtime.server_client);
                    tokio::spawn(async move {
                        if let Err(e) = server_client.report_instance_status(report).await {
                            debug!("Status report dropped: {}", e);
                        }
                    });
                }
            }
        }
    }
}

#[async_trait]
impl TaskTracker for HeavyTaskTracker {
    fn instance_id(&self) -> i64 {
        self.instance_id
    }

    async fn fetch_running_status(&self) -> InstanceDetail {
        self.state.lock().await.snapshot(Instant::now())
    }

    async fn stop_task(&self) {
        let effects = {
            let mut state = self.state.lock().await;
            state.stop()
        };
        if effects.is_empty() {
            debug!("Instance {} already finished, ignore stop", self.instance_id);
        }
        self.apply(effects);
    }
}

async fn tick_optional(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn sleep_until_optional(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
