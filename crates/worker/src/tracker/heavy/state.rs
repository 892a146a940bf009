use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracker_domain::{
    ExecuteType, ExecutorDetail, InstanceDetail, InstanceStatus, InstanceStatusReport,
    ProcessorReportTaskStatusReq, ReportCmd, ServerScheduleJobReq, SubInstanceDetail, TaskDetail,
    TaskRecord, TaskStatus, TaskTrackerStartTaskReq, BROADCAST_TASK_NAME, LAST_TASK_ID, ROOT_TASK_ID,
};
use tracker_errors::{TrackerError, TrackerResult};

const MAX_PENDING_REPORTS: usize = 1024;
const SUB_INSTANCE_HISTORY_SIZE: usize = 10;
const ALL_PROCESSOR_TRACKERS_DEAD: &str = "all processor trackers are dead";

/// 状态变更后需要在锁外执行的副作用
#[derive(Debug)]
pub(crate) enum Effect {
    Dispatch {
        address: String,
        request: TaskTrackerStartTaskReq,
    },
    StopProcessorTrackers {
        addresses: Vec<String>,
    },
    SubInstanceCompleted {
        sub_instance_id: i64,
    },
    Terminated(InstanceStatusReport),
}

#[derive(Debug, Clone)]
pub(crate) struct HeavyTrackerSettings {
    pub worker_address: String,
    pub processor_tracker_timeout: Duration,
    pub max_appended_wf_context_length: usize,
}

struct SubInstance {
    tasks: BTreeMap<String, TaskRecord>,
    started_at: DateTime<Utc>,
    broadcast_fanned_out: bool,
}

struct ExecutorState {
    last_active: Instant,
    remain_task_num: i64,
}

struct PendingReport {
    status: TaskStatus,
    report_time: i64,
    result: Option<String>,
}

enum Outcome {
    Complete { success: bool, result: Option<String> },
    NeedReduce,
}

/// 重量级任务实例的全部可变状态，由 `HeavyTaskTracker` 串行驱动
pub(crate) struct HeavyTrackerState {
    req: ServerScheduleJobReq,
    settings: HeavyTrackerSettings,
    status: InstanceStatus,
    actual_trigger_time: DateTime<Utc>,
    started_at: Instant,
    finished_time: Option<DateTime<Utc>>,
    result: Option<String>,
    sub_instances: BTreeMap<i64, SubInstance>,
    history: VecDeque<SubInstanceDetail>,
    next_sub_instance_id: i64,
    candidates: Vec<String>,
    cursor: usize,
    executors: HashMap<String, ExecutorState>,
    dead_executors: HashMap<String, Instant>,
    wf_context: HashMap<String, String>,
    pending_reports: HashMap<(i64, String), PendingReport>,
}

impl HeavyTrackerState {
    pub(crate) fn new(req: ServerScheduleJobReq, settings: HeavyTrackerSettings, now: Instant) -> Self {
        let mut candidates: Vec<String> = Vec::new();
        for address in &req.all_worker_address {
            if !address.is_empty() && !candidates.contains(address) {
                candidates.push(address.clone());
            }
        }
        if candidates.is_empty() {
            candidates.push(settings.worker_address.clone());
        }

        Self {
            req,
            settings,
            status: InstanceStatus::Created,
            actual_trigger_time: Utc::now(),
            started_at: now,
            finished_time: None,
            result: None,
            sub_instances: BTreeMap::new(),
            history: VecDeque::new(),
            next_sub_instance_id: 1,
            candidates,
            cursor: 0,
            executors: HashMap::new(),
            dead_executors: HashMap::new(),
            wf_context: HashMap::new(),
            pending_reports: HashMap::new(),
        }
    }

    pub(crate) fn status(&self) -> InstanceStatus {
        self.status
    }

    pub(crate) fn is_frequent(&self) -> bool {
        self.req.time_expression_type.is_frequent()
    }

    pub(crate) fn start(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.status != InstanceStatus::Created {
            return effects;
        }
        self.status = InstanceStatus::Dispatching;
        self.started_at = now;

        if self.is_frequent() && self.req.period_ms().is_none() {
            warn!(
                "Instance {} has invalid time expression {:?} for {:?}",
                self.req.instance_id, self.req.time_expression, self.req.time_expression_type
            );
            self.terminate(
                InstanceStatus::Failed,
                Some(format!(
                    "invalid time expression: {}",
                    self.req.time_expression.as_deref().unwrap_or_default()
                )),
                &mut effects,
            );
            return effects;
        }

        self.launch_sub_instance_into(now, &mut effects);
        effects
    }

    /// 新建子实例并派发根任务；非频繁任务只会在启动时调用一次
    pub(crate) fn launch_sub_instance(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.status.is_terminal() || !self.is_frequent() {
            return effects;
        }
        self.launch_sub_instance_into(now, &mut effects);
        effects
    }

    fn launch_sub_instance_into(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        let sub_instance_id = if self.is_frequent() {
            let id = self.next_sub_instance_id;
            self.next_sub_instance_id += 1;
            id
        } else {
            self.req.instance_id
        };

        let mut tasks = BTreeMap::new();
        tasks.insert(ROOT_TASK_ID.to_string(), TaskRecord::root(sub_instance_id));
        self.sub_instances.insert(
            sub_instance_id,
            SubInstance {
                tasks,
                started_at: Utc::now(),
                broadcast_fanned_out: false,
            },
        );
        debug!(
            "Launch sub instance {} for instance {}",
            sub_instance_id, self.req.instance_id
        );
        self.dispatch_task(sub_instance_id, ROOT_TASK_ID, None, now, effects);
    }

    /// 派发失败导致实例终止时，终止产生的副作用仍写入 `effects`
    pub(crate) fn submit_tasks(
        &mut self,
        tasks: Vec<TaskRecord>,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) -> TrackerResult<()> {
        if self.status.is_terminal() {
            return Err(TrackerError::InstanceFinished {
                instance_id: self.req.instance_id,
                status: self.status.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for task in &tasks {
            let sub = self.sub_instances.get(&task.sub_instance_id).ok_or_else(|| {
                TrackerError::submission_failure(format!(
                    "sub instance {} of instance {} is not running",
                    task.sub_instance_id, self.req.instance_id
                ))
            })?;
            if sub.tasks.contains_key(&task.task_id)
                || !seen.insert((task.sub_instance_id, task.task_id.clone()))
            {
                return Err(TrackerError::invalid_task(format!(
                    "duplicate task id {} in sub instance {}",
                    task.task_id, task.sub_instance_id
                )));
            }
        }

        let keys: Vec<(i64, String)> = tasks
            .iter()
            .map(|task| (task.sub_instance_id, task.task_id.clone()))
            .collect();
        for task in tasks {
            if let Some(sub) = self.sub_instances.get_mut(&task.sub_instance_id) {
                sub.tasks.insert(task.task_id.clone(), task);
            }
        }

        let dispatched_before = effects.len();
        for (sub_instance_id, task_id) in &keys {
            if !self.dispatch_task(*sub_instance_id, task_id, None, now, effects) {
                return Err(TrackerError::submission_failure(ALL_PROCESSOR_TRACKERS_DEAD));
            }
        }

        // 先于 map 请求到达的状态上报
        for key in keys {
            if let Some(pending) = self.pending_reports.remove(&key) {
                debug!(
                    "Reconcile buffered report for task {} of sub instance {}",
                    key.1, key.0
                );
                effects.extend(self.update_task_status(
                    key.0,
                    &key.1,
                    pending.status,
                    pending.report_time,
                    pending.result,
                    now,
                ));
            }
        }

        info!(
            "Instance {} accepted {} new tasks",
            self.req.instance_id,
            effects[dispatched_before..]
                .iter()
                .filter(|effect| matches!(effect, Effect::Dispatch { .. }))
                .count()
        );
        Ok(())
    }

    pub(crate) fn update_task_status(
        &mut self,
        sub_instance_id: i64,
        task_id: &str,
        status: TaskStatus,
        report_time: i64,
        result: Option<String>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.status.is_terminal() {
            debug!(
                "Instance {} is {}, ignore report of task {}",
                self.req.instance_id, self.status, task_id
            );
            return effects;
        }

        let Some(sub) = self.sub_instances.get_mut(&sub_instance_id) else {
            debug!(
                "Sub instance {} of instance {} is not running, drop report of task {}",
                sub_instance_id, self.req.instance_id, task_id
            );
            return effects;
        };

        let Some(task) = sub.tasks.get_mut(task_id) else {
            if self.pending_reports.len() >= MAX_PENDING_REPORTS {
                warn!(
                    "Instance {} has too many buffered reports, drop report of task {}",
                    self.req.instance_id, task_id
                );
                return effects;
            }
            let key = (sub_instance_id, task_id.to_string());
            let newer = self
                .pending_reports
                .get(&key)
                .map_or(true, |buffered| buffered.report_time <= report_time);
            if newer {
                self.pending_reports.insert(
                    key,
                    PendingReport {
                        status,
                        report_time,
                        result,
                    },
                );
            }
            return effects;
        };

        if task.is_finished() {
            debug!("Task {} already finished, ignore {:?}", task_id, status);
            return effects;
        }
        if report_time < task.last_report_time {
            debug!(
                "Stale report for task {} ({} < {}), ignore",
                task_id, report_time, task.last_report_time
            );
            return effects;
        }

        task.last_report_time = report_time;
        if self.status == InstanceStatus::Dispatching {
            self.status = InstanceStatus::Running;
        }

        if status == TaskStatus::WorkerProcessFailed && task.failed_cnt < self.req.task_retry_num {
            task.failed_cnt += 1;
            task.status = TaskStatus::WaitingDispatch;
            task.address = None;
            task.result = result;
            info!(
                "Task {} of instance {} failed, retry {}/{}",
                task_id, self.req.instance_id, task.failed_cnt, self.req.task_retry_num
            );
            self.dispatch_task(sub_instance_id, task_id, None, now, &mut effects);
            return effects;
        }

        task.status = status;
        if result.is_some() {
            task.result = result;
        }
        if status.is_finished() {
            self.check_sub_instance_complete(sub_instance_id, now, &mut effects);
        }
        effects
    }

    pub(crate) fn broadcast(
        &mut self,
        success: bool,
        sub_instance_id: i64,
        task_id: &str,
        result: Option<String>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.req.execute_type != ExecuteType::Broadcast {
            warn!(
                "Instance {} is {:?}, ignore broadcast request",
                self.req.instance_id, self.req.execute_type
            );
            return effects;
        }
        if self.status.is_terminal() {
            return effects;
        }
        let Some(sub) = self.sub_instances.get_mut(&sub_instance_id) else {
            return effects;
        };
        if sub.broadcast_fanned_out {
            debug!(
                "Sub instance {} already broadcast, ignore duplicate",
                sub_instance_id
            );
            return effects;
        }
        sub.broadcast_fanned_out = true;

        if !success {
            let result = Some(format!(
                "broadcast pre-process failed: {}",
                result.unwrap_or_default()
            ));
            self.finish_sub_instance(sub_instance_id, false, result, &mut effects);
            return effects;
        }

        let targets = self.alive_candidates();
        if targets.is_empty() {
            self.terminate(
                InstanceStatus::Failed,
                Some(ALL_PROCESSOR_TRACKERS_DEAD.to_string()),
                &mut effects,
            );
            return effects;
        }

        for (n, address) in targets.into_iter().enumerate() {
            let broadcast_task_id = format!("{task_id}.{n}");
            if let Some(sub) = self.sub_instances.get_mut(&sub_instance_id) {
                sub.tasks.insert(
                    broadcast_task_id.clone(),
                    TaskRecord::new(
                        sub_instance_id,
                        broadcast_task_id.clone(),
                        BROADCAST_TASK_NAME,
                        Vec::new(),
                    ),
                );
            }
            self.dispatch_task(sub_instance_id, &broadcast_task_id, Some(address), now, &mut effects);
        }
        effects
    }

    /// 合并工作流上下文，同名 key 后写覆盖
    /// 一次状态上报整体生效：先合并工作流上下文，再处理广播与任务状态
    pub(crate) fn process_report(
        &mut self,
        req: ProcessorReportTaskStatusReq,
        now: Instant,
    ) -> Vec<Effect> {
        self.merge_wf_context(req.appended_wf_context);

        let mut effects = Vec::new();
        if req.cmd == ReportCmd::Broadcast {
            effects.extend(self.broadcast(
                req.status == TaskStatus::WorkerProcessSuccess,
                req.sub_instance_id,
                &req.task_id,
                req.result.clone(),
                now,
            ));
        }
        effects.extend(self.update_task_status(
            req.sub_instance_id,
            &req.task_id,
            req.status,
            req.report_time,
            req.result,
            now,
        ));
        effects
    }

    pub(crate) fn merge_wf_context(&mut self, appended: HashMap<String, String>) {
        if appended.is_empty() {
            return;
        }
        let max_len = self.settings.max_appended_wf_context_length;
        let mut current_len: usize = self.wf_context.iter().map(|(k, v)| k.len() + v.len()).sum();

        let mut entries: Vec<(String, String)> = appended.into_iter().collect();
        entries.sort();
        for (key, value) in entries {
            let replaced = self
                .wf_context
                .get(&key)
                .map_or(0, |old| key.len() + old.len());
            let new_len = current_len - replaced + key.len() + value.len();
            if new_len > max_len {
                warn!(
                    "Appended workflow context of instance {} exceeds {} bytes, drop key {}",
                    self.req.instance_id, max_len, key
                );
                continue;
            }
            current_len = new_len;
            self.wf_context.insert(key, value);
        }
    }

    pub(crate) fn receive_heartbeat(&mut self, address: &str, remain_task_num: i64, now: Instant) {
        if self.status.is_terminal() {
            return;
        }
        if self.dead_executors.remove(address).is_some() {
            info!(
                "ProcessorTracker {} of instance {} recovered",
                address, self.req.instance_id
            );
        }
        if !self.candidates.iter().any(|candidate| candidate == address) {
            self.candidates.push(address.to_string());
        }
        let executor = self
            .executors
            .entry(address.to_string())
            .or_insert(ExecutorState {
                last_active: now,
                remain_task_num,
            });
        executor.last_active = now;
        executor.remain_task_num = remain_task_num;
    }

    /// 心跳超时检测，超时的 ProcessorTracker 上未完成的任务转移到存活节点
    pub(crate) fn check_liveness(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.status.is_terminal() {
            return effects;
        }

        let timeout = self.settings.processor_tracker_timeout;
        let mut dead: Vec<String> = self
            .executors
            .iter()
            .filter(|(_, executor)| now.saturating_duration_since(executor.last_active) > timeout)
            .map(|(address, _)| address.clone())
            .collect();
        dead.sort();

        for address in &dead {
            self.executors.remove(address);
            self.dead_executors.insert(address.clone(), now);
            counter!("processor_tracker_dead_total").increment(1);
            warn!(
                "{}",
                TrackerError::ExecutorTimeout {
                    address: address.clone()
                }
            );
        }
        if !dead.is_empty() {
            self.redistribute(&dead, now, &mut effects);
        }

        let instance_timeout_ms = self.req.instance_timeout_ms;
        if !self.status.is_terminal()
            && !self.is_frequent()
            && instance_timeout_ms > 0
            && now.saturating_duration_since(self.started_at)
                > Duration::from_millis(instance_timeout_ms)
        {
            warn!(
                "Instance {} timeout after {}ms",
                self.req.instance_id, instance_timeout_ms
            );
            self.terminate(
                InstanceStatus::Failed,
                Some("instance timeout".to_string()),
                &mut effects,
            );
        }
        effects
    }

    pub(crate) fn stop(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.terminate(
            InstanceStatus::Stopped,
            Some("stopped by server".to_string()),
            &mut effects,
        );
        effects
    }

    pub(crate) fn snapshot(&self, now: Instant) -> InstanceDetail {
        let task_detail =
            TaskDetail::collect(self.sub_instances.values().flat_map(|sub| sub.tasks.values()));

        let mut executors: Vec<ExecutorDetail> = self
            .executors
            .iter()
            .map(|(address, executor)| ExecutorDetail {
                address: address.clone(),
                alive: true,
                last_active_ms_ago: now.saturating_duration_since(executor.last_active).as_millis()
                    as u64,
                remain_task_num: executor.remain_task_num,
            })
            .chain(self.dead_executors.iter().map(|(address, declared_at)| ExecutorDetail {
                address: address.clone(),
                alive: false,
                last_active_ms_ago: (now.saturating_duration_since(*declared_at)
                    + self.settings.processor_tracker_timeout)
                    .as_millis() as u64,
                remain_task_num: 0,
            }))
            .collect();
        executors.sort_by(|a, b| a.address.cmp(&b.address));

        let sub_instance_details = self
            .history
            .iter()
            .cloned()
            .chain(self.sub_instances.iter().map(|(id, sub)| SubInstanceDetail {
                sub_instance_id: *id,
                status: InstanceStatus::Running,
                started_at: sub.started_at,
                finished_at: None,
                result: None,
            }))
            .collect();

        InstanceDetail {
            instance_id: self.req.instance_id,
            status: self.status,
            actual_trigger_time: self.actual_trigger_time,
            finished_time: self.finished_time,
            result: self.result.clone(),
            task_detail,
            executors,
            wf_context: self.wf_context.clone(),
            sub_instance_details,
        }
    }

    fn alive_candidates(&self) -> Vec<String> {
        self.candidates
            .iter()
            .filter(|address| !self.dead_executors.contains_key(*address))
            .cloned()
            .collect()
    }

    fn next_candidate(&mut self) -> Option<String> {
        let alive = self.alive_candidates();
        if alive.is_empty() {
            return None;
        }
        let address = alive[self.cursor % alive.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        Some(address)
    }

    /// 派发单个任务，没有可用节点时实例失败并返回 false
    fn dispatch_task(
        &mut self,
        sub_instance_id: i64,
        task_id: &str,
        target: Option<String>,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let Some(address) = target.or_else(|| self.next_candidate()) else {
            self.terminate(
                InstanceStatus::Failed,
                Some(ALL_PROCESSOR_TRACKERS_DEAD.to_string()),
                effects,
            );
            return false;
        };

        let Some(task) = self
            .sub_instances
            .get_mut(&sub_instance_id)
            .and_then(|sub| sub.tasks.get_mut(task_id))
        else {
            return false;
        };
        task.status = TaskStatus::DispatchSuccessWorkerUncheck;
        task.address = Some(address.clone());

        let request = TaskTrackerStartTaskReq {
            instance_id: self.req.instance_id,
            sub_instance_id,
            job_id: self.req.job_id,
            wf_instance_id: self.req.wf_instance_id,
            task_id: task.task_id.clone(),
            task_name: task.task_name.clone(),
            task_content: task.task_content.clone(),
            task_current_retry_nums: task.failed_cnt,
            execute_type: self.req.execute_type,
            processor_info: self.req.processor_info.clone(),
            job_params: self.req.job_params.clone(),
            instance_params: self.req.instance_params.clone(),
            wf_context: self.wf_context.clone(),
            task_tracker_address: self.settings.worker_address.clone(),
        };

        self.executors
            .entry(address.clone())
            .or_insert(ExecutorState {
                last_active: now,
                remain_task_num: 0,
            });
        effects.push(Effect::Dispatch { address, request });
        true
    }

    fn redistribute(&mut self, dead: &[String], now: Instant, effects: &mut Vec<Effect>) {
        let mut orphans: Vec<(i64, String)> = Vec::new();
        for (sub_instance_id, sub) in &self.sub_instances {
            for task in sub.tasks.values() {
                if !task.is_finished() && task.address.as_ref().is_some_and(|a| dead.contains(a)) {
                    orphans.push((*sub_instance_id, task.task_id.clone()));
                }
            }
        }
        if orphans.is_empty() {
            return;
        }

        if self.alive_candidates().is_empty() {
            self.terminate(
                InstanceStatus::Failed,
                Some(ALL_PROCESSOR_TRACKERS_DEAD.to_string()),
                effects,
            );
            return;
        }

        info!(
            "Redistribute {} tasks of instance {} from dead processor trackers {:?}",
            orphans.len(),
            self.req.instance_id,
            dead
        );
        for (sub_instance_id, task_id) in orphans {
            if let Some(task) = self
                .sub_instances
                .get_mut(&sub_instance_id)
                .and_then(|sub| sub.tasks.get_mut(&task_id))
            {
                task.status = TaskStatus::WaitingDispatch;
                task.address = None;
            }
            if !self.dispatch_task(sub_instance_id, &task_id, None, now, effects) {
                return;
            }
        }
    }

    fn check_sub_instance_complete(
        &mut self,
        sub_instance_id: i64,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        let Some(sub) = self.sub_instances.get(&sub_instance_id) else {
            return;
        };
        if !sub.tasks.values().all(TaskRecord::is_finished) {
            return;
        }

        let outcome = match self.req.execute_type {
            ExecuteType::Standalone => match sub.tasks.get(ROOT_TASK_ID) {
                Some(root) => Outcome::Complete {
                    success: root.is_success(),
                    result: root.result.clone(),
                },
                None => Outcome::Complete {
                    success: false,
                    result: Some("root task missing".to_string()),
                },
            },
            ExecuteType::Map => Outcome::Complete {
                success: sub.tasks.values().all(TaskRecord::is_success),
                result: Some(summarize(sub.tasks.values())),
            },
            ExecuteType::MapReduce => match sub.tasks.get(LAST_TASK_ID) {
                Some(last) => Outcome::Complete {
                    success: last.is_success(),
                    result: last.result.clone(),
                },
                None if sub.tasks.values().all(TaskRecord::is_success) => Outcome::NeedReduce,
                None => Outcome::Complete {
                    success: false,
                    result: Some(summarize(sub.tasks.values())),
                },
            },
            ExecuteType::Broadcast => {
                let root_success = sub.tasks.get(ROOT_TASK_ID).is_some_and(TaskRecord::is_success);
                let mut fanned = sub.tasks.values().filter(|task| !task.is_root()).peekable();
                if !root_success {
                    Outcome::Complete {
                        success: false,
                        result: sub.tasks.get(ROOT_TASK_ID).and_then(|root| root.result.clone()),
                    }
                } else if fanned.peek().is_none() {
                    Outcome::Complete {
                        success: true,
                        result: sub.tasks.get(ROOT_TASK_ID).and_then(|root| root.result.clone()),
                    }
                } else {
                    Outcome::Complete {
                        success: fanned.any(|task| task.is_success()),
                        result: Some(summarize(sub.tasks.values())),
                    }
                }
            }
        };

        match outcome {
            Outcome::NeedReduce => {
                if let Some(sub) = self.sub_instances.get_mut(&sub_instance_id) {
                    sub.tasks
                        .insert(LAST_TASK_ID.to_string(), TaskRecord::last(sub_instance_id));
                }
                debug!(
                    "All map tasks of sub instance {} succeed, dispatch reduce task",
                    sub_instance_id
                );
                self.dispatch_task(sub_instance_id, LAST_TASK_ID, None, now, effects);
            }
            Outcome::Complete { success, result } => {
                self.finish_sub_instance(sub_instance_id, success, result, effects);
            }
        }
    }

    fn finish_sub_instance(
        &mut self,
        sub_instance_id: i64,
        success: bool,
        result: Option<String>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(sub) = self.sub_instances.remove(&sub_instance_id) else {
            return;
        };
        self.pending_reports.retain(|(id, _), _| *id != sub_instance_id);

        let status = if success {
            InstanceStatus::Finished
        } else {
            InstanceStatus::Failed
        };
        if self.history.len() >= SUB_INSTANCE_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(SubInstanceDetail {
            sub_instance_id,
            status,
            started_at: sub.started_at,
            finished_at: Some(Utc::now()),
            result: result.clone(),
        });

        if self.is_frequent() {
            info!(
                "Sub instance {} of instance {} finished with {}",
                sub_instance_id, self.req.instance_id, status
            );
            effects.push(Effect::SubInstanceCompleted { sub_instance_id });
        } else {
            self.terminate(status, result, effects);
        }
    }

    fn terminate(&mut self, status: InstanceStatus, result: Option<String>, effects: &mut Vec<Effect>) {
        if self.status.is_terminal() {
            return;
        }
        info!(
            "Instance {} turns {} -> {}, result: {:?}",
            self.req.instance_id, self.status, status, result
        );
        self.status = status;
        self.finished_time = Some(Utc::now());
        self.result = result.clone();

        let mut addresses: Vec<String> = self
            .executors
            .keys()
            .cloned()
            .chain(
                self.sub_instances
                    .values()
                    .flat_map(|sub| sub.tasks.values())
                    .filter_map(|task| task.address.clone()),
            )
            .collect();
        addresses.sort();
        addresses.dedup();

        self.sub_instances.clear();
        self.pending_reports.clear();

        if !addresses.is_empty() {
            effects.push(Effect::StopProcessorTrackers { addresses });
        }
        effects.push(Effect::Terminated(InstanceStatusReport {
            instance_id: self.req.instance_id,
            job_id: self.req.job_id,
            wf_instance_id: self.req.wf_instance_id,
            status,
            result,
            wf_context: self.wf_context.clone(),
            source_address: self.settings.worker_address.clone(),
            report_time: Utc::now(),
        }));
    }
}

fn summarize<'a>(tasks: impl IntoIterator<Item = &'a TaskRecord>) -> String {
    let detail = TaskDetail::collect(tasks);
    format!(
        "total:{}, succeed:{}, failed:{}",
        detail.total, detail.succeed, detail.failed
    )
}
