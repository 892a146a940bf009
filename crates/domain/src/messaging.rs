//! Worker 与服务端、ProcessorTracker 之间往来的请求与响应

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::InstanceDetail;
use crate::value_objects::{
    ExecuteType, InstanceStatus, ReportCmd, TaskStatus, TimeExpressionType,
};

/// 服务端下发的任务调度请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerScheduleJobReq {
    pub instance_id: i64,
    pub job_id: i64,
    #[serde(default)]
    pub wf_instance_id: Option<i64>,
    pub execute_type: ExecuteType,
    pub time_expression_type: TimeExpressionType,
    /// 固定频率/固定延迟任务的周期（毫秒）
    #[serde(default)]
    pub time_expression: Option<String>,
    pub processor_info: String,
    #[serde(default)]
    pub job_params: Option<String>,
    #[serde(default)]
    pub instance_params: Option<String>,
    #[serde(default)]
    pub task_retry_num: u32,
    #[serde(default)]
    pub instance_timeout_ms: u64,
    #[serde(default)]
    pub all_worker_address: Vec<String>,
}

impl ServerScheduleJobReq {
    /// 解析固定频率/固定延迟的周期
    pub fn period_ms(&self) -> Option<u64> {
        self.time_expression
            .as_deref()
            .and_then(|expr| expr.trim().parse::<u64>().ok())
            .filter(|period| *period > 0)
    }
}

/// ProcessorTracker 上报的子任务状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorReportTaskStatusReq {
    pub instance_id: i64,
    pub sub_instance_id: i64,
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<String>,
    /// 上报时间（毫秒时间戳）
    pub report_time: i64,
    #[serde(default)]
    pub cmd: ReportCmd,
    #[serde(default)]
    pub appended_wf_context: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub task_id: String,
    #[serde(default)]
    pub task_content: Vec<u8>,
}

/// 处理器在运行中提交的 map 子任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorMapTaskRequest {
    pub instance_id: i64,
    pub sub_instance_id: i64,
    pub task_name: String,
    pub sub_tasks: Vec<SubTask>,
}

/// ProcessorTracker 心跳
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorTrackerStatusReportReq {
    pub instance_id: i64,
    pub address: String,
    pub time: i64,
    #[serde(default)]
    pub remain_task_num: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStopInstanceReq {
    pub instance_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerQueryInstanceStatusReq {
    pub instance_id: i64,
}

/// TaskTracker 能处理的全部入站请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackerRequest {
    ServerScheduleJob(ServerScheduleJobReq),
    ProcessorReportTaskStatus(ProcessorReportTaskStatusReq),
    ProcessorMapTask(ProcessorMapTaskRequest),
    ProcessorTrackerStatusReport(ProcessorTrackerStatusReportReq),
    ServerStopInstance(ServerStopInstanceReq),
    ServerQueryInstanceStatus(ServerQueryInstanceStatusReq),
}

impl TrackerRequest {
    pub fn instance_id(&self) -> i64 {
        match self {
            TrackerRequest::ServerScheduleJob(req) => req.instance_id,
            TrackerRequest::ProcessorReportTaskStatus(req) => req.instance_id,
            TrackerRequest::ProcessorMapTask(req) => req.instance_id,
            TrackerRequest::ProcessorTrackerStatusReport(req) => req.instance_id,
            TrackerRequest::ServerStopInstance(req) => req.instance_id,
            TrackerRequest::ServerQueryInstanceStatus(req) => req.instance_id,
        }
    }

    pub fn message_type_str(&self) -> &'static str {
        match self {
            TrackerRequest::ServerScheduleJob(_) => "server_schedule_job",
            TrackerRequest::ProcessorReportTaskStatus(_) => "processor_report_task_status",
            TrackerRequest::ProcessorMapTask(_) => "processor_map_task",
            TrackerRequest::ProcessorTrackerStatusReport(_) => "processor_tracker_status_report",
            TrackerRequest::ServerStopInstance(_) => "server_stop_instance",
            TrackerRequest::ServerQueryInstanceStatus(_) => "server_query_instance_status",
        }
    }

    /// 请求方是否可能在等待响应
    pub fn expects_reply(&self) -> bool {
        match self {
            TrackerRequest::ProcessorReportTaskStatus(req) => req.status.is_finished(),
            TrackerRequest::ProcessorMapTask(_) | TrackerRequest::ServerQueryInstanceStatus(_) => {
                true
            }
            _ => false,
        }
    }
}

/// 统一响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AskResponse {
    pub fn succeed(data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn of(success: bool) -> Self {
        Self {
            success,
            data: None,
            message: None,
        }
    }

    pub fn instance_detail(&self) -> Option<InstanceDetail> {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }
}

/// 下发给 ProcessorTracker 的子任务执行请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTrackerStartTaskReq {
    pub instance_id: i64,
    pub sub_instance_id: i64,
    pub job_id: i64,
    pub wf_instance_id: Option<i64>,
    pub task_id: String,
    pub task_name: String,
    pub task_content: Vec<u8>,
    pub task_current_retry_nums: u32,
    pub execute_type: ExecuteType,
    pub processor_info: String,
    pub job_params: Option<String>,
    pub instance_params: Option<String>,
    pub wf_context: HashMap<String, String>,
    pub task_tracker_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTrackerStopInstanceReq {
    pub instance_id: i64,
    pub task_tracker_address: String,
}

/// 任务实例结束时上报给服务端的状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatusReport {
    pub instance_id: i64,
    pub job_id: i64,
    pub wf_instance_id: Option<i64>,
    pub status: InstanceStatus,
    pub result: Option<String>,
    pub wf_context: HashMap<String, String>,
    pub source_address: String,
    pub report_time: DateTime<Utc>,
}

/// Worker 健康心跳
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_address: String,
    pub app_name: String,
    pub heartbeat_time: DateTime<Utc>,
    pub light_task_tracker_num: usize,
    pub heavy_task_tracker_num: usize,
    pub overload: bool,
}
