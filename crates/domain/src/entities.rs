use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracker_errors::{TrackerError, TrackerResult};

use crate::messaging::SubTask;
use crate::value_objects::{InstanceStatus, TaskStatus};

pub const ROOT_TASK_ID: &str = "0";
pub const ROOT_TASK_NAME: &str = "OMS_ROOT_TASK";
pub const LAST_TASK_ID: &str = "9999";
pub const LAST_TASK_NAME: &str = "OMS_LAST_TASK";
pub const BROADCAST_TASK_NAME: &str = "OMS_BROADCAST_TASK";

/// 重量级任务下的子任务记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub sub_instance_id: i64,
    pub task_id: String,
    pub task_name: String,
    pub task_content: Vec<u8>,
    pub status: TaskStatus,
    /// 负责执行的 ProcessorTracker 地址
    pub address: Option<String>,
    pub result: Option<String>,
    pub failed_cnt: u32,
    pub last_report_time: i64,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        sub_instance_id: i64,
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        task_content: Vec<u8>,
    ) -> Self {
        Self {
            sub_instance_id,
            task_id: task_id.into(),
            task_name: task_name.into(),
            task_content,
            status: TaskStatus::WaitingDispatch,
            address: None,
            result: None,
            failed_cnt: 0,
            last_report_time: 0,
            created_at: Utc::now(),
        }
    }

    pub fn root(sub_instance_id: i64) -> Self {
        Self::new(sub_instance_id, ROOT_TASK_ID, ROOT_TASK_NAME, Vec::new())
    }

    pub fn last(sub_instance_id: i64) -> Self {
        Self::new(sub_instance_id, LAST_TASK_ID, LAST_TASK_NAME, Vec::new())
    }

    /// 根据 map 请求中的子任务描述构建任务记录
    pub fn from_sub_task(
        sub_instance_id: i64,
        task_name: &str,
        sub_task: SubTask,
    ) -> TrackerResult<Self> {
        if task_name.is_empty() {
            return Err(TrackerError::invalid_task("task name can't be empty"));
        }
        if task_name == ROOT_TASK_NAME || task_name == LAST_TASK_NAME {
            return Err(TrackerError::invalid_task(format!(
                "task name {task_name} is reserved"
            )));
        }
        if sub_task.task_id.is_empty() {
            return Err(TrackerError::invalid_task("task id can't be empty"));
        }
        if sub_task.task_id == ROOT_TASK_ID || sub_task.task_id == LAST_TASK_ID {
            return Err(TrackerError::invalid_task(format!(
                "task id {} is reserved",
                sub_task.task_id
            )));
        }
        Ok(Self::new(
            sub_instance_id,
            sub_task.task_id,
            task_name,
            sub_task.task_content,
        ))
    }

    pub fn is_root(&self) -> bool {
        self.task_id == ROOT_TASK_ID
    }

    pub fn is_last(&self) -> bool {
        self.task_id == LAST_TASK_ID
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::WorkerProcessSuccess
    }
}

/// 各状态子任务数量统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub total: usize,
    pub waiting_dispatch: usize,
    pub running: usize,
    pub succeed: usize,
    pub failed: usize,
}

impl TaskDetail {
    pub fn collect<'a>(tasks: impl IntoIterator<Item = &'a TaskRecord>) -> Self {
        let mut detail = TaskDetail::default();
        for task in tasks {
            detail.total += 1;
            match task.status {
                TaskStatus::WaitingDispatch => detail.waiting_dispatch += 1,
                TaskStatus::WorkerProcessSuccess => detail.succeed += 1,
                TaskStatus::WorkerProcessFailed => detail.failed += 1,
                _ => detail.running += 1,
            }
        }
        detail
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorDetail {
    pub address: String,
    pub alive: bool,
    /// 距离上次心跳的毫秒数
    pub last_active_ms_ago: u64,
    pub remain_task_num: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubInstanceDetail {
    pub sub_instance_id: i64,
    pub status: InstanceStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
}

/// 运行中任务实例的只读快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDetail {
    pub instance_id: i64,
    pub status: InstanceStatus,
    pub actual_trigger_time: DateTime<Utc>,
    pub finished_time: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub task_detail: TaskDetail,
    #[serde(default)]
    pub executors: Vec<ExecutorDetail>,
    #[serde(default)]
    pub wf_context: HashMap<String, String>,
    #[serde(default)]
    pub sub_instance_details: Vec<SubInstanceDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub_task(id: &str) -> SubTask {
        SubTask {
            task_id: id.to_string(),
            task_content: b"payload".to_vec(),
        }
    }

    #[test]
    fn test_from_sub_task_validates_identity() {
        let record = TaskRecord::from_sub_task(7, "MAP_TASK", sub_task("0.1")).unwrap();
        assert_eq!(record.sub_instance_id, 7);
        assert_eq!(record.task_id, "0.1");
        assert_eq!(record.status, TaskStatus::WaitingDispatch);
        assert_eq!(record.task_content, b"payload".to_vec());

        assert!(TaskRecord::from_sub_task(7, "MAP_TASK", sub_task("")).is_err());
        assert!(TaskRecord::from_sub_task(7, "", sub_task("0.1")).is_err());
        assert!(TaskRecord::from_sub_task(7, "MAP_TASK", sub_task(ROOT_TASK_ID)).is_err());
        assert!(TaskRecord::from_sub_task(7, ROOT_TASK_NAME, sub_task("0.2")).is_err());
    }

    #[test]
    fn test_task_detail_collect() {
        let mut done = TaskRecord::root(1);
        done.status = TaskStatus::WorkerProcessSuccess;
        let mut failed = TaskRecord::new(1, "0.1", "MAP_TASK", Vec::new());
        failed.status = TaskStatus::WorkerProcessFailed;
        let mut running = TaskRecord::new(1, "0.2", "MAP_TASK", Vec::new());
        running.status = TaskStatus::WorkerProcessing;
        let waiting = TaskRecord::new(1, "0.3", "MAP_TASK", Vec::new());

        let detail = TaskDetail::collect([&done, &failed, &running, &waiting]);
        assert_eq!(
            detail,
            TaskDetail {
                total: 4,
                waiting_dispatch: 1,
                running: 1,
                succeed: 1,
                failed: 1,
            }
        );
    }
}
