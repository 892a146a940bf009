use serde::{Deserialize, Serialize};
use tracker_errors::TrackerError;

/// 任务实例的执行方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecuteType {
    Standalone,
    Broadcast,
    MapReduce,
    Map,
}

impl ExecuteType {
    pub fn code(&self) -> i32 {
        match self {
            ExecuteType::Standalone => 1,
            ExecuteType::Broadcast => 2,
            ExecuteType::MapReduce => 3,
            ExecuteType::Map => 4,
        }
    }
}

impl TryFrom<i32> for ExecuteType {
    type Error = TrackerError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ExecuteType::Standalone),
            2 => Ok(ExecuteType::Broadcast),
            3 => Ok(ExecuteType::MapReduce),
            4 => Ok(ExecuteType::Map),
            _ => Err(TrackerError::InvalidStatus(code)),
        }
    }
}

/// 任务实例的触发方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeExpressionType {
    Api,
    Cron,
    FixedRate,
    FixedDelay,
    Workflow,
}

impl TimeExpressionType {
    pub fn code(&self) -> i32 {
        match self {
            TimeExpressionType::Api => 1,
            TimeExpressionType::Cron => 2,
            TimeExpressionType::FixedRate => 3,
            TimeExpressionType::FixedDelay => 4,
            TimeExpressionType::Workflow => 5,
        }
    }

    /// 固定频率与固定延迟任务会在同一个实例内反复触发子实例
    pub fn is_frequent(&self) -> bool {
        matches!(
            self,
            TimeExpressionType::FixedRate | TimeExpressionType::FixedDelay
        )
    }
}

impl TryFrom<i32> for TimeExpressionType {
    type Error = TrackerError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TimeExpressionType::Api),
            2 => Ok(TimeExpressionType::Cron),
            3 => Ok(TimeExpressionType::FixedRate),
            4 => Ok(TimeExpressionType::FixedDelay),
            5 => Ok(TimeExpressionType::Workflow),
            _ => Err(TrackerError::InvalidStatus(code)),
        }
    }
}

/// Worker 侧子任务状态，序列化为整数状态码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "i32", into = "i32")]
pub enum TaskStatus {
    WaitingDispatch,
    DispatchSuccessWorkerUncheck,
    WorkerReceived,
    WorkerProcessing,
    WorkerProcessFailed,
    WorkerProcessSuccess,
}

impl TaskStatus {
    pub fn code(&self) -> i32 {
        match self {
            TaskStatus::WaitingDispatch => 1,
            TaskStatus::DispatchSuccessWorkerUncheck => 2,
            TaskStatus::WorkerReceived => 3,
            TaskStatus::WorkerProcessing => 4,
            TaskStatus::WorkerProcessFailed => 5,
            TaskStatus::WorkerProcessSuccess => 6,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::WorkerProcessFailed | TaskStatus::WorkerProcessSuccess
        )
    }
}

impl TryFrom<i32> for TaskStatus {
    type Error = TrackerError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TaskStatus::WaitingDispatch),
            2 => Ok(TaskStatus::DispatchSuccessWorkerUncheck),
            3 => Ok(TaskStatus::WorkerReceived),
            4 => Ok(TaskStatus::WorkerProcessing),
            5 => Ok(TaskStatus::WorkerProcessFailed),
            6 => Ok(TaskStatus::WorkerProcessSuccess),
            _ => Err(TrackerError::InvalidStatus(code)),
        }
    }
}

impl From<TaskStatus> for i32 {
    fn from(status: TaskStatus) -> Self {
        status.code()
    }
}

/// 任务实例在本 Worker 上的生命周期状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Created,
    Dispatching,
    Running,
    /// 成功结束
    Finished,
    Failed,
    Stopped,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Finished | InstanceStatus::Failed | InstanceStatus::Stopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Created => "CREATED",
            InstanceStatus::Dispatching => "DISPATCHING",
            InstanceStatus::Running => "RUNNING",
            InstanceStatus::Finished => "FINISHED",
            InstanceStatus::Failed => "FAILED",
            InstanceStatus::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 子任务状态上报的附加指令
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportCmd {
    #[default]
    Normal,
    Broadcast,
}

/// 追踪器类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    Light,
    Heavy,
}

impl TrackerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerKind::Light => "light",
            TrackerKind::Heavy => "heavy",
        }
    }

    /// 只有单机执行且非固定频率/固定延迟的任务才走轻量级模型
    pub fn classify(execute_type: ExecuteType, time_expression_type: TimeExpressionType) -> Self {
        if execute_type != ExecuteType::Standalone || time_expression_type.is_frequent() {
            TrackerKind::Heavy
        } else {
            TrackerKind::Light
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        use ExecuteType::*;
        use TimeExpressionType::*;

        assert_eq!(TrackerKind::classify(Standalone, Api), TrackerKind::Light);
        assert_eq!(TrackerKind::classify(Standalone, Cron), TrackerKind::Light);
        assert_eq!(TrackerKind::classify(Standalone, Workflow), TrackerKind::Light);
        assert_eq!(TrackerKind::classify(Standalone, FixedRate), TrackerKind::Heavy);
        assert_eq!(TrackerKind::classify(Standalone, FixedDelay), TrackerKind::Heavy);
        assert_eq!(TrackerKind::classify(Broadcast, Api), TrackerKind::Heavy);
        for time_type in [Api, Cron, FixedRate, FixedDelay, Workflow] {
            assert_eq!(TrackerKind::classify(MapReduce, time_type), TrackerKind::Heavy);
            assert_eq!(TrackerKind::classify(Map, time_type), TrackerKind::Heavy);
        }
    }

    #[test]
    fn test_task_status_codes() {
        assert!(TaskStatus::WorkerProcessSuccess.is_finished());
        assert!(TaskStatus::WorkerProcessFailed.is_finished());
        assert!(!TaskStatus::WorkerProcessing.is_finished());
        assert!(TaskStatus::try_from(7).is_err());

        let json = serde_json::to_string(&TaskStatus::WorkerProcessSuccess).unwrap();
        assert_eq!(json, "6");
        let status: TaskStatus = serde_json::from_str("4").unwrap();
        assert_eq!(status, TaskStatus::WorkerProcessing);
        assert!(serde_json::from_str::<TaskStatus>("42").is_err());
    }

    #[test]
    fn test_execute_type_names() {
        let json = serde_json::to_string(&ExecuteType::MapReduce).unwrap();
        assert_eq!(json, "\"MAP_REDUCE\"");
        let parsed: TimeExpressionType = serde_json::from_str("\"FIXED_DELAY\"").unwrap();
        assert_eq!(parsed, TimeExpressionType::FixedDelay);
        assert_eq!(ExecuteType::try_from(4).unwrap(), ExecuteType::Map);
    }

    #[test]
    fn test_instance_status_terminal() {
        assert!(InstanceStatus::Finished.is_terminal());
        assert!(InstanceStatus::Stopped.is_terminal());
        assert!(!InstanceStatus::Dispatching.is_terminal());
        assert_eq!(InstanceStatus::Failed.to_string(), "FAILED");
    }
}
