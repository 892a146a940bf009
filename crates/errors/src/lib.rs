use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("任务追踪器未找到: instance_id={instance_id}")]
    TrackerNotFound { instance_id: i64 },
    #[error("任务追踪器已存在: instance_id={instance_id}")]
    DuplicateTracker { instance_id: i64 },
    #[error("Worker过载: {kind} 当前数量 {current}, 上限 {limit}")]
    Overload {
        kind: &'static str,
        current: usize,
        limit: usize,
    },
    #[error("任务实例已结束: instance_id={instance_id}, status={status}")]
    InstanceFinished { instance_id: i64, status: String },
    #[error("无效的子任务: {0}")]
    InvalidTask(String),
    #[error("子任务提交失败: {0}")]
    SubmissionFailure(String),
    #[error("处理器未找到: {0}")]
    ProcessorNotFound(String),
    #[error("处理器执行错误: {0}")]
    Processor(String),
    #[error("ProcessorTracker心跳超时: {address}")]
    ExecutorTimeout { address: String },
    #[error("无效的状态码: {0}")]
    InvalidStatus(i32),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl TrackerError {
    pub fn tracker_not_found(instance_id: i64) -> Self {
        Self::TrackerNotFound { instance_id }
    }
    pub fn invalid_task<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTask(msg.into())
    }
    pub fn submission_failure<S: Into<String>>(msg: S) -> Self {
        Self::SubmissionFailure(msg.into())
    }
    pub fn processor_not_found<S: Into<String>>(processor_info: S) -> Self {
        Self::ProcessorNotFound(processor_info.into())
    }
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::Network(_) | TrackerError::Timeout(_) | TrackerError::Overload { .. }
        )
    }
    /// 可安全返回给请求方的错误描述
    pub fn user_message(&self) -> &str {
        match self {
            TrackerError::TrackerNotFound { .. } => "can't find TaskTracker",
            TrackerError::InstanceFinished { .. } => "instance already finished",
            TrackerError::InvalidTask(_) | TrackerError::SubmissionFailure(_) => {
                "submit task failed"
            }
            TrackerError::Overload { .. } => "worker is overload",
            _ => "internal error",
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for TrackerError {
    fn from(err: anyhow::Error) -> Self {
        TrackerError::Internal(err.to_string())
    }
}
