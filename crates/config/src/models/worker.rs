use serde::{Deserialize, Serialize};

/// Worker 侧任务追踪相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub app_name: String,
    /// 本 Worker 对外地址，作为 TaskTracker 地址下发给 ProcessorTracker
    pub worker_address: String,
    pub max_lightweight_task_num: usize,
    pub max_heavyweight_task_num: usize,
    /// 轻量级任务允许超出 `max_lightweight_task_num` 的倍数
    pub overload_factor: f64,
    pub processor_tracker_timeout_ms: u64,
    pub liveness_check_interval_ms: u64,
    pub health_report_interval_secs: u64,
    pub max_appended_wf_context_length: usize,
    pub dispatch_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        Self {
            app_name: "tasktracker".to_string(),
            worker_address: format!("{hostname}:27777"),
            max_lightweight_task_num: 1024,
            max_heavyweight_task_num: 64,
            overload_factor: 1.3,
            processor_tracker_timeout_ms: 60_000,
            liveness_check_interval_ms: 5_000,
            health_report_interval_secs: 15,
            max_appended_wf_context_length: 8192,
            dispatch_timeout_ms: 5_000,
        }
    }
}

impl WorkerConfig {
    /// 轻量级追踪器的硬拒绝阈值
    pub fn lightweight_overload_limit(&self) -> usize {
        (self.max_lightweight_task_num as f64 * self.overload_factor).ceil() as usize
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app_name.is_empty() {
            return Err(anyhow::anyhow!("应用名称不能为空"));
        }

        if self.worker_address.is_empty() {
            return Err(anyhow::anyhow!("Worker地址不能为空"));
        }

        if self.max_lightweight_task_num == 0 {
            return Err(anyhow::anyhow!("最大轻量级任务数必须大于0"));
        }

        if self.max_heavyweight_task_num == 0 {
            return Err(anyhow::anyhow!("最大重量级任务数必须大于0"));
        }

        if !self.overload_factor.is_finite() || self.overload_factor < 1.0 {
            return Err(anyhow::anyhow!(
                "过载系数必须不小于1.0: {}",
                self.overload_factor
            ));
        }

        if self.processor_tracker_timeout_ms == 0 {
            return Err(anyhow::anyhow!("ProcessorTracker超时时间必须大于0"));
        }

        if self.liveness_check_interval_ms == 0 {
            return Err(anyhow::anyhow!("存活检查间隔必须大于0"));
        }

        if self.liveness_check_interval_ms > self.processor_tracker_timeout_ms {
            return Err(anyhow::anyhow!(
                "存活检查间隔({}ms)不能大于ProcessorTracker超时时间({}ms)",
                self.liveness_check_interval_ms,
                self.processor_tracker_timeout_ms
            ));
        }

        if self.health_report_interval_secs == 0 {
            return Err(anyhow::anyhow!("健康上报间隔必须大于0"));
        }

        if self.dispatch_timeout_ms == 0 {
            return Err(anyhow::anyhow!("派发超时时间必须大于0"));
        }

        Ok(())
    }
}
