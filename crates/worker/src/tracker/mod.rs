mod heavy;
mod light;

pub use heavy::HeavyTaskTracker;
pub use light::LightTaskTracker;

use async_trait::async_trait;
use tracker_domain::InstanceDetail;

/// 轻量级与重量级追踪器的公共操作
#[async_trait]
pub trait TaskTracker: Send + Sync {
    fn instance_id(&self) -> i64;

    /// 返回最近一次完整应用后的状态快照
    async fn fetch_running_status(&self) -> InstanceDetail;

    async fn stop_task(&self);
}
