use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracker_errors::TrackerResult;

/// 处理器执行时可见的任务上下文
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub instance_id: i64,
    pub job_id: i64,
    pub wf_instance_id: Option<i64>,
    pub job_params: Option<String>,
    pub instance_params: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub success: bool,
    pub msg: Option<String>,
}

impl ProcessResult {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            msg: Some(msg.into()),
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: Some(msg.into()),
        }
    }
}

/// 用户任务处理逻辑
#[async_trait]
pub trait BasicProcessor: Send + Sync {
    async fn process(&self, ctx: TaskContext) -> TrackerResult<ProcessResult>;
}

/// 按 `processor_info` 查找处理器
pub struct ProcessorRegistry {
    processors: RwLock<HashMap<String, Arc<dyn BasicProcessor>>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            processors: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, processor_info: impl Into<String>, processor: Arc<dyn BasicProcessor>) {
        let mut processors = self.processors.write().await;
        processors.insert(processor_info.into(), processor);
    }

    pub async fn get(&self, processor_info: &str) -> Option<Arc<dyn BasicProcessor>> {
        let processors = self.processors.read().await;
        processors.get(processor_info).cloned()
    }

    pub async fn list_processors(&self) -> Vec<String> {
        let processors = self.processors.read().await;
        processors.keys().cloned().collect()
    }

    pub async fn unregister(&self, processor_info: &str) -> bool {
        let mut processors = self.processors.write().await;
        processors.remove(processor_info).is_some()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl BasicProcessor for Echo {
        async fn process(&self, ctx: TaskContext) -> TrackerResult<ProcessResult> {
            Ok(ProcessResult::success(ctx.job_params.unwrap_or_default()))
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ProcessorRegistry::new();
        registry.register("echo", Arc::new(Echo)).await;
        assert_eq!(registry.list_processors().await, vec!["echo".to_string()]);

        let processor = registry.get("echo").await.unwrap();
        let result = processor
            .process(TaskContext {
                instance_id: 1,
                job_id: 1,
                wf_instance_id: None,
                job_params: Some("hi".to_string()),
                instance_params: None,
            })
            .await
            .unwrap();
        assert_eq!(result, ProcessResult::success("hi"));

        assert!(registry.unregister("echo").await);
        assert!(registry.get("echo").await.is_none());
    }
}
