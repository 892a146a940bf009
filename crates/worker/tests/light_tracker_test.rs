mod common;

use std::time::Duration;

use common::{advance, harness, schedule_req, test_config};
use tracker_domain::{ExecuteType, InstanceStatus, TimeExpressionType};
use tracker_worker::TaskTracker;

#[tokio::test]
async fn test_missing_processor_fails_instance() {
    let h = harness(test_config()).await;
    let mut req = schedule_req(1, ExecuteType::Standalone, TimeExpressionType::Cron, &[]);
    req.processor_info = "missing".to_string();
    h.schedule(req).await;

    assert_eq!(h.runtime.light_trackers.current_size(), 0);
    let reports = h.server.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, InstanceStatus::Failed);
    assert_eq!(reports[0].result.as_deref(), Some("处理器未找到: missing"));
}

#[tokio::test]
async fn test_processor_failure_reported() {
    let h = harness(test_config()).await;
    let mut req = schedule_req(2, ExecuteType::Standalone, TimeExpressionType::Workflow, &[]);
    req.processor_info = "failing".to_string();
    req.wf_instance_id = Some(77);
    h.schedule(req).await;

    let reports = h.server.reports();
    assert_eq!(reports[0].status, InstanceStatus::Failed);
    assert_eq!(reports[0].result.as_deref(), Some("boom"));
    assert_eq!(reports[0].wf_instance_id, Some(77));
    assert_eq!(reports[0].source_address, common::LOCAL_ADDRESS);
}

#[tokio::test]
async fn test_processor_panic_fails_instance() {
    let h = harness(test_config()).await;
    let mut req = schedule_req(5, ExecuteType::Standalone, TimeExpressionType::Api, &[]);
    req.processor_info = "panicking".to_string();
    h.schedule(req).await;

    assert_eq!(h.runtime.light_trackers.current_size(), 0);
    assert!(!h.runtime.is_overload());
    let reports = h.server.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, InstanceStatus::Failed);
    assert_eq!(reports[0].result.as_deref(), Some("processor panicked: kaboom"));
}

#[tokio::test]
async fn test_running_status_and_stop() {
    let h = harness(test_config()).await;
    let mut req = schedule_req(3, ExecuteType::Standalone, TimeExpressionType::Api, &[]);
    req.processor_info = "pending".to_string();
    h.schedule(req).await;

    let tracker = h.runtime.light_trackers.get(3).unwrap();
    assert_eq!(tracker.instance_id(), 3);
    let detail = tracker.fetch_running_status().await;
    assert_eq!(detail.status, InstanceStatus::Running);
    assert!(detail.finished_time.is_none());

    tracker.stop_task().await;
    // 重复停止无效果
    tracker.stop_task().await;
    common::settle().await;

    let detail = tracker.fetch_running_status().await;
    assert_eq!(detail.status, InstanceStatus::Stopped);
    assert_eq!(detail.task_detail.failed, 1);
    assert!(h.runtime.light_trackers.get(3).is_none());
    assert_eq!(h.server.reports().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_processor_timeout() {
    let h = harness(test_config()).await;
    let mut req = schedule_req(4, ExecuteType::Standalone, TimeExpressionType::Api, &[]);
    req.processor_info = "pending".to_string();
    req.instance_timeout_ms = 1_000;
    h.schedule(req).await;

    advance(Duration::from_millis(999)).await;
    assert_eq!(h.runtime.light_trackers.current_size(), 1);

    advance(Duration::from_millis(2)).await;
    assert_eq!(h.runtime.light_trackers.current_size(), 0);
    let reports = h.server.reports();
    assert_eq!(reports[0].status, InstanceStatus::Failed);
    assert_eq!(reports[0].result.as_deref(), Some("instance timeout"));
}
