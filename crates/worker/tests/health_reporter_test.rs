mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{advance, harness, schedule_req, settle, test_config, RecordingServerClient};
use tokio::sync::broadcast;
use tracker_config::WorkerConfig;
use tracker_domain::{ExecuteType, TimeExpressionType};
use tracker_worker::{WorkerHealthReporter, WorkerRuntime};

#[tokio::test]
async fn test_heartbeat_reflects_registry_sizes() {
    let config = WorkerConfig {
        max_heavyweight_task_num: 2,
        ..test_config()
    };
    let h = harness(config).await;
    let reporter = WorkerHealthReporter::new(Arc::clone(&h.runtime));

    let heartbeat = reporter.build_heartbeat();
    assert_eq!(heartbeat.worker_address, common::LOCAL_ADDRESS);
    assert_eq!(heartbeat.app_name, "tasktracker");
    assert_eq!(heartbeat.heavy_task_tracker_num, 0);
    assert!(!heartbeat.overload);

    h.schedule(schedule_req(1, ExecuteType::Map, TimeExpressionType::Api, &[]))
        .await;
    h.schedule(schedule_req(2, ExecuteType::Map, TimeExpressionType::Api, &[]))
        .await;
    let mut req = schedule_req(3, ExecuteType::Standalone, TimeExpressionType::Api, &[]);
    req.processor_info = "pending".to_string();
    h.schedule(req).await;

    let heartbeat = reporter.build_heartbeat();
    assert_eq!(heartbeat.heavy_task_tracker_num, 2);
    assert_eq!(heartbeat.light_task_tracker_num, 1);
    assert!(heartbeat.overload);

    reporter.report_once().await.unwrap();
    assert_eq!(h.server.heartbeats().len(), 1);
}

#[tokio::test]
async fn test_report_error_is_returned() {
    let server = Arc::new(RecordingServerClient {
        fail: true,
        ..RecordingServerClient::default()
    });
    let runtime = WorkerRuntime::builder(test_config())
        .server_client(server.clone())
        .processor_tracker_client(Arc::new(common::RecordingProcessorTrackerClient::default()))
        .build()
        .unwrap();

    let reporter = WorkerHealthReporter::new(runtime);
    assert!(reporter.report_once().await.is_err());
    assert!(server.heartbeats().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reporter_runs_until_shutdown() {
    let config = WorkerConfig {
        health_report_interval_secs: 5,
        ..test_config()
    };
    let h = harness(config).await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = WorkerHealthReporter::new(Arc::clone(&h.runtime)).start(shutdown_rx);

    settle().await;
    assert_eq!(h.server.heartbeats().len(), 1);

    advance(Duration::from_secs(5)).await;
    assert_eq!(h.server.heartbeats().len(), 2);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    advance(Duration::from_secs(10)).await;
    assert_eq!(h.server.heartbeats().len(), 2);
}
