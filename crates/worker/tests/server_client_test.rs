#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use chrono::Utc;
    use tracker_domain::{InstanceStatus, InstanceStatusReport, WorkerHeartbeat};
    use tracker_worker::{HttpProcessorTrackerClient, HttpServerClient, ServerClient};

    fn report() -> InstanceStatusReport {
        InstanceStatusReport {
            instance_id: 1,
            job_id: 1,
            wf_instance_id: None,
            status: InstanceStatus::Finished,
            result: None,
            wf_context: HashMap::new(),
            source_address: "127.0.0.1:27777".to_string(),
            report_time: Utc::now(),
        }
    }

    #[test]
    fn test_server_client_configuration() {
        let client =
            HttpServerClient::new(Some("http://localhost:7700".to_string()), Duration::from_secs(1))
                .unwrap();
        assert!(client.is_configured());

        let client = HttpServerClient::new(None, Duration::from_secs(1)).unwrap();
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn test_report_skipped_without_server_url() {
        let client = HttpServerClient::new(None, Duration::from_secs(1)).unwrap();

        // 未配置服务端地址时不发起请求
        assert!(client.report_instance_status(report()).await.is_ok());
        let heartbeat = WorkerHeartbeat {
            worker_address: "127.0.0.1:27777".to_string(),
            app_name: "tasktracker".to_string(),
            heartbeat_time: Utc::now(),
            light_task_tracker_num: 0,
            heavy_task_tracker_num: 0,
            overload: false,
        };
        assert!(client.report_worker_heartbeat(heartbeat).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let client = HttpServerClient::new(
            Some("http://127.0.0.1:1".to_string()),
            Duration::from_millis(500),
        )
        .unwrap();
        let err = client.report_instance_status(report()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_processor_tracker_client_creation() {
        assert!(HttpProcessorTrackerClient::new(Duration::from_secs(1)).is_ok());
    }
}
