use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracker_config::AppConfig;
use tracker_worker::{ProcessorRegistry, TaskTrackerRouter, WorkerHealthReporter, WorkerRuntime};

use crate::routes::{create_routes, AppState};
use crate::shutdown::ShutdownManager;

/// 主应用程序
pub struct Application {
    config: AppConfig,
    runtime: Arc<WorkerRuntime>,
    router: Arc<TaskTrackerRouter>,
}

impl Application {
    pub fn new(config: AppConfig, processors: Arc<ProcessorRegistry>) -> Result<Self> {
        info!(
            "初始化任务追踪器，Worker地址: {}",
            config.worker.worker_address
        );

        let runtime = WorkerRuntime::builder(config.worker.clone())
            .server_config(&config.server)
            .processors(processors)
            .build()
            .context("创建Worker运行时失败")?;
        let router = Arc::new(TaskTrackerRouter::new(Arc::clone(&runtime)));

        if config.server.server_url.is_none() {
            warn!("未配置服务端地址，实例状态与心跳不会上报");
        }

        Ok(Self {
            config,
            runtime,
            router,
        })
    }

    pub fn runtime(&self) -> &Arc<WorkerRuntime> {
        &self.runtime
    }

    pub fn state(&self) -> AppState {
        AppState {
            router: Arc::clone(&self.router),
        }
    }

    /// 运行入站服务与健康上报，直到收到关闭信号
    pub async fn run(&self, shutdown: ShutdownManager) -> Result<()> {
        let bind_address = &self.config.server.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {bind_address}"))?;
        info!("任务追踪器服务启动在 http://{}", bind_address);

        let reporter = WorkerHealthReporter::new(Arc::clone(&self.runtime));
        let reporter_handle = reporter.start(shutdown.subscribe());

        let mut shutdown_rx = shutdown.subscribe();
        let app = create_routes(self.state());
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("入站服务运行失败")?;

        info!("入站服务已停止，停止所有任务追踪器");
        self.runtime.shutdown().await;
        if let Err(e) = reporter_handle.await {
            warn!("健康上报任务退出异常: {}", e);
        }
        Ok(())
    }
}
