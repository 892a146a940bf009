use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, info_span, Instrument};
use tracker_worker::{Responder, TaskTrackerRouter};
use uuid::Uuid;

/// 入站服务状态
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<TaskTrackerRouter>,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/taskTracker", post(handle_tracker_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 有应答时返回响应信封，否则返回 202
async fn handle_tracker_request(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Response {
    let request_id = Uuid::new_v4();
    let (responder, rx) = Responder::channel();

    state
        .router
        .dispatch_raw(payload, responder)
        .instrument(info_span!("tracker_request", %request_id))
        .await;

    match rx.await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(_) => {
            debug!("Request {} accepted without reply", request_id);
            StatusCode::ACCEPTED.into_response()
        }
    }
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let runtime = state.router.runtime();
    Json(json!({
        "status": "ok",
        "worker_address": runtime.config.worker_address,
        "light_task_tracker_num": runtime.light_trackers.current_size(),
        "heavy_task_tracker_num": runtime.heavy_trackers.current_size(),
        "overload": runtime.is_overload(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
