//! HTTP 入口
//!
//! 两个端点：GET /chat?query=... 同步跑完一次计划并返回结果文本，
//! GET /status 返回当前计划的状态快照。没有活动计划时 /status 返回提示而不是错误。

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::flow::PlanningFlow;

pub struct AppState {
    pub flow: Arc<PlanningFlow>,
    /// 最近一次运行的计划 id；/status 读它
    pub active_plan: RwLock<Option<String>>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", get(chat_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct ChatParams {
    #[serde(default)]
    query: String,
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChatParams>,
) -> impl IntoResponse {
    let query = params.query.trim().to_string();
    if query.is_empty() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "query parameter is required"})),
        );
    }

    let plan_id = PlanningFlow::new_plan_id();
    {
        // 新运行开始时释放上一个计划，/status 始终只跟踪最新一次
        let mut active = state.active_plan.write().await;
        if let Some(previous) = active.take() {
            state.flow.cleanup(&previous);
        }
        *active = Some(plan_id.clone());
    }

    tracing::info!(plan_id = %plan_id, query = %query, "chat request");
    let result = state
        .flow
        .execute(&plan_id, &query, CancellationToken::new())
        .await;

    (StatusCode::OK, Json(json!({"result": result})))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active = state.active_plan.read().await;
    let snapshot = active.as_deref().and_then(|id| state.flow.plan_status(id));

    match snapshot {
        Some(snapshot) => match serde_json::to_value(&snapshot) {
            Ok(value) => (StatusCode::OK, Json(value)),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            ),
        },
        None => (StatusCode::OK, Json(json!({"message": "no active plan"}))),
    }
}
