//! 健康检查与模型列表

use axum::{extract::State, response::IntoResponse, Json};

use crate::AppState;

/// 健康检查端点
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let backend_healthy = state.router.health_check().await;
    let status = if backend_healthy { "healthy" } else { "degraded" };
    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.router.kind().as_str(),
        "backend_healthy": backend_healthy,
    }))
}

/// 模型列表端点
pub async fn models(State(state): State<AppState>) -> impl IntoResponse {
    let owner = state.router.kind().as_str().to_string();
    let data: Vec<serde_json::Value> = state
        .router
        .list_models()
        .await
        .into_iter()
        .map(|id| serde_json::json!({"id": id, "object": "model", "owned_by": owner}))
        .collect();

    Json(serde_json::json!({
        "object": "list",
        "data": data,
    }))
}
