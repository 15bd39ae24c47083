//! 对话处理器
//!
//! 流式接口 `GET|POST /api/v1/chat/stream`：浏览器 `EventSource` 不能设置请求头，
//! token 放在查询参数里。所有失败都以 SSE `error` 事件返回，HTTP 状态始终是 200。

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use chatgate_core::errors::GatewayErrorCode;
use chatgate_core::ChatPrompt;

use crate::auth::identity::token_fingerprint;
use crate::bridge::OutboundBridge;
use crate::response::{build_error_response_with_meta, build_stream_error_response};
use crate::AppState;

const MSG_NOT_LOGGED_IN: &str = "未登录";
const MSG_INVALID_TOKEN: &str = "无效token";
const MSG_BAD_REQUEST: &str = "参数错误";

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 流式对话
pub async fn stream_chat(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Option<Json<ChatBody>>,
) -> Response {
    let request_id = new_request_id();

    // 查询串解析失败也要走 SSE，不能让 axum 返回 400 纯文本
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::info!("[STREAM] request_id={} 查询参数无效: {}", request_id, rejection);
            return OutboundBridge::single_error(MSG_BAD_REQUEST);
        }
    };

    let Some(token) = non_empty(query.token).or_else(|| non_empty(bearer_token(&headers))) else {
        tracing::info!("[STREAM] request_id={} 缺少 token", request_id);
        return OutboundBridge::single_error(MSG_NOT_LOGGED_IN);
    };

    let Some(identity) = state.verifier.verify(&token).await else {
        tracing::info!(
            "[STREAM] request_id={} token 无效, fingerprint={}",
            request_id,
            token_fingerprint(&token)
        );
        return OutboundBridge::single_error(MSG_INVALID_TOKEN);
    };

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let Some(message) = non_empty(query.message).or_else(|| non_empty(body.message)) else {
        tracing::info!("[STREAM] request_id={} 缺少 message", request_id);
        return OutboundBridge::single_error(MSG_BAD_REQUEST);
    };
    let context = non_empty(query.context).or_else(|| non_empty(body.context));

    tracing::info!(
        "[STREAM] request_id={} user_id={} provider={} 开始",
        request_id,
        identity.user_id,
        state.router.kind()
    );

    let prompt = ChatPrompt::new(message).with_context(context);
    OutboundBridge::stream(state.router.clone(), prompt, request_id)
}

/// 非流式对话
pub async fn complete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<ChatBody>>,
) -> Response {
    let request_id = new_request_id();
    let provider = state.router.kind().to_string();

    let Some(token) = non_empty(bearer_token(&headers)) else {
        return build_error_response_with_meta(
            GatewayErrorCode::AuthenticationFailed,
            MSG_NOT_LOGGED_IN,
            Some(&request_id),
            None,
        );
    };
    let Some(identity) = state.verifier.verify(&token).await else {
        return build_error_response_with_meta(
            GatewayErrorCode::AuthenticationFailed,
            MSG_INVALID_TOKEN,
            Some(&request_id),
            None,
        );
    };

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let Some(message) = non_empty(body.message) else {
        return build_error_response_with_meta(
            GatewayErrorCode::InvalidRequest,
            MSG_BAD_REQUEST,
            Some(&request_id),
            None,
        );
    };

    tracing::info!(
        "[COMPLETE] request_id={} user_id={} provider={}",
        request_id,
        identity.user_id,
        provider
    );

    let prompt = ChatPrompt::new(message).with_context(non_empty(body.context));
    match state.router.complete(&prompt).await {
        Ok(reply) => Json(serde_json::json!({
            "reply": reply,
            "provider": provider,
            "request_id": request_id,
        }))
        .into_response(),
        Err(e) => build_stream_error_response(&e, Some(&request_id), Some(&provider)),
    }
}
