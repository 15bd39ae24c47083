//! JSON 错误响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use chatgate_core::errors::{GatewayError, GatewayErrorCode, GatewayErrorResponse};
use chatgate_core::StreamError;

/// 构建错误响应（带元信息）
pub fn build_error_response_with_meta(
    code: GatewayErrorCode,
    error_message: &str,
    request_id: Option<&str>,
    provider: Option<&str>,
) -> Response {
    let error = GatewayError::new(code, error_message)
        .with_request_id(request_id)
        .with_provider(provider);
    error_response(error)
}

/// 流错误转成 JSON 错误响应
pub fn build_stream_error_response(
    err: &StreamError,
    request_id: Option<&str>,
    provider: Option<&str>,
) -> Response {
    let error = GatewayError::from(err)
        .with_request_id(request_id)
        .with_provider(provider);
    error_response(error)
}

fn error_response(error: GatewayError) -> Response {
    let status =
        StatusCode::from_u16(error.code.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(GatewayErrorResponse::new(error))).into_response()
}
