//! 网关统一错误模型
//!
//! 非流式接口使用的错误 JSON，为客户端提供稳定的错误语义。

use serde::{Deserialize, Serialize};

use super::stream_error::{StreamError, StreamErrorKind};

/// 网关错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayErrorCode {
    InvalidRequest,
    AuthenticationFailed,
    UpstreamRejected,
    UpstreamTimeout,
    UpstreamUnavailable,
    ClientClosed,
    ProviderMisconfigured,
    InternalError,
}

impl GatewayErrorCode {
    /// 流错误类别到网关错误码的映射
    pub fn from_kind(kind: StreamErrorKind) -> Self {
        match kind {
            StreamErrorKind::Config => Self::ProviderMisconfigured,
            StreamErrorKind::Auth => Self::AuthenticationFailed,
            StreamErrorKind::BackendRejected => Self::UpstreamRejected,
            StreamErrorKind::Transport => Self::UpstreamUnavailable,
            StreamErrorKind::Timeout => Self::UpstreamTimeout,
            StreamErrorKind::Cancelled => Self::ClientClosed,
        }
    }

    /// 对应的 HTTP 状态码
    pub fn status_code(self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::AuthenticationFailed => 401,
            Self::UpstreamRejected | Self::UpstreamUnavailable => 502,
            Self::UpstreamTimeout => 504,
            Self::ClientClosed => 499,
            Self::ProviderMisconfigured | Self::InternalError => 500,
        }
    }

    /// 默认错误文案
    pub fn default_message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "请求参数无效",
            Self::AuthenticationFailed => "认证失败",
            Self::UpstreamRejected => "上游服务拒绝了请求",
            Self::UpstreamTimeout => "上游请求超时",
            Self::UpstreamUnavailable => "上游连接中断",
            Self::ClientClosed => "客户端已断开",
            Self::ProviderMisconfigured => "AI服务未配置",
            Self::InternalError => "服务内部错误",
        }
    }

    /// 是否值得调用方重试（网关内部从不重试）
    pub fn retryable(self) -> bool {
        matches!(self, Self::UpstreamTimeout | Self::UpstreamUnavailable)
    }
}

/// 网关错误详情
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl GatewayError {
    /// 创建错误详情
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let final_message = if message.trim().is_empty() {
            code.default_message().to_string()
        } else {
            message
        };

        Self {
            code,
            message: final_message,
            retryable: code.retryable(),
            request_id: None,
            provider: None,
        }
    }

    /// 设置请求 ID
    pub fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        self.request_id = request_id.map(ToString::to_string);
        self
    }

    /// 设置上游 provider
    pub fn with_provider(mut self, provider: Option<&str>) -> Self {
        self.provider = provider.map(ToString::to_string);
        self
    }
}

impl From<&StreamError> for GatewayError {
    fn from(err: &StreamError) -> Self {
        GatewayError::new(GatewayErrorCode::from_kind(err.kind), err.detail.clone())
    }
}

/// 网关错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayErrorResponse {
    pub error: GatewayError,
}

impl GatewayErrorResponse {
    pub fn new(error: GatewayError) -> Self {
        Self { error }
    }
}
