//! 流式传输
//!
//! 三种后端协议共用同一个契约：按顺序投递分块，最后恰好一个终止事件。
//!
//! | 变体 | 协议 | 后端 |
//! |------|------|------|
//! | [`Transport::WebSocket`] | 签名 WebSocket | 讯飞星火 X1 |
//! | [`Transport::Sse`] | HTTP + SSE | DeepSeek |
//! | [`Transport::SingleShot`] | 单次 HTTP 请求 | OpenAI 兼容 / Ollama |

pub mod single_shot;
pub mod sse;
pub mod websocket;

use std::time::Duration;

use chatgate_core::{ChatPrompt, StreamChunk, StreamError, StreamOutcome};

use crate::sink::ChunkSink;

pub use single_shot::{SingleShotFlavor, SingleShotTransport};
pub use sse::SseTransport;
pub use websocket::SparkTransport;

/// 已配置好的传输实例
pub enum Transport {
    WebSocket(SparkTransport),
    Sse(SseTransport),
    SingleShot(SingleShotTransport),
}

impl Transport {
    /// 发起一次请求并把输出推给 `sink`
    ///
    /// 返回值就是这个流唯一的终止事件；上游连接在返回前已释放。
    pub async fn open(&self, prompt: &ChatPrompt, sink: &mut dyn ChunkSink) -> StreamOutcome {
        match self {
            Transport::WebSocket(t) => t.open(prompt, sink).await,
            Transport::Sse(t) => t.open(prompt, sink).await,
            Transport::SingleShot(t) => t.open(prompt, sink).await,
        }
    }

    pub async fn health_check(&self) -> bool {
        match self {
            Transport::WebSocket(t) => t.health_check(),
            Transport::Sse(t) => t.health_check().await,
            Transport::SingleShot(t) => t.health_check().await,
        }
    }

    pub async fn list_models(&self) -> Vec<String> {
        match self {
            Transport::WebSocket(t) => vec![t.domain().to_string()],
            Transport::Sse(t) => t.list_models().await,
            Transport::SingleShot(t) => t.list_models().await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transport::WebSocket(_) => "websocket",
            Transport::Sse(_) => "sse",
            Transport::SingleShot(_) => "single-shot",
        }
    }
}

/// 投递一个分块；下游失败转为 `cancelled`
pub(crate) async fn deliver(sink: &mut dyn ChunkSink, chunk: StreamChunk) -> Result<(), StreamError> {
    sink.push(chunk)
        .await
        .map_err(|e| StreamError::cancelled(e.to_string()))
}

/// 构建带整体超时的 HTTP 客户端
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, StreamError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| StreamError::config(format!("创建 HTTP 客户端失败: {e}")))
}

/// reqwest 错误分类
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> StreamError {
    if err.is_timeout() {
        StreamError::timeout(format!("请求超时: {err}"))
    } else {
        StreamError::transport(format!("请求失败: {err}"))
    }
}

/// 读取非成功响应的状态与响应体
pub(crate) async fn rejection_from_response(response: reqwest::Response) -> StreamError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(
        "[UPSTREAM] 后端拒绝请求: status={}, body={}",
        status,
        chatgate_core::logger::sanitize_log_message(&body)
    );
    StreamError::backend_rejected(format!("API请求失败: {}, {}", status, body))
}
