//! SSE 出站桥接
//!
//! 把传输层的分块转成 SSE 事件写回调用方：
//!
//! | 事件 | 含义 | data |
//! |------|------|------|
//! | `message` | 一个分块 | 分块内容 |
//! | `end` | 正常结束 | `done` |
//! | `error` | 出错结束 | 错误详情 |
//!
//! 生产者（传输层读循环）跑在独立任务里，通过容量为 1 的通道交给响应体，
//! 每个分块到达即刷新。调用方断开后响应体被丢弃，下一次推送失败，传输层随之停止。

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use futures::stream;
use tokio::sync::mpsc;

use chatgate_core::{ChatPrompt, StreamChunk};
use chatgate_providers::{ChunkSink, ProviderRouter, SinkClosed};

pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_END: &str = "end";
pub const EVENT_ERROR: &str = "error";

/// 编码一个 SSE 事件，多行内容拆成多个 `data:` 行
pub fn format_sse_event(event: &str, data: &str) -> String {
    let mut out = format!("event: {event}\n");
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line.trim_end_matches('\r'));
        out.push('\n');
    }
    out.push('\n');
    out
}

/// 写入通道的接收端
struct EventSink {
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl ChunkSink for EventSink {
    async fn push(&mut self, chunk: StreamChunk) -> Result<(), SinkClosed> {
        self.tx
            .send(format_sse_event(EVENT_MESSAGE, &chunk.content))
            .await
            .map_err(|_| SinkClosed("SSE 响应已关闭".to_string()))
    }
}

pub struct OutboundBridge;

impl OutboundBridge {
    /// 启动一次流式对话，返回 SSE 响应
    pub fn stream(router: Arc<ProviderRouter>, prompt: ChatPrompt, request_id: String) -> Response {
        let (tx, mut rx) = mpsc::channel::<String>(1);

        tokio::spawn(async move {
            let mut sink = EventSink { tx };
            let outcome = router.send(&prompt, &mut sink).await;

            let terminal = match outcome {
                Ok(_) => format_sse_event(EVENT_END, "done"),
                Err(e) if e.is_cancelled() => {
                    tracing::info!("[STREAM] request_id={} 调用方已断开", request_id);
                    return;
                }
                Err(e) => {
                    tracing::warn!("[STREAM] request_id={} 以错误结束: {}", request_id, e);
                    format_sse_event(EVENT_ERROR, &e.detail)
                }
            };

            if sink.tx.send(terminal).await.is_err() {
                tracing::debug!("[STREAM] request_id={} 终止事件未送达，调用方已断开", request_id);
            }
        });

        let body = async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield Ok::<_, Infallible>(event);
            }
        };
        sse_response(Body::from_stream(body))
    }

    /// 只有一个 `error` 事件的响应（认证失败、参数错误）
    pub fn single_error(detail: &str) -> Response {
        let event = format_sse_event(EVENT_ERROR, detail);
        sse_response(Body::from_stream(stream::iter([Ok::<_, Infallible>(event)])))
    }
}

fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|e| {
            tracing::error!("构建 SSE 响应失败: {}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap_or_default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_event() {
        assert_eq!(
            format_sse_event("message", "你好"),
            "event: message\ndata: 你好\n\n"
        );
    }

    #[test]
    fn test_multi_line_payload_splits_data_lines() {
        assert_eq!(
            format_sse_event("message", "line1\r\nline2\n"),
            "event: message\ndata: line1\ndata: line2\ndata: \n\n"
        );
    }

    #[test]
    fn test_empty_payload_still_has_data_line() {
        assert_eq!(format_sse_event("end", ""), "event: end\ndata: \n\n");
    }

    #[tokio::test]
    async fn test_single_error_headers() {
        let resp = OutboundBridge::single_error("未登录");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], "event: error\ndata: 未登录\n\n".as_bytes());
    }
}
