//! DeepSeek 流式传输（HTTP + SSE）
//!
//! `POST {base_url}/chat/completions`，`stream: true`，按行解码响应体。
//! 收到 `data: [DONE]` 后立即停止读取；响应体正常结束但没有 `[DONE]` 同样视为成功。

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use chatgate_core::models::openai::{ChatCompletionRequest, ChatMessage, ModelList};
use chatgate_core::{ChatPrompt, ProviderConfig, StreamError, StreamOutcome, StreamTerminal};

use super::{build_http_client, deliver, map_reqwest_error, rejection_from_response};
use crate::decoder::{decode_sse_line, FrameEnd, SseLineBuffer};
use crate::sink::ChunkSink;

const TOP_P: f64 = 0.9;

pub struct SseTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl SseTransport {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, StreamError> {
        let api_key = match &config.api_key {
            Some(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => return Err(StreamError::config(format!("{} 缺少配置项: api_key", config.kind))),
        };

        Ok(Self {
            client: build_http_client(Duration::from_secs(config.timeout_seconds))?,
            base_url: config.effective_base_url(),
            api_key,
            model: config.effective_model(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn build_request(&self, prompt: &ChatPrompt) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt.rendered())],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            top_p: Some(TOP_P),
            stream: true,
        }
    }

    pub async fn open(&self, prompt: &ChatPrompt, sink: &mut dyn ChunkSink) -> StreamOutcome {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("[SSE] POST {} model={}", url, self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(rejection_from_response(response).await);
        }

        let body = response
            .bytes_stream()
            .map(|item| item.map_err(map_reqwest_error));
        pump_sse_body(body, sink).await
    }

    pub async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!("[SSE] 健康检查失败: {}", e);
                false
            }
        }
    }

    pub async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/models", self.base_url);
        let fetched: Result<ModelList, reqwest::Error> = async {
            self.client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await?
                .error_for_status()?
                .json::<ModelList>()
                .await
        }
        .await;

        match fetched {
            Ok(list) => list.data.into_iter().map(|m| m.id).collect(),
            Err(e) => {
                tracing::warn!("[SSE] 获取模型列表失败，使用配置的模型: {}", e);
                vec![self.model.clone()]
            }
        }
    }
}

/// 逐行解码 SSE 响应体并推送分块
///
/// 遇到结束标记后不再从 `body` 读取。
pub(crate) async fn pump_sse_body<S>(body: S, sink: &mut dyn ChunkSink) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, StreamError>> + Send,
{
    futures::pin_mut!(body);
    let mut lines = SseLineBuffer::default();

    while let Some(item) = body.next().await {
        let bytes = item?;
        for line in lines.push_chunk(&bytes)? {
            if let Some(outcome) = handle_line(&line, sink).await? {
                return Ok(outcome);
            }
        }
    }

    if let Some(line) = lines.finish() {
        if let Some(outcome) = handle_line(&line, sink).await? {
            return Ok(outcome);
        }
    }

    tracing::debug!("[SSE] 响应体结束，未收到 [DONE]");
    Ok(StreamTerminal)
}

async fn handle_line(
    line: &str,
    sink: &mut dyn ChunkSink,
) -> Result<Option<StreamTerminal>, StreamError> {
    let frame = decode_sse_line(line);
    for chunk in frame.chunks {
        deliver(sink, chunk).await?;
    }
    match frame.end {
        Some(FrameEnd::Done) => Ok(Some(StreamTerminal)),
        Some(FrameEnd::Rejected(err)) => Err(err),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CollectSink, SinkClosed};
    use async_trait::async_trait;
    use chatgate_core::{StreamChunk, StreamErrorKind};
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn body_of(
        parts: Vec<&'static str>,
        polled: Arc<AtomicUsize>,
    ) -> impl Stream<Item = Result<Bytes, StreamError>> + Send {
        stream::iter(parts).map(move |p| {
            polled.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(p.as_bytes()))
        })
    }

    #[tokio::test]
    async fn test_done_stops_reading() {
        let polled = Arc::new(AtomicUsize::new(0));
        let body = body_of(
            vec![
                "data: {\"choices\":[{\"message\":{\"content\":\"a\"}}]}\n\n",
                "data: [DONE]\n\n",
                "data: {\"choices\":[{\"message\":{\"content\":\"b\"}}]}\n\n",
            ],
            polled.clone(),
        );
        let mut sink = CollectSink::default();
        let outcome = pump_sse_body(body, &mut sink).await;

        assert_eq!(outcome, Ok(StreamTerminal));
        assert_eq!(sink.reply(), "a");
        assert_eq!(polled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_eof_without_done_is_success() {
        let polled = Arc::new(AtomicUsize::new(0));
        let body = body_of(
            vec!["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}"],
            polled,
        );
        let mut sink = CollectSink::default();
        assert_eq!(pump_sse_body(body, &mut sink).await, Ok(StreamTerminal));
        assert_eq!(sink.reply(), "x");
    }

    #[tokio::test]
    async fn test_read_error_is_terminal() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n")),
            Err(StreamError::transport("connection reset")),
        ]);
        let mut sink = CollectSink::default();
        let err = pump_sse_body(body, &mut sink).await.unwrap_err();
        assert_eq!(err.kind, StreamErrorKind::Transport);
        assert_eq!(sink.reply(), "x");
    }

    struct FailingSink;

    #[async_trait]
    impl ChunkSink for FailingSink {
        async fn push(&mut self, _chunk: StreamChunk) -> Result<(), SinkClosed> {
            Err(SinkClosed("gone".into()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_is_cancelled() {
        let polled = Arc::new(AtomicUsize::new(0));
        let body = body_of(
            vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            ],
            polled.clone(),
        );
        let err = pump_sse_body(body, &mut FailingSink).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(polled.load(Ordering::SeqCst), 1);
    }
}
