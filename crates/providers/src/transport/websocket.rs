//! 讯飞星火 X1 流式传输（签名 WebSocket）
//!
//! ## 协议流程
//! 1. 每次请求重新签名握手 URL（见 [`crate::handshake`]）
//! 2. 建立 WebSocket 连接，发送一个请求帧
//! 3. 逐帧接收，`header.status == 2` 为最后一帧
//! 4. 无论成功失败都关闭连接
//!
//! 建连和每次读取都受 `timeout_seconds` 约束。

use std::sync::Once;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chatgate_core::logger::sanitize_log_message;
use chatgate_core::models::openai::ChatMessage;
use chatgate_core::{ChatPrompt, ProviderConfig, StreamError, StreamOutcome, StreamTerminal};

use super::deliver;
use crate::decoder::{decode_spark_frame, DecodedFrame, FrameEnd};
use crate::handshake::{SignedHandshake, SparkCredentials, SparkEndpoint};
use crate::sink::ChunkSink;

type SparkSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 关闭连接时最多等待的时间
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// 讯飞要求 uid 不超过 32 个字符
const REQUEST_UID: &str = "chatgate";

#[derive(Serialize)]
struct SparkRequest<'a> {
    header: SparkRequestHeader<'a>,
    parameter: SparkParameter<'a>,
    payload: SparkPayload,
}

#[derive(Serialize)]
struct SparkRequestHeader<'a> {
    app_id: &'a str,
    uid: &'a str,
}

#[derive(Serialize)]
struct SparkParameter<'a> {
    chat: SparkChatParameter<'a>,
}

#[derive(Serialize)]
struct SparkChatParameter<'a> {
    domain: &'a str,
    max_tokens: u32,
    temperature: f64,
    presence_penalty: i32,
    frequency_penalty: f64,
    top_k: u32,
}

#[derive(Serialize)]
struct SparkPayload {
    message: SparkMessage,
}

#[derive(Serialize)]
struct SparkMessage {
    text: Vec<ChatMessage>,
}

pub struct SparkTransport {
    credentials: SparkCredentials,
    endpoint: SparkEndpoint,
    domain: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
}

/// 选择进程级 rustls 加密后端，未选择时 `wss://` 握手会直接 panic
pub fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("[SPARK] rustls 加密后端已由其他组件安装");
        }
    });
}

impl SparkTransport {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, StreamError> {
        ensure_crypto_provider();
        Ok(Self {
            credentials: SparkCredentials::from_config(config)?,
            endpoint: SparkEndpoint::parse(&config.effective_base_url())?,
            domain: config.effective_model(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// 凭证可以正常签名即视为可用，不做实际建连
    pub fn health_check(&self) -> bool {
        SignedHandshake::new(&self.credentials, &self.endpoint)
            .sign()
            .is_ok()
    }

    fn build_request(&self, prompt: &ChatPrompt) -> Result<String, StreamError> {
        let request = SparkRequest {
            header: SparkRequestHeader {
                app_id: &self.credentials.app_id,
                uid: REQUEST_UID,
            },
            parameter: SparkParameter {
                chat: SparkChatParameter {
                    domain: &self.domain,
                    max_tokens: self.max_tokens,
                    temperature: self.temperature,
                    presence_penalty: 1,
                    frequency_penalty: 0.02,
                    top_k: 5,
                },
            },
            payload: SparkPayload {
                message: SparkMessage {
                    text: vec![ChatMessage::user(prompt.rendered())],
                },
            },
        };
        serde_json::to_string(&request)
            .map_err(|e| StreamError::config(format!("序列化讯飞请求失败: {e}")))
    }

    pub async fn open(&self, prompt: &ChatPrompt, sink: &mut dyn ChunkSink) -> StreamOutcome {
        let signed = SignedHandshake::new(&self.credentials, &self.endpoint).sign()?;
        let request = self.build_request(prompt)?;
        tracing::debug!("[SPARK] 连接 {}", sanitize_log_message(&signed.url));

        let (mut socket, response) = tokio::time::timeout(self.timeout, connect_async(signed.url.as_str()))
            .await
            .map_err(|_| StreamError::timeout("讯飞 WebSocket 连接超时"))?
            .map_err(map_connect_error)?;
        tracing::debug!("[SPARK] 连接成功，HTTP 状态: {}", response.status());

        let outcome = self.exchange(&mut socket, request, sink).await;
        close_quietly(&mut socket).await;
        outcome
    }

    async fn exchange(
        &self,
        socket: &mut SparkSocket,
        request: String,
        sink: &mut dyn ChunkSink,
    ) -> StreamOutcome {
        socket
            .send(Message::Text(request))
            .await
            .map_err(|e| StreamError::transport(format!("发送讯飞请求失败: {e}")))?;

        loop {
            let next = tokio::time::timeout(self.timeout, socket.next())
                .await
                .map_err(|_| StreamError::timeout("等待讯飞响应超时"))?;

            let frame = match next {
                None => {
                    return Err(StreamError::transport("讯飞连接在最后一帧之前断开"));
                }
                Some(Err(e)) => {
                    return Err(StreamError::transport(format!("接收讯飞数据失败: {e}")));
                }
                Some(Ok(Message::Text(text))) => decode_spark_frame(&text),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => decode_spark_frame(text),
                    Err(_) => {
                        tracing::debug!("[DECODE] 跳过非 UTF-8 二进制帧");
                        DecodedFrame::skip()
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("[SPARK] 连接被关闭: {:?}", frame);
                    return Err(StreamError::transport("讯飞连接在最后一帧之前关闭"));
                }
                Some(Ok(_)) => continue,
            };

            for chunk in frame.chunks {
                deliver(sink, chunk).await?;
            }
            match frame.end {
                Some(FrameEnd::Done) => return Ok(StreamTerminal),
                Some(FrameEnd::Rejected(err)) => return Err(err),
                None => {}
            }
        }
    }
}

fn map_connect_error(err: tungstenite::Error) -> StreamError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            let body = response
                .body()
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            tracing::warn!(
                "[SPARK] 握手被拒绝: status={}, body={}",
                status,
                sanitize_log_message(&body)
            );
            StreamError::backend_rejected(format!("讯飞握手被拒绝: {}, {}", status, body))
        }
        other => StreamError::transport(format!("讯飞 WebSocket 连接失败: {other}")),
    }
}

async fn close_quietly(socket: &mut SparkSocket) {
    match tokio::time::timeout(CLOSE_GRACE, socket.close(None)).await {
        Ok(Ok(())) => tracing::debug!("[SPARK] 连接已关闭"),
        Ok(Err(e)) => tracing::debug!("[SPARK] 关闭连接时出错（忽略）: {}", e),
        Err(_) => tracing::debug!("[SPARK] 关闭连接超时（忽略）"),
    }
}
