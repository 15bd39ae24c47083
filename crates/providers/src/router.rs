//! Provider 路由
//!
//! 启动时按 `ProviderConfig.kind` 选定唯一的传输实例，之后所有请求共用。
//! 未知类型退化为 OpenAI 兼容的单次请求。

use std::sync::Arc;
use std::time::Instant;

use chatgate_core::{ChatPrompt, ProviderConfig, ProviderKind, StreamError, StreamOutcome};

use crate::sink::{ChunkSink, CollectSink};
use crate::transport::{
    SingleShotFlavor, SingleShotTransport, SparkTransport, SseTransport, Transport,
};

/// 传输类型（选路结果）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Sse,
    SingleShot(SingleShotFlavor),
}

impl TransportKind {
    /// 选路规则，只取决于 `kind`
    pub fn select(kind: &ProviderKind) -> Self {
        match kind {
            ProviderKind::Xunfei => Self::WebSocket,
            ProviderKind::DeepSeek => Self::Sse,
            ProviderKind::Local => Self::SingleShot(SingleShotFlavor::Ollama),
            ProviderKind::OpenAi | ProviderKind::Unknown(_) => {
                Self::SingleShot(SingleShotFlavor::OpenAiCompatible)
            }
        }
    }
}

pub struct ProviderRouter {
    config: Arc<ProviderConfig>,
    transport: Transport,
}

impl ProviderRouter {
    /// 构建路由；凭证缺失返回 `config` 错误
    pub fn new(config: Arc<ProviderConfig>) -> Result<Self, StreamError> {
        let selected = TransportKind::select(&config.kind);
        if let ProviderKind::Unknown(name) = &config.kind {
            tracing::warn!(
                "[ROUTER] 未知的 provider 类型 '{}'，按 OpenAI 兼容接口处理",
                name
            );
        }

        let transport = match selected {
            TransportKind::WebSocket => Transport::WebSocket(SparkTransport::from_config(&config)?),
            TransportKind::Sse => Transport::Sse(SseTransport::from_config(&config)?),
            TransportKind::SingleShot(flavor) => {
                Transport::SingleShot(SingleShotTransport::from_config(&config, flavor)?)
            }
        };

        tracing::info!(
            "[ROUTER] provider={} transport={} base_url={} model={}",
            config.kind,
            transport.name(),
            config.effective_base_url(),
            config.effective_model()
        );

        Ok(Self { config, transport })
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.config.kind
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// 流式入口
    pub async fn send(&self, prompt: &ChatPrompt, sink: &mut dyn ChunkSink) -> StreamOutcome {
        let started = Instant::now();
        let outcome = self.transport.open(prompt, sink).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &outcome {
            Ok(_) => tracing::info!(
                "[STREAM] provider={} 完成, 耗时 {}ms",
                self.config.kind,
                elapsed_ms
            ),
            Err(e) if e.is_cancelled() => tracing::info!(
                "[STREAM] provider={} 调用方已断开, 耗时 {}ms",
                self.config.kind,
                elapsed_ms
            ),
            Err(e) => tracing::warn!(
                "[STREAM] provider={} 失败: {}, 耗时 {}ms",
                self.config.kind,
                e,
                elapsed_ms
            ),
        }
        outcome
    }

    /// 非流式入口，返回拼接后的完整回复
    pub async fn complete(&self, prompt: &ChatPrompt) -> Result<String, StreamError> {
        let mut sink = CollectSink::default();
        self.send(prompt, &mut sink).await?;
        Ok(sink.into_reply())
    }

    pub async fn health_check(&self) -> bool {
        self.transport.health_check().await
    }

    /// 配置的模型排在第一位
    pub async fn list_models(&self) -> Vec<String> {
        let configured = self.config.effective_model();
        let mut models = vec![configured.clone()];
        models.extend(
            self.transport
                .list_models()
                .await
                .into_iter()
                .filter(|m| *m != configured),
        );
        models
    }
}
