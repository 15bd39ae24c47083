//! 分块接收端
//!
//! 传输层按顺序把分块推给 [`ChunkSink`]。推送失败表示下游已经不再消费，
//! 传输层会立即停止读取并关闭上游连接。

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use chatgate_core::StreamChunk;

/// 下游已关闭
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("下游已关闭: {0}")]
pub struct SinkClosed(pub String);

#[async_trait]
pub trait ChunkSink: Send {
    /// 投递一个分块；返回错误后不会再被调用
    async fn push(&mut self, chunk: StreamChunk) -> Result<(), SinkClosed>;
}

#[async_trait]
impl ChunkSink for mpsc::Sender<StreamChunk> {
    async fn push(&mut self, chunk: StreamChunk) -> Result<(), SinkClosed> {
        self.send(chunk)
            .await
            .map_err(|_| SinkClosed("接收端已丢弃".to_string()))
    }
}

/// 把分块拼成完整回复，用于非流式接口
#[derive(Debug, Default)]
pub struct CollectSink {
    reply: String,
    chunks: usize,
}

impl CollectSink {
    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn into_reply(self) -> String {
        self.reply
    }
}

#[async_trait]
impl ChunkSink for CollectSink {
    async fn push(&mut self, chunk: StreamChunk) -> Result<(), SinkClosed> {
        self.reply.push_str(&chunk.content);
        self.chunks += 1;
        Ok(())
    }
}
