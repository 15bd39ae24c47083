//! 后端帧解码
//!
//! 解码器是纯函数：输入一帧（WebSocket 文本帧或 SSE 一行），输出零个或多个分块，
//! 以及可选的结束标记。格式不对的帧只记 debug 日志，不会让流失败。

pub mod spark;
pub mod sse;

use chatgate_core::{StreamChunk, StreamError};

pub use spark::decode_spark_frame;
pub use sse::{decode_sse_line, SseLineBuffer};

/// 帧携带的结束信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEnd {
    /// 正常结束（讯飞 `status == 2` / SSE `[DONE]`）
    Done,
    /// 后端在帧内报告的错误
    Rejected(StreamError),
}

/// 一帧的解码结果
///
/// 同一帧内的分块先于结束信号投递。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    pub chunks: Vec<StreamChunk>,
    pub end: Option<FrameEnd>,
}

impl DecodedFrame {
    pub fn skip() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.end.is_none()
    }

    fn push_content(&mut self, content: &str) {
        if !content.is_empty() {
            self.chunks.push(StreamChunk::new(content));
        }
    }
}
