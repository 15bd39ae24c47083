//! 流式对话契约类型
//!
//! 所有后端传输都产出同一组事件：若干 [`StreamChunk`]，然后恰好一个终止事件
//! （[`StreamTerminal`] 或 [`StreamError`]）。

use serde::{Deserialize, Serialize};

use crate::errors::StreamError;

/// 已经组装完成的提示词
///
/// 构造后不可变，生命周期与单个请求一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompt {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_text: Option<String>,
}

impl ChatPrompt {
    /// 创建只有正文的提示词
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context_text: None,
        }
    }

    /// 附加结构化上下文文本
    pub fn with_context(mut self, context_text: Option<String>) -> Self {
        self.context_text = context_text;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn context_text(&self) -> Option<&str> {
        self.context_text.as_deref()
    }

    /// 渲染为发送给后端的单条用户消息
    ///
    /// 上下文（非空时）在前，空行分隔，正文在后。
    pub fn rendered(&self) -> String {
        match self.context_text() {
            Some(context) if !context.trim().is_empty() => {
                format!("{}\n\n{}", context.trim_end(), self.text)
            }
            _ => self.text.clone(),
        }
    }
}

/// 增量输出分块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
}

impl StreamChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// 流正常结束标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamTerminal;

/// 单个流的终止事件：成功结束或错误
pub type StreamOutcome = Result<StreamTerminal, StreamError>;
