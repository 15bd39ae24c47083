//! 流终止错误
//!
//! 每个流最多产生一个 [`StreamError`]，它代替 `StreamTerminal` 结束流。
//! 已经投递的分块不会被撤回。

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamErrorKind {
    /// 凭证缺失或无效（启动期致命）
    Config,
    /// 调用方 token 无效或缺失
    Auth,
    /// 后端在开始流式输出前返回非成功状态
    BackendRejected,
    /// 连接中断，或在没有终止信号的情况下结束
    Transport,
    /// 超过整体请求期限
    Timeout,
    /// 下游消费者失败（调用方断开）
    Cancelled,
}

impl StreamErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Auth => "auth",
            Self::BackendRejected => "backend-rejected",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 流终止错误
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub detail: String,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Config, detail)
    }

    pub fn auth(detail: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Auth, detail)
    }

    pub fn backend_rejected(detail: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::BackendRejected, detail)
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Transport, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Timeout, detail)
    }

    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Cancelled, detail)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == StreamErrorKind::Cancelled
    }
}
