//! 数据模型
//!
//! - `chat`: 网关内部的流式契约类型（提示词、分块、终止事件）
//! - `openai`: OpenAI 兼容接口的线上数据结构

pub mod chat;
pub mod openai;
