//! HTTP 处理器

pub mod chat;
pub mod meta;

pub use chat::{complete_chat, stream_chat};
pub use meta::{health, models};
