//! 核心类型和工具模块
//!
//! 包含 models, config, errors, logger 等基础功能

pub mod config;
pub mod errors;
pub mod logger;
pub mod models;

pub use config::{GatewayConfig, ProviderConfig, ProviderKind};
pub use errors::{StreamError, StreamErrorKind};
pub use models::chat::{ChatPrompt, StreamChunk, StreamOutcome, StreamTerminal};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
