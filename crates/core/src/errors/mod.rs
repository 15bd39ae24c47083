//! 错误类型模块
//!
//! ## 模块结构
//! - `stream_error`: 流终止错误（StreamError, StreamErrorKind）
//! - `config_error`: 启动期配置错误
//! - `gateway_error`: 对外暴露的统一网关错误 JSON

pub mod config_error;
pub mod gateway_error;
pub mod stream_error;

pub use config_error::ConfigError;
pub use gateway_error::{GatewayError, GatewayErrorCode, GatewayErrorResponse};
pub use stream_error::{StreamError, StreamErrorKind};
