//! Provider 系统模块
//!
//! 包含 handshake（讯飞签名）、decoder（帧解码）、transport（三种传输）和 router（按配置选路）

pub mod decoder;
pub mod handshake;
pub mod router;
pub mod sink;
pub mod transport;

pub use router::{ProviderRouter, TransportKind};
pub use sink::{ChunkSink, CollectSink, SinkClosed};
pub use transport::Transport;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
