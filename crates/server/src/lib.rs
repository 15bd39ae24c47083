//! API 服务器模块
//!
//! 包含 auth（调用方认证）、bridge（SSE 出站）、handlers、response 等功能

pub mod auth;
pub mod bridge;
pub mod handlers;
pub mod response;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chatgate_core::config::ServerConfig;
use chatgate_providers::ProviderRouter;

use crate::auth::IdentityVerifier;

/// 所有请求共享的只读状态
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProviderRouter>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub fn new(router: Arc<ProviderRouter>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { router, verifier }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("监听地址无效: {0}")]
    InvalidAddress(String),
    #[error("绑定 {addr} 失败: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("服务运行失败: {0}")]
    Serve(#[source] std::io::Error),
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/v1/chat/stream",
            get(handlers::stream_chat).post(handlers::stream_chat),
        )
        .route("/api/v1/chat/complete", post(handlers::complete_chat))
        .route("/health", get(handlers::health))
        .route("/v1/models", get(handlers::models))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// 启动 HTTP 服务，直到进程退出
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!("[SERVER] 监听 http://{}", addr);

    axum::serve(listener, build_router(state))
        .await
        .map_err(ServerError::Serve)
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
