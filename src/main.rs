//! chatgate - 多后端流式对话网关
//!
//! 启动流程：加载配置 → 环境变量覆盖 → 初始化日志 → 校验 → 构建 provider 路由 → 启动 HTTP 服务

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use chatgate_core::logger::init_tracing;
use chatgate_core::GatewayConfig;
use chatgate_providers::ProviderRouter;
use chatgate_server::auth::StaticTokenVerifier;
use chatgate_server::AppState;

#[derive(Debug, Parser)]
#[command(name = "chatgate", version, about = "多后端流式对话网关")]
struct Args {
    /// YAML 配置文件路径
    #[arg(short, long, env = "CHATGATE_CONFIG")]
    config: Option<PathBuf>,

    /// 覆盖监听地址
    #[arg(long)]
    host: Option<String>,

    /// 覆盖监听端口
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = GatewayConfig::resolve_path(args.config.as_deref());
    let mut config = GatewayConfig::load(config_path.as_deref()).context("加载配置失败")?;
    config.apply_env_overrides();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);
    match &config_path {
        Some(path) => tracing::info!("[CONFIG] 已加载配置文件: {}", path.display()),
        None => tracing::info!("[CONFIG] 未找到配置文件，使用默认配置"),
    }
    config.validate().context("配置校验失败")?;

    tracing::info!(
        "[MAIN] chatgate v{} 启动, provider={}",
        chatgate_core::version(),
        config.provider.kind
    );

    let provider = Arc::new(config.provider.clone());
    let router = ProviderRouter::new(provider).context("初始化 provider 失败")?;
    let verifier = StaticTokenVerifier::from_config(&config.auth);
    tracing::info!("[MAIN] 已加载 {} 个调用方 token", verifier.len());

    let state = AppState::new(Arc::new(router), Arc::new(verifier));
    chatgate_server::serve(&config.server, state)
        .await
        .context("HTTP 服务异常退出")?;
    Ok(())
}
