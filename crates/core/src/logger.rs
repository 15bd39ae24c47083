//! 日志管理模块
//!
//! - [`init_tracing`]: 进程启动时初始化 tracing 订阅者
//! - [`sanitize_log_message`]: 写日志前脱敏（上游错误体、签名 URL 等）

use regex::Regex;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// 初始化全局 tracing 订阅者
///
/// `RUST_LOG` 优先于配置文件中的 `logging.level`。重复调用时忽略后续调用。
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if logging.json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing 已初始化，跳过: {e}");
    }
}

fn sanitize_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        let patterns = [
            (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
            (
                r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
                "api_key: ***",
            ),
            (
                r#"api[_-]?secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
                "api_secret: ***",
            ),
            (r#"token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#, "token: ***"),
            (
                r#"[Aa]uthorization["']?\s*[:=]\s*["']?[A-Za-z0-9._%+/=-]+"#,
                "authorization: ***",
            ),
            (
                r#"signature["']?\s*[:=]\s*["']?[A-Za-z0-9._%+/=-]+"#,
                "signature: ***",
            ),
            (
                r#"secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
                "secret: ***",
            ),
        ];
        patterns
            .into_iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|re| (re, replacement))
            })
            .collect()
    })
}

/// 日志脱敏
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in sanitize_rules() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }
    sanitized
}
