//! 配置模块
//!
//! 进程启动时加载一次，之后以 `Arc` 只读快照的形式在所有请求间共享。
//!
//! 加载顺序：
//! 1. `--config` / `CHATGATE_CONFIG` 指定的 YAML 文件
//! 2. `<config_dir>/chatgate/config.yaml`
//! 3. 内置默认值
//!
//! 之后再用环境变量覆盖敏感字段（见 [`GatewayConfig::apply_env_overrides`]）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// 后端类型
///
/// 未知类型不会导致解析失败，路由时退化为单次请求的默认实现。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Xunfei,
    Local,
    Unknown(String),
}

impl ProviderKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Xunfei => "xunfei",
            Self::Local => "local",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for ProviderKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "deepseek" => Self::DeepSeek,
            "xunfei" | "spark" => Self::Xunfei,
            "local" | "ollama" => Self::Local,
            _ => Self::Unknown(value),
        }
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.as_str().to_string()
    }
}

impl Default for ProviderKind {
    fn default() -> Self {
        Self::OpenAi
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 后端 Provider 配置
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// 讯飞 app_id
    pub app_id: Option<String>,
    /// 讯飞 api_secret
    pub api_secret: Option<String>,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            api_key: None,
            app_id: None,
            api_secret: None,
            model: None,
            max_tokens: 2048,
            temperature: 0.7,
            timeout_seconds: 60,
        }
    }
}

// 手写 Debug，避免密钥出现在日志里
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("app_id", &self.app_id)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl ProviderConfig {
    /// 实际使用的 base URL（未配置时取各后端默认值）
    pub fn effective_base_url(&self) -> String {
        let url = match (&self.base_url, &self.kind) {
            (Some(url), _) if !url.trim().is_empty() => url.trim().to_string(),
            (_, ProviderKind::DeepSeek) => "https://api.deepseek.com/v1".to_string(),
            (_, ProviderKind::Xunfei) => "wss://spark-api.xf-yun.com/v1/x1".to_string(),
            (_, ProviderKind::Local) => "http://localhost:11434".to_string(),
            _ => "https://api.openai.com/v1".to_string(),
        };
        url.trim_end_matches('/').to_string()
    }

    /// 实际使用的模型名（讯飞对应 domain 字段）
    pub fn effective_model(&self) -> String {
        match (&self.model, &self.kind) {
            (Some(model), _) if !model.trim().is_empty() => model.trim().to_string(),
            (_, ProviderKind::DeepSeek) => "deepseek-chat".to_string(),
            (_, ProviderKind::Xunfei) => "x1".to_string(),
            (_, ProviderKind::Local) => "deepseek-coder:6.7b".to_string(),
            _ => "gpt-3.5-turbo".to_string(),
        }
    }

    /// 校验凭证是否齐全
    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = match self.kind {
            ProviderKind::OpenAi | ProviderKind::Unknown(_) => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Xunfei => "xunfei",
            ProviderKind::Local => "local",
        };

        match self.kind {
            ProviderKind::Xunfei => {
                require(provider, "app_id", &self.app_id)?;
                require(provider, "api_key", &self.api_key)?;
                require(provider, "api_secret", &self.api_secret)?;
            }
            ProviderKind::OpenAi | ProviderKind::DeepSeek => {
                require(provider, "api_key", &self.api_key)?
            }
            // 本地服务与未知类型（退化为 OpenAI 兼容单次请求）不强制凭证
            ProviderKind::Local | ProviderKind::Unknown(_) => {}
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "timeout_seconds 必须大于 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature 超出范围 [0, 2]: {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens 必须大于 0".to_string()));
        }
        Ok(())
    }
}

fn require(
    provider: &'static str,
    field: &'static str,
    value: &Option<String>,
) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::MissingField { provider, field }),
    }
}

/// HTTP 服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// 调用方 token 条目
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub user_id: String,
    pub token: String,
}

impl fmt::Debug for TokenEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEntry")
            .field("user_id", &self.user_id)
            .field("token", &"***")
            .finish()
    }
}

/// 调用方认证配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenEntry>,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing 过滤指令，例如 `info` 或 `chatgate_providers=debug`
    pub level: String,
    /// 输出 JSON 格式日志
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// 网关总配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub provider: ProviderConfig,
}

impl GatewayConfig {
    /// 从 YAML 文本解析
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// 实际要读取的配置文件：显式路径优先，否则取存在的默认路径
    pub fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        }
    }

    /// 加载配置文件；未指定路径且默认路径不存在时返回默认配置
    ///
    /// 此时日志尚未初始化，这里不输出日志，由调用方在初始化后记录来源。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = Self::resolve_path(path) else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// 用进程环境变量覆盖 provider 字段
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// 用给定的查找函数覆盖 provider 字段
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = &mut self.provider;
        if let Some(kind) = lookup("CHATGATE_PROVIDER_KIND") {
            provider.kind = ProviderKind::from(kind);
        }
        if let Some(v) = lookup("CHATGATE_BASE_URL") {
            provider.base_url = Some(v);
        }
        if let Some(v) = lookup("CHATGATE_API_KEY") {
            provider.api_key = Some(v);
        }
        if let Some(v) = lookup("CHATGATE_APP_ID") {
            provider.app_id = Some(v);
        }
        if let Some(v) = lookup("CHATGATE_API_SECRET") {
            provider.api_secret = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.validate()
    }
}

/// 默认配置文件路径
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chatgate").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE_YAML: &str = r#"
server:
  host: 0.0.0.0
  port: 9000
auth:
  tokens:
    - user_id: "42"
      token: student-token
logging:
  level: debug
provider:
  kind: xunfei
  app_id: app
  api_key: key
  api_secret: secret
  max_tokens: 4096
  temperature: 0.5
"#;

    #[test]
    fn test_parse_full_yaml() {
        let config = GatewayConfig::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.tokens[0].user_id, "42");
        assert_eq!(config.provider.kind, ProviderKind::Xunfei);
        assert_eq!(config.provider.max_tokens, 4096);
        assert_eq!(config.provider.timeout_seconds, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let config = GatewayConfig::from_yaml_str("provider:\n  kind: qianfan\n").unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Unknown("qianfan".into()));
        assert_eq!(config.provider.kind.as_str(), "qianfan");
    }

    #[test]
    fn test_xunfei_requires_secret() {
        let config = ProviderConfig {
            kind: ProviderKind::Xunfei,
            app_id: Some("app".into()),
            api_key: Some("key".into()),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "api_secret",
                ..
            }
        ));
    }

    #[test]
    fn test_local_needs_no_credentials() {
        let config = ProviderConfig {
            kind: ProviderKind::Local,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_effective_defaults_per_kind() {
        let config = ProviderConfig {
            kind: ProviderKind::DeepSeek,
            base_url: Some("https://example.com/v1/".into()),
            ..Default::default()
        };
        assert_eq!(config.effective_base_url(), "https://example.com/v1");
        assert_eq!(config.effective_model(), "deepseek-chat");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CHATGATE_PROVIDER_KIND", "deepseek"),
            ("CHATGATE_API_KEY", "sk-env"),
        ]);
        let mut config = GatewayConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.provider.kind, ProviderKind::DeepSeek);
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-env"));
        assert!(config.provider.app_id.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_YAML.as_bytes()).unwrap();
        let config = GatewayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = GatewayConfig::load(Some(Path::new("/nonexistent/chatgate.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_resolve_path_prefers_explicit_path() {
        let explicit = Path::new("/nonexistent/chatgate.yaml");
        assert_eq!(
            GatewayConfig::resolve_path(Some(explicit)),
            Some(explicit.to_path_buf())
        );
    }

    struct CaptureWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_load_leaves_logging_to_caller() {
        // load 在日志初始化之前调用，期间输出的日志会丢失
        let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let writer_slot = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || CaptureWriter(writer_slot.clone()))
            .finish();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_YAML.as_bytes()).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            GatewayConfig::load(Some(file.path())).unwrap();
        });

        assert!(captured.lock().unwrap().is_empty());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = ProviderConfig {
            api_key: Some("sk-very-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
    }
}
