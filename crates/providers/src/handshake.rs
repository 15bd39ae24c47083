//! 讯飞星火 WebSocket 鉴权
//!
//! 讯飞开放平台的 WebSocket 接口不接受请求头鉴权，所有凭证都以查询参数的形式
//! 放在握手 URL 上：
//!
//! 1. 签名原文 `host: <host>\ndate: <date>\nGET <path> HTTP/1.1`
//! 2. `signature = base64(hmac-sha256(api_secret, 签名原文))`
//! 3. `authorization = base64(api_key="..", algorithm="hmac-sha256", headers="host date request-line", signature="..")`
//! 4. `<scheme>://<host><path>?authorization=..&date=..&host=..`
//!
//! 签名绑定时间戳，服务端只接受 300 秒内的请求，因此每次建连都要重新签名。
//!
//! ## 参考文档
//! https://www.xfyun.cn/doc/spark/X1ws.html

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use chatgate_core::{ProviderConfig, StreamError};

type HmacSha256 = Hmac<Sha256>;

/// 服务端允许的时钟偏差
pub const SIGNATURE_VALIDITY_SECS: i64 = 300;

/// 讯飞应用凭证
#[derive(Clone)]
pub struct SparkCredentials {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
}

impl SparkCredentials {
    /// 从 provider 配置中提取凭证，缺任一项即为配置错误
    pub fn from_config(config: &ProviderConfig) -> Result<Self, StreamError> {
        fn field(value: &Option<String>, name: &str) -> Result<String, StreamError> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
                _ => Err(StreamError::config(format!("讯飞星火缺少配置项: {name}"))),
            }
        }

        Ok(Self {
            app_id: field(&config.app_id, "app_id")?,
            api_key: field(&config.api_key, "api_key")?,
            api_secret: field(&config.api_secret, "api_secret")?,
        })
    }
}

impl std::fmt::Debug for SparkCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparkCredentials")
            .field("app_id", &self.app_id)
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .finish()
    }
}

/// 握手目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparkEndpoint {
    pub scheme: String,
    /// 含非默认端口，例如 `127.0.0.1:9001`
    pub host: String,
    pub path: String,
}

impl SparkEndpoint {
    /// 解析 `wss://host[:port]/path`，只接受 `ws` / `wss`
    pub fn parse(base_url: &str) -> Result<Self, StreamError> {
        let url = Url::parse(base_url)
            .map_err(|e| StreamError::config(format!("讯飞地址无效: {base_url}: {e}")))?;

        let scheme = url.scheme().to_string();
        if scheme != "wss" && scheme != "ws" {
            return Err(StreamError::config(format!(
                "讯飞地址必须是 ws/wss: {base_url}"
            )));
        }

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(StreamError::config(format!("讯飞地址缺少主机名: {base_url}")))
            }
        };

        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self { scheme, host, path })
    }
}

/// 已签名的握手 URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    /// RFC-1123 日期，即签名时间戳
    pub date: String,
    pub valid_until: DateTime<Utc>,
}

/// 握手签名器
pub struct SignedHandshake<'a> {
    credentials: &'a SparkCredentials,
    endpoint: &'a SparkEndpoint,
}

impl<'a> SignedHandshake<'a> {
    pub fn new(credentials: &'a SparkCredentials, endpoint: &'a SparkEndpoint) -> Self {
        Self {
            credentials,
            endpoint,
        }
    }

    /// 按当前时间签名
    pub fn sign(&self) -> Result<SignedUrl, StreamError> {
        self.sign_at(Utc::now())
    }

    /// 按指定时间签名，同一时间戳的结果完全一致
    pub fn sign_at(&self, now: DateTime<Utc>) -> Result<SignedUrl, StreamError> {
        if self.credentials.api_key.is_empty() || self.credentials.api_secret.is_empty() {
            return Err(StreamError::config("讯飞星火缺少 api_key 或 api_secret"));
        }

        let host = &self.endpoint.host;
        let path = &self.endpoint.path;
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        let signature_origin = canonical_string(host, &date, path);
        tracing::debug!("讯飞鉴权 - date: {}", date);

        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .map_err(|e| StreamError::config(format!("讯飞签名密钥无效: {e}")))?;
        mac.update(signature_origin.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let authorization_origin = format!(
            "api_key=\"{}\", algorithm=\"hmac-sha256\", headers=\"host date request-line\", signature=\"{}\"",
            self.credentials.api_key, signature
        );
        let authorization = BASE64.encode(authorization_origin.as_bytes());

        let url = format!(
            "{}://{}{}?authorization={}&date={}&host={}",
            self.endpoint.scheme,
            host,
            path,
            urlencoding::encode(&authorization),
            urlencoding::encode(&date),
            host
        );

        Ok(SignedUrl {
            url,
            date,
            valid_until: now + Duration::seconds(SIGNATURE_VALIDITY_SECS),
        })
    }
}

/// 签名原文
pub fn canonical_string(host: &str, date: &str, path: &str) -> String {
    format!("host: {}\ndate: {}\nGET {} HTTP/1.1", host, date, path)
}
