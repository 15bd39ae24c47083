//! 配置错误

use std::path::PathBuf;
use thiserror::Error;

use super::stream_error::StreamError;

/// 配置加载与校验错误，均为启动期致命错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Provider {provider} 缺少配置项: {field}")]
    MissingField {
        provider: &'static str,
        field: &'static str,
    },
    #[error("配置项无效: {0}")]
    Invalid(String),
}

impl From<ConfigError> for StreamError {
    fn from(err: ConfigError) -> Self {
        StreamError::config(err.to_string())
    }
}
