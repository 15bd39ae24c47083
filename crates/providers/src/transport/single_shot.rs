//! 单次请求传输
//!
//! 后端一次性返回完整回复，作为唯一一个分块投递（回复为空时不投递），然后结束。
//!
//! - OpenAI 兼容：`POST {base_url}/chat/completions`，`stream: false`
//! - Ollama：`POST {base_url}/api/chat`，`stream: false`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chatgate_core::models::openai::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelList,
};
use chatgate_core::{
    ChatPrompt, ProviderConfig, StreamChunk, StreamError, StreamOutcome, StreamTerminal,
};

use super::{build_http_client, deliver, map_reqwest_error, rejection_from_response};
use crate::sink::ChunkSink;

/// 请求格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleShotFlavor {
    OpenAiCompatible,
    Ollama,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f64,
    top_p: f64,
    top_k: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

pub struct SingleShotTransport {
    client: reqwest::Client,
    flavor: SingleShotFlavor,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl SingleShotTransport {
    pub fn from_config(config: &ProviderConfig, flavor: SingleShotFlavor) -> Result<Self, StreamError> {
        let api_key = config
            .api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(Self {
            client: build_http_client(Duration::from_secs(config.timeout_seconds))?,
            flavor,
            base_url: config.effective_base_url(),
            api_key,
            model: config.effective_model(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn flavor(&self) -> SingleShotFlavor {
        self.flavor
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    pub async fn open(&self, prompt: &ChatPrompt, sink: &mut dyn ChunkSink) -> StreamOutcome {
        let reply = match self.flavor {
            SingleShotFlavor::OpenAiCompatible => self.call_openai(prompt).await?,
            SingleShotFlavor::Ollama => self.call_ollama(prompt).await?,
        };

        if !reply.is_empty() {
            deliver(sink, StreamChunk::new(reply)).await?;
        }
        Ok(StreamTerminal)
    }

    async fn call_openai(&self, prompt: &ChatPrompt) -> Result<String, StreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt.rendered())],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            top_p: None,
            stream: false,
        };
        tracing::debug!("[SINGLE] POST {} model={}", url, self.model);

        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        if !response.status().is_success() {
            return Err(rejection_from_response(response).await);
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                map_reqwest_error(e)
            } else {
                StreamError::backend_rejected(format!("解析响应失败: {e}"))
            }
        })?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| StreamError::backend_rejected("API返回空响应"))?;
        Ok(choice.message.map(|m| m.content).unwrap_or_default())
    }

    async fn call_ollama(&self, prompt: &ChatPrompt) -> Result<String, StreamError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![ChatMessage::user(prompt.rendered())],
            stream: false,
            options: OllamaOptions {
                num_predict: self.max_tokens,
                temperature: self.temperature,
                top_p: 0.9,
                top_k: 40,
            },
        };
        tracing::debug!("[SINGLE] POST {} model={}", url, self.model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        if !response.status().is_success() {
            return Err(rejection_from_response(response).await);
        }

        let body: OllamaChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                map_reqwest_error(e)
            } else {
                StreamError::backend_rejected(format!("解析 Ollama 响应失败: {e}"))
            }
        })?;
        Ok(body.message.map(|m| m.content).unwrap_or_default())
    }

    fn models_url(&self) -> String {
        match self.flavor {
            SingleShotFlavor::OpenAiCompatible => format!("{}/models", self.base_url),
            SingleShotFlavor::Ollama => format!("{}/api/tags", self.base_url),
        }
    }

    pub async fn health_check(&self) -> bool {
        match self.authorized(self.client.get(self.models_url())).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!("[SINGLE] 健康检查失败: {}", e);
                false
            }
        }
    }

    pub async fn list_models(&self) -> Vec<String> {
        let fetched: Result<Vec<String>, reqwest::Error> = async {
            let response = self
                .authorized(self.client.get(self.models_url()))
                .send()
                .await?
                .error_for_status()?;
            let ids = match self.flavor {
                SingleShotFlavor::OpenAiCompatible => response
                    .json::<ModelList>()
                    .await?
                    .data
                    .into_iter()
                    .map(|m| m.id)
                    .collect(),
                SingleShotFlavor::Ollama => response
                    .json::<OllamaTags>()
                    .await?
                    .models
                    .into_iter()
                    .map(|m| m.name)
                    .collect(),
            };
            Ok::<_, reqwest::Error>(ids)
        }
        .await;

        match fetched {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => vec![self.model.clone()],
            Err(e) => {
                tracing::warn!("[SINGLE] 获取模型列表失败，使用配置的模型: {}", e);
                vec![self.model.clone()]
            }
        }
    }
}
