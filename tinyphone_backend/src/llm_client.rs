use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChatError, ChatResult};

/// OpenAI-compatible endpoint settings, edited by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiEndpointConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    /// Every other field the endpoint returned for this model.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Root and completion URL derived from a user-supplied base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrls {
    pub root: String,
    pub chat_url: String,
}

impl EndpointUrls {
    /// Strips whitespace, any trailing `/chat/completions` or `/completions`
    /// (case-insensitive) and trailing slashes, then appends the canonical
    /// completion suffix.
    pub fn from_base_url(base_url: &str) -> Self {
        let compact: String = base_url.chars().filter(|c| !c.is_whitespace()).collect();
        let mut root = compact.trim_end_matches('/').to_string();

        let lower = root.to_ascii_lowercase();
        for suffix in ["/chat/completions", "/completions"] {
            if lower.ends_with(suffix) {
                root.truncate(root.len() - suffix.len());
                break;
            }
        }
        let root = root.trim_end_matches('/').to_string();

        Self {
            chat_url: format!("{}/chat/completions", root),
            root,
        }
    }

    pub fn models_url(&self) -> String {
        format!("{}/models", self.root)
    }
}

/// The network seam used by the reply pipeline.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn send_completion(
        &self,
        config: &AiEndpointConfig,
        messages: &[ChatMessage],
    ) -> ChatResult<String>;

    async fn list_models(&self, config: &AiEndpointConfig) -> ChatResult<Vec<ModelInfo>>;
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    /// Generate a completion using the OpenAI API format
    async fn send_completion(
        &self,
        config: &AiEndpointConfig,
        messages: &[ChatMessage],
    ) -> ChatResult<String> {
        if config.base_url.trim().is_empty()
            || config.api_key.trim().is_empty()
            || config.model.trim().is_empty()
        {
            return Err(ChatError::Configuration(
                "fill in base URL, API key and model in the AI endpoint settings".to_string(),
            ));
        }

        let urls = EndpointUrls::from_base_url(&config.base_url);
        let request = ChatCompletionRequest {
            model: &config.model,
            messages,
        };

        tracing::debug!(
            "Sending completion to {} ({} prompt messages, model {})",
            urls.chat_url,
            messages.len(),
            config.model
        );

        let response = self
            .client
            .post(&urls.chat_url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .json(&request)
            .send()
            .await?;

        // Check for HTTP errors and include response body for debugging
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::warn!("Completion endpoint returned {}: {}", status, body);
            return Err(ChatError::Request { status, body });
        }

        let body: Value = response.json().await?;
        extract_reply(&body).ok_or(ChatError::EmptyReply)
    }

    async fn list_models(&self, config: &AiEndpointConfig) -> ChatResult<Vec<ModelInfo>> {
        if config.base_url.trim().is_empty() || config.api_key.trim().is_empty() {
            return Err(ChatError::Configuration(
                "fill in base URL and API key first".to_string(),
            ));
        }

        let url = EndpointUrls::from_base_url(&config.base_url).models_url();
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            return Err(ChatError::Request { status, body });
        }

        let body: Value = response.json().await?;
        let models = extract_models(&body).ok_or(ChatError::NoModels)?;
        tracing::info!("Endpoint lists {} model(s)", models.len());
        Ok(models)
    }
}

/// Reply text from `choices[0].message.content`, then `message.content`,
/// then `content`; the first non-empty string wins.
pub fn extract_reply(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/choices/0/message/content"),
        body.pointer("/message/content"),
        body.get("content"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Model list from `data`, falling back to `models`. `None` when neither is
/// a non-empty array.
pub fn extract_models(body: &Value) -> Option<Vec<ModelInfo>> {
    let list = body
        .get("data")
        .filter(|v| !v.is_null())
        .or_else(|| body.get("models"))?
        .as_array()?;
    if list.is_empty() {
        return None;
    }

    let models = list
        .iter()
        .map(|item| match item {
            Value::Object(fields) => {
                let id = fields
                    .get("id")
                    .and_then(Value::as_str)
                    .or_else(|| fields.get("name").and_then(Value::as_str))
                    .unwrap_or("unknown-model")
                    .to_string();
                let mut extra = fields.clone();
                extra.remove("id");
                ModelInfo { id, extra }
            }
            Value::String(id) => ModelInfo {
                id: id.clone(),
                extra: serde_json::Map::new(),
            },
            _ => ModelInfo {
                id: "unknown-model".to_string(),
                extra: serde_json::Map::new(),
            },
        })
        .collect();
    Some(models)
}
