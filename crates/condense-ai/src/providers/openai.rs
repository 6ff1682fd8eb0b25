//! OpenAI-compatible Chat Completions client

use async_trait::async_trait;
use serde::Serialize;

use super::ChatCompletion;
use crate::{
    error::{Error, Result},
    types::{ChatRequest, ChatResponse, Message},
};

/// Client for any endpoint speaking the OpenAI `/chat/completions` protocol
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAIProvider {
    /// Create a provider for `base_url` (e.g. `https://api.openai.com/v1`)
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&self, request: &'a ChatRequest) -> Result<OpenAIRequest<'a>> {
        let model = request.model.as_deref().ok_or_else(|| {
            Error::InvalidConfig("chat completion request has no model".to_string())
        })?;

        Ok(OpenAIRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            stream: false,
        })
    }
}

#[async_trait]
impl ChatCompletion for OpenAIProvider {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_request(request)?;

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), text));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| Error::UnexpectedResponse(format!("invalid completion body: {}", e)))
    }
}

/// Wire body; the routing-only `provider` field never leaves the process
#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}
