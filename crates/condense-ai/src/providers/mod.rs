//! Provider capabilities consumed by the compaction engine

pub mod catalog;
pub mod openai;

use std::sync::Arc;

use crate::{ChatRequest, ChatResponse, Error, ModelInfo, Result};
use async_trait::async_trait;

/// Source of model metadata
pub trait Provider: Send + Sync {
    /// Metadata for `model`, or `None` if this provider does not know it
    fn model_info(&self, model: &str) -> Result<Option<ModelInfo>>;
}

/// Lookup of providers by name
pub trait ProviderRegistry: Send + Sync {
    /// Get a provider by name
    fn get_provider(&self, name: &str) -> Option<Arc<dyn Provider>>;

    /// All registered providers, in registry order
    fn get_providers(&self) -> Vec<(String, Arc<dyn Provider>)>;
}

/// A non-streaming chat-completion call
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Get an API key from a provided value or environment variable
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| Error::InvalidApiKey)
}
