//! Provider catalog
//!
//! An ordered set of OpenAI-compatible endpoints with their model metadata,
//! loaded from JSON. The catalog answers both capability questions the
//! engine asks: "what is this model's context window" and "run this
//! completion".

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatCompletion, Provider, ProviderRegistry, get_api_key, openai::OpenAIProvider};
use crate::{ChatRequest, ChatResponse, Error, ModelInfo, Result};

/// On-disk catalog format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFile {
    pub providers: Vec<ProviderSpec>,
}

/// One provider entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub base_url: String,
    /// Environment variable holding the API key; local endpoints usually have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Model used when a request routed here names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelInfo>,
}

/// A catalog entry: model metadata plus a client for its endpoint
pub struct CatalogProvider {
    spec: ProviderSpec,
    client: OpenAIProvider,
}

impl CatalogProvider {
    pub fn new(spec: ProviderSpec) -> Self {
        let api_key = spec
            .api_key_env
            .as_deref()
            .and_then(|var| match get_api_key(None, var) {
                Ok(key) => Some(key),
                Err(_) => {
                    tracing::warn!(provider = %spec.name, "{} is not set, sending requests without a key", var);
                    None
                }
            });
        let client = OpenAIProvider::new(spec.base_url.clone(), api_key);
        Self { spec, client }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

impl Provider for CatalogProvider {
    fn model_info(&self, model: &str) -> Result<Option<ModelInfo>> {
        Ok(self
            .spec
            .models
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(model))
            .map(|(_, info)| *info))
    }
}

/// Ordered collection of providers
#[derive(Default)]
pub struct ProviderCatalog {
    providers: Vec<Arc<CatalogProvider>>,
}

impl ProviderCatalog {
    /// Build a catalog; later duplicates of a name are ignored
    pub fn new(specs: Vec<ProviderSpec>) -> Self {
        let mut providers: Vec<Arc<CatalogProvider>> = Vec::with_capacity(specs.len());
        for spec in specs {
            if providers.iter().any(|p| p.name() == spec.name) {
                tracing::warn!(provider = %spec.name, "Duplicate provider in catalog, ignoring");
                continue;
            }
            providers.push(Arc::new(CatalogProvider::new(spec)));
        }
        Self { providers }
    }

    /// Parse a catalog from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Ok(Self::new(file.providers))
    }

    /// Load a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&content)?;
        tracing::info!(
            "Loaded {} providers from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in catalog order
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Pick the provider for a request: the named one, else the first entry
    fn route(&self, name: Option<&str>) -> Result<&Arc<CatalogProvider>> {
        match name {
            Some(name) => self
                .providers
                .iter()
                .find(|p| p.name() == name)
                .ok_or_else(|| Error::ProviderNotFound(name.to_string())),
            None => self
                .providers
                .first()
                .ok_or_else(|| Error::InvalidConfig("provider catalog is empty".to_string())),
        }
    }
}

impl ProviderRegistry for ProviderCatalog {
    fn get_provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| Arc::clone(p) as Arc<dyn Provider>)
    }

    fn get_providers(&self) -> Vec<(String, Arc<dyn Provider>)> {
        self.providers
            .iter()
            .map(|p| (p.name().to_string(), Arc::clone(p) as Arc<dyn Provider>))
            .collect()
    }
}

#[async_trait]
impl ChatCompletion for ProviderCatalog {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let provider = self.route(request.provider.as_deref())?;

        if request.model.is_some() {
            return provider.client.chat_completion(request).await;
        }

        let model = provider.spec.default_model.clone().ok_or_else(|| {
            Error::ModelNotFound(format!(
                "request names no model and provider {} has no default_model",
                provider.name()
            ))
        })?;
        let routed = ChatRequest {
            model: Some(model),
            ..request.clone()
        };
        provider.client.chat_completion(&routed).await
    }
}
