//! Context window resolution for a provider/model pair

use std::sync::Arc;

use condense_ai::{Provider, ProviderRegistry, models};

/// Resolves how many tokens a model accepts.
///
/// Sources are consulted in order: the named provider, every registered
/// provider, then the name heuristics in [`condense_ai::models`]. Provider
/// errors count as "no data" and never reach the caller.
pub struct ContextLimitResolver {
    registry: Arc<dyn ProviderRegistry>,
}

impl ContextLimitResolver {
    pub fn new(registry: Arc<dyn ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Context window for `model`, in tokens; always positive
    pub fn resolve(&self, provider: Option<&str>, model: &str) -> u64 {
        if let Some(limit) = provider
            .filter(|name| !name.is_empty())
            .and_then(|name| self.from_named(name, model))
        {
            return limit;
        }

        if let Some(limit) = self.from_any(model) {
            return limit;
        }

        models::fallback_context_window(model)
    }

    fn from_named(&self, name: &str, model: &str) -> Option<u64> {
        let provider = self.registry.get_provider(name)?;
        context_from(name, provider.as_ref(), model)
    }

    fn from_any(&self, model: &str) -> Option<u64> {
        self.registry
            .get_providers()
            .iter()
            .find_map(|(name, provider)| context_from(name, provider.as_ref(), model))
    }
}

fn context_from(name: &str, provider: &dyn Provider, model: &str) -> Option<u64> {
    match provider.model_info(model) {
        Ok(Some(info)) if info.limit.context > 0 => {
            tracing::debug!(
                provider = name,
                model,
                "Got context limit {}",
                info.limit.context
            );
            Some(info.limit.context)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(provider = name, model, "Error getting context limit: {}", e);
            None
        }
    }
}
