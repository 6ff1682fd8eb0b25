//! Provider catalog location and bootstrap

use std::fs;
use std::path::{Path, PathBuf};

use condense_ai::{ProviderCatalog, ProviderSpec};

/// Environment variable overriding the catalog location
pub const CATALOG_PATH_ENV: &str = "CONDENSE_CATALOG_PATH";

/// Get the config directory
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("condense")
}

/// Get the catalog file path
pub fn catalog_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CATALOG_PATH_ENV) {
        return PathBuf::from(path);
    }
    config_dir().join("providers.json")
}

/// Load the catalog, or a single OpenAI entry when no catalog file exists
pub fn load_catalog(path: &Path) -> anyhow::Result<ProviderCatalog> {
    if !path.exists() {
        tracing::info!(
            "No provider catalog at {}, using the OpenAI API",
            path.display()
        );
        return Ok(ProviderCatalog::new(vec![default_provider()]));
    }

    ProviderCatalog::load(path)
        .map_err(|e| anyhow::anyhow!("Failed to load provider catalog {}: {}", path.display(), e))
}

fn default_provider() -> ProviderSpec {
    ProviderSpec {
        name: "openai".to_string(),
        base_url: "https://api.openai.com/v1".to_string(),
        api_key_env: Some("OPENAI_API_KEY".to_string()),
        default_model: None,
        models: Default::default(),
    }
}

/// Write the example catalog unless a file is already there
pub fn init_catalog(path: &Path, force: bool) -> anyhow::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, example_catalog())?;
    Ok(true)
}

/// Generate example catalog content
pub fn example_catalog() -> &'static str {
    r#"{
  "providers": [
    {
      "name": "openai",
      "base_url": "https://api.openai.com/v1",
      "api_key_env": "OPENAI_API_KEY",
      "default_model": "gpt-4o-mini",
      "models": {
        "gpt-4o": { "limit": { "context": 128000, "output": 16384 } },
        "gpt-4o-mini": { "limit": { "context": 128000, "output": 16384 } }
      }
    },
    {
      "name": "ollama",
      "base_url": "http://localhost:11434/v1",
      "default_model": "llama3.1",
      "models": {
        "llama3.1": { "limit": { "context": 131072, "output": 8192 } }
      }
    }
  ]
}
"#
}
