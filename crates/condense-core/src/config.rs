//! Compaction configuration and its JSON persistence

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Default instruction sent to the summarizer
pub const DEFAULT_SUMMARY_PROMPT: &str = "\
Please provide a comprehensive summary of the conversation so far. Preserve:
- All critical context and decisions
- User preferences and constraints
- Technical details and requirements
- Code snippets and configurations
- Conversation flow and key topics

Be thorough but concise. This summary will replace the conversation history.";

/// Shorter instruction for faster models
pub const DEFAULT_SIMPLE_PROMPT: &str = "\
Summarize this conversation concisely. Include: key decisions, requirements, code context, \
and current task. Be brief.";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "CONDENSE_CONFIG_PATH";

/// Configuration for context compaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Whether automatic compaction is enabled
    pub enabled: bool,
    /// Fraction of the context window that arms compaction
    pub threshold: f64,
    /// Summarizer provider; the request's own provider when unset
    pub provider: Option<String>,
    /// Summarizer model; the request's own model when unset
    pub model: Option<String>,
    /// Append a visible note to the summary message
    pub notify_user: bool,
    /// Use `simple_prompt` instead of `summary_prompt`
    pub use_simple_prompt: bool,
    pub summary_prompt: String,
    pub simple_prompt: String,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.8,
            provider: None,
            model: None,
            notify_user: true,
            use_simple_prompt: false,
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
            simple_prompt: DEFAULT_SIMPLE_PROMPT.to_string(),
        }
    }
}

impl CompactionConfig {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("condense")
            .join("config.json")
    }

    /// The instruction the summarizer should receive
    pub fn active_prompt(&self) -> &str {
        if self.use_simple_prompt {
            &self.simple_prompt
        } else {
            &self.summary_prompt
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 || self.threshold > 1.0 {
            return Err(Error::InvalidConfig(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Load config from file, falling back to defaults on any problem
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };

        let parsed = serde_json::from_str::<Self>(&content)
            .map_err(Error::from)
            .and_then(|config| config.validate().map(|()| config));

        match parsed {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save config to file.
    ///
    /// Writes a sibling temp file and renames it over `path`, so readers never
    /// observe a half-written document.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| config_io(dir, e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp = temp_path(path);
        fs::write(&tmp, content).map_err(|e| config_io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(config_io(path, e));
        }

        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }
}

fn config_io(path: &Path, source: std::io::Error) -> Error {
    Error::ConfigIo {
        path: path.to_path_buf(),
        source,
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Partial update to a [`CompactionConfig`].
///
/// Absent fields are left alone. `provider` and `model` distinguish an absent
/// field from an explicit `null`, which clears the override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub provider: Option<Option<String>>,
    #[serde(
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_user: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_simple_prompt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simple_prompt: Option<String>,
}

fn present_or_null<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl ConfigPatch {
    /// Apply the patch on top of `config`
    pub fn apply(&self, config: &mut CompactionConfig) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(ref provider) = self.provider {
            config.provider = provider.clone();
        }
        if let Some(ref model) = self.model {
            config.model = model.clone();
        }
        if let Some(notify_user) = self.notify_user {
            config.notify_user = notify_user;
        }
        if let Some(use_simple_prompt) = self.use_simple_prompt {
            config.use_simple_prompt = use_simple_prompt;
        }
        if let Some(ref prompt) = self.summary_prompt {
            config.summary_prompt = prompt.clone();
        }
        if let Some(ref prompt) = self.simple_prompt {
            config.simple_prompt = prompt.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Live configuration shared by the filters, optionally backed by a file
pub struct ConfigStore {
    current: RwLock<CompactionConfig>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// In-memory store; updates are never persisted
    pub fn new(config: CompactionConfig) -> Self {
        Self {
            current: RwLock::new(config),
            path: None,
        }
    }

    /// Load from `path` (or defaults) and persist updates back to it
    pub fn open(path: PathBuf) -> Self {
        let config = CompactionConfig::load(&path);
        tracing::info!(
            "Context compaction enabled: {}, threshold: {}",
            config.enabled,
            config.threshold
        );
        Self {
            current: RwLock::new(config),
            path: Some(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the current config
    pub fn snapshot(&self) -> CompactionConfig {
        self.current.read().clone()
    }

    /// Validate, persist and publish a patched config.
    ///
    /// The live config only changes once the file write succeeded.
    pub fn update(&self, patch: &ConfigPatch) -> Result<CompactionConfig> {
        let mut current = self.current.write();
        let mut next = current.clone();
        patch.apply(&mut next);
        next.validate()?;

        if let Some(ref path) = self.path {
            next.save(path)?;
        }

        *current = next.clone();
        tracing::info!(
            "Configuration updated: enabled={}, threshold={}",
            next.enabled,
            next.threshold
        );
        Ok(next)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(CompactionConfig::default())
    }
}
