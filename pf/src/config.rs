//! PhaseForge configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Tier;

/// Main PhaseForge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Plan and quotas for the local subscription guard
    pub subscription: SubscriptionConfig,

    /// Heuristic extraction thresholds
    pub synthesis: SynthesisConfig,

    /// Workflow catalog override
    pub catalog: CatalogConfig,

    /// Prompt template override
    pub prompts: PromptsConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the API key variable is set. Call this before any command
    /// that talks to the model so it fails fast with a clear message.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if self.synthesis.min_markers == 0 || self.synthesis.min_sections == 0 {
            return Err(eyre::eyre!("synthesis.min-markers and synthesis.min-sections must be above zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .phaseforge.yml
        let local_config = PathBuf::from(".phaseforge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/phaseforge/phaseforge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("phaseforge").join("phaseforge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (any chat-completions gateway: openai, gateway, openrouter)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .with_context(|| format!("Environment variable {} is not set", self.api_key_env))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 8192,
            timeout_ms: 300_000,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the SQLite store
    #[serde(rename = "store-dir")]
    pub store_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/phaseforge on Linux)
        let store_dir = dirs::data_dir()
            .map(|d| d.join("phaseforge"))
            .unwrap_or_else(|| PathBuf::from(".phaseforge"))
            .to_string_lossy()
            .into_owned();

        Self { store_dir }
    }
}

impl StorageConfig {
    /// Store directory with a leading `~/` expanded
    pub fn store_path(&self) -> PathBuf {
        match self.store_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.store_dir)),
            None => PathBuf::from(&self.store_dir),
        }
    }
}

/// Local subscription plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub tier: Tier,

    /// Messages allowed per run; unset means unlimited
    #[serde(rename = "message-quota")]
    pub message_quota: Option<u32>,

    /// Document generations allowed per run; unset means unlimited
    #[serde(rename = "document-quota")]
    pub document_quota: Option<u32>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            tier: Tier::Pro,
            message_quota: None,
            document_quota: None,
        }
    }
}

/// Heuristic document-extraction thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Minimum characters for a message to count as a finished document
    #[serde(rename = "min-document-chars")]
    pub min_document_chars: usize,

    /// Minimum distinct phase markers
    #[serde(rename = "min-markers")]
    pub min_markers: usize,

    /// Minimum numbered section headers
    #[serde(rename = "min-sections")]
    pub min_sections: usize,

    /// Max tokens for a forced synthesis call
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            min_document_chars: 2000,
            min_markers: 2,
            min_sections: 3,
            max_tokens: 8192,
        }
    }
}

/// Workflow catalog override
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to a workflow YAML replacing the builtin one
    pub path: Option<PathBuf>,
}

/// Prompt template override
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory searched for `<name>.pmt` before the embedded templates
    pub dir: Option<PathBuf>,

    /// Max tokens for a chat reply
    #[serde(rename = "chat-max-tokens")]
    pub chat_max_tokens: u32,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            chat_max_tokens: 4096,
        }
    }
}
