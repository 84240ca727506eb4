//! Configuration management for nlquery.
//!
//! Configuration is loaded from `~/.config/nlquery/config.toml`.

use crate::llm::{GenerationSettings, Prompt};
use crate::schema::QuerySchema;
use crate::transport::{DEFAULT_QUERY_TIMEOUT, DEFAULT_QUERY_URL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const QUERY_PLACEHOLDER: &str = "{query}";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion endpoint used to translate queries.
    #[serde(default)]
    pub completion: ProviderConfig,
    /// Generation options sent with every completion request.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// The structured query service.
    #[serde(default)]
    pub query_service: QueryServiceConfig,
    /// Schema validation of completion output.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Prompt templates.
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// Completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Ollama local backend.
    Ollama {
        /// Model name (default: llama3).
        #[serde(default = "default_ollama_model")]
        model: String,
        /// Ollama host URL (default: http://localhost:11434).
        #[serde(default = "default_ollama_host")]
        host: String,
    },
    /// Anthropic Claude API.
    Anthropic {
        /// Model name (default: claude-3-5-haiku-latest).
        #[serde(default = "default_anthropic_model")]
        model: String,
        /// API key (prefer ANTHROPIC_API_KEY env var).
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
    },
    /// OpenAI or any compatible chat completions API.
    #[serde(rename = "openai")]
    OpenAI {
        /// Model name (default: gpt-4o-mini).
        #[serde(default = "default_openai_model")]
        model: String,
        /// API key (prefer OPENAI_API_KEY env var).
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Ollama {
            model: default_ollama_model(),
            host: default_ollama_host(),
        }
    }
}

impl ProviderConfig {
    /// Get the model name.
    pub fn model_name(&self) -> &str {
        match self {
            ProviderConfig::Ollama { model, .. } => model,
            ProviderConfig::Anthropic { model, .. } => model,
            ProviderConfig::OpenAI { model, .. } => model,
        }
    }

    /// Replace the model name, keeping the provider.
    pub fn set_model(&mut self, name: String) {
        match self {
            ProviderConfig::Ollama { model, .. } => *model = name,
            ProviderConfig::Anthropic { model, .. } => *model = name,
            ProviderConfig::OpenAI { model, .. } => *model = name,
        }
    }
}

fn default_ollama_model() -> String {
    "llama3".to_string()
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature (default: 0.3).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum output tokens (default: 100).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Round-trip limit for a completion request (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryServiceConfig {
    /// Query endpoint (default: http://localhost:8000/query).
    #[serde(default = "default_query_url")]
    pub url: String,
    /// Round-trip limit for a query (default: 30).
    #[serde(default = "default_query_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for QueryServiceConfig {
    fn default() -> Self {
        Self {
            url: default_query_url(),
            timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl QueryServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_query_url() -> String {
    DEFAULT_QUERY_URL.to_string()
}

fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Reject completion output that does not match the schema.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Instructions placed before the schema in the system message.
    #[serde(default = "default_system_prompt")]
    pub system: String,
    /// User message template; `{query}` is replaced by the user's text.
    #[serde(default = "default_user_prompt")]
    pub user: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: default_system_prompt(),
            user: default_user_prompt(),
        }
    }
}

fn default_system_prompt() -> String {
    r#"You translate questions about employee records into a structured query.
Your ONLY output is a single JSON object that matches the schema below.

Rules:
- Output ONLY the JSON object, no explanations and no markdown
- Use only the properties defined in the schema
- Omit every property the question does not mention
- Use "filters" for exact matches and "ranges" for numeric or date bounds
- Write dates as YYYY-MM-DD"#
        .to_string()
}

fn default_user_prompt() -> String {
    "Convert this question into a JSON query: {query}".to_string()
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("nlquery"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, using defaults if not found.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// System message: instructions followed by the schema.
    pub fn build_system_prompt(&self, schema: &QuerySchema) -> String {
        format!(
            "{}\n\nAvailable schema:\n{}",
            self.prompt.system,
            schema.to_pretty_string()
        )
    }

    /// User message with the query substituted into the template.
    pub fn build_user_prompt(&self, query: &str) -> String {
        if self.prompt.user.contains(QUERY_PLACEHOLDER) {
            self.prompt.user.replacen(QUERY_PLACEHOLDER, query, 1)
        } else {
            format!("{}\n\n{}", self.prompt.user, query)
        }
    }

    pub fn build_prompt(&self, schema: &QuerySchema, query: &str) -> Prompt {
        Prompt {
            system: self.build_system_prompt(schema),
            user: self.build_user_prompt(query),
        }
    }
}
