//! Completion endpoint backends.
//!
//! Each backend sends a system + user prompt pair to a chat-style API and
//! returns the assistant's raw text. Interpreting that text is the
//! normalizer's job.

pub mod anthropic;
pub mod ollama;
pub mod openai;

use crate::config::ProviderConfig;
use crate::error::CompletionError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// System instructions and the user's request.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One chat message as sent on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl Prompt {
    /// System message first, then the user message.
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: Role::System,
                content: self.system.clone(),
            },
            ChatMessage {
                role: Role::User,
                content: self.user.clone(),
            },
        ]
    }
}

/// Generation options shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Anything that can turn a prompt into raw completion text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError>;
}

/// Enum-based backend for LLM providers.
pub enum Backend {
    Ollama(ollama::OllamaBackend),
    Anthropic(anthropic::AnthropicBackend),
    OpenAI(openai::OpenAIBackend),
}

impl Backend {
    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Ollama(_) => "ollama",
            Backend::Anthropic(_) => "anthropic",
            Backend::OpenAI(_) => "openai",
        }
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        match self {
            Backend::Ollama(b) => &b.model,
            Backend::Anthropic(b) => &b.model,
            Backend::OpenAI(b) => &b.model,
        }
    }
}

#[async_trait]
impl CompletionClient for Backend {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        match self {
            Backend::Ollama(b) => b.complete(prompt).await,
            Backend::Anthropic(b) => b.complete(prompt).await,
            Backend::OpenAI(b) => b.complete(prompt).await,
        }
    }
}

/// Create a backend from configuration.
pub fn create_backend(
    provider: &ProviderConfig,
    settings: GenerationSettings,
) -> Result<Backend, CompletionError> {
    let backend = match provider {
        ProviderConfig::Ollama { model, host } => Backend::Ollama(
            ollama::OllamaBackend::new(model.clone(), host.clone(), settings)?,
        ),
        ProviderConfig::Anthropic {
            model,
            api_key,
            base_url,
        } => Backend::Anthropic(anthropic::AnthropicBackend::new(
            model.clone(),
            api_key.clone(),
            base_url.clone(),
            settings,
        )?),
        ProviderConfig::OpenAI {
            model,
            api_key,
            base_url,
        } => Backend::OpenAI(openai::OpenAIBackend::new(
            model.clone(),
            api_key.clone(),
            base_url.clone(),
            settings,
        )?),
    };
    Ok(backend)
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, CompletionError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(CompletionError::Client)
}

/// Classify a failed send.
pub(crate) fn send_error(
    backend: &'static str,
    endpoint: &str,
    timeout: Duration,
    source: reqwest::Error,
) -> CompletionError {
    if source.is_timeout() {
        CompletionError::Timeout {
            backend,
            secs: timeout.as_secs(),
        }
    } else {
        CompletionError::Unreachable {
            backend,
            endpoint: endpoint.to_string(),
            source,
        }
    }
}
