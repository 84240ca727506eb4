//! Anthropic backend implementation.
//!
//! The messages API takes the system prompt as a top-level field, so only the
//! user message goes in `messages`.

use super::{http_client, send_error, ChatMessage, GenerationSettings, Prompt, Role};
use crate::error::CompletionError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const BACKEND: &str = "anthropic";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Anthropic backend for the messages API.
pub struct AnthropicBackend {
    pub model: String,
    api_key: Option<String>,
    base_url: String,
    settings: GenerationSettings,
    client: Client,
}

impl AnthropicBackend {
    /// Create a new Anthropic backend.
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        settings: GenerationSettings,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| ANTHROPIC_API_BASE.to_string()),
            settings,
            client: http_client(settings.timeout)?,
        })
    }

    /// Get the API key from config or environment.
    fn get_api_key(&self) -> Result<String, CompletionError> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .ok_or(CompletionError::MissingApiKey {
                backend: BACKEND,
                env_var: API_KEY_ENV,
            })
    }

    /// Send the prompt and return the concatenated text blocks.
    pub async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        let api_key = self.get_api_key()?;
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.settings.max_tokens,
            system: prompt.system.clone(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: prompt.user.clone(),
            }],
            temperature: self.settings.temperature,
        };

        debug!("Sending messages request to {} ({})", url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(BACKEND, &url, self.settings.timeout, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(CompletionError::Status {
                backend: BACKEND,
                status,
                message,
            });
        }

        let anthropic_response: AnthropicResponse =
            response
                .json()
                .await
                .map_err(|source| CompletionError::MalformedResponse {
                    backend: BACKEND,
                    source,
                })?;

        let text: Vec<String> = anthropic_response
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text)
            .collect();

        if text.is_empty() {
            return Err(CompletionError::EmptyResponse(BACKEND));
        }
        Ok(text.concat().trim().to_string())
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}
