//! OpenAI backend implementation.
//!
//! Talks to the chat completions API. Any OpenAI-compatible server works by
//! pointing `base_url` at it.

use super::{http_client, send_error, ChatMessage, GenerationSettings, Prompt};
use crate::error::CompletionError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const BACKEND: &str = "openai";
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// OpenAI backend for GPT API.
pub struct OpenAIBackend {
    pub model: String,
    api_key: Option<String>,
    base_url: String,
    settings: GenerationSettings,
    client: Client,
}

impl OpenAIBackend {
    /// Create a new OpenAI backend.
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        settings: GenerationSettings,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| OPENAI_API_BASE.to_string()),
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

    /// Send the prompt and return the first choice's content.
    pub async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        let api_key = self.get_api_key()?;
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: prompt.messages(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        debug!("Sending chat completion to {} ({})", url, self.model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(BACKEND, &url, self.settings.timeout, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAIError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(CompletionError::Status {
                backend: BACKEND,
                status,
                message,
            });
        }

        let openai_response: OpenAIResponse =
            response
                .json()
                .await
                .map_err(|source| CompletionError::MalformedResponse {
                    backend: BACKEND,
                    source,
                })?;

        openai_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default().trim().to_string())
            .ok_or(CompletionError::EmptyResponse(BACKEND))
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}
