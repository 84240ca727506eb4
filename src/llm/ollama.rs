//! Ollama backend implementation.
//!
//! Uses the local chat API (`/api/chat`) with streaming disabled.

use super::{http_client, send_error, ChatMessage, GenerationSettings, Prompt};
use crate::error::CompletionError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const BACKEND: &str = "ollama";

/// Ollama backend for local LLM inference.
pub struct OllamaBackend {
    pub model: String,
    host: String,
    settings: GenerationSettings,
    client: Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend.
    pub fn new(
        model: String,
        host: String,
        settings: GenerationSettings,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            model,
            host,
            settings,
            client: http_client(settings.timeout)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.host.trim_end_matches('/'))
    }

    /// Send the prompt and return the assistant message content.
    pub async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        let url = self.endpoint();

        let request = OllamaRequest {
            model: self.model.clone(),
            messages: prompt.messages(),
            stream: false,
            options: OllamaOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.max_tokens,
            },
        };

        debug!("Sending chat request to {} ({})", url, self.model);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(BACKEND, &url, self.settings.timeout, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(CompletionError::Status {
                backend: BACKEND,
                status,
                message,
            });
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|source| CompletionError::MalformedResponse {
                backend: BACKEND,
                source,
            })?;

        ollama_response
            .message
            .map(|m| m.content.trim().to_string())
            .ok_or(CompletionError::EmptyResponse(BACKEND))
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}
