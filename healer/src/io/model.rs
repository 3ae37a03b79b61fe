//! Model client abstraction for the AI repair path.
//!
//! The [`ModelClient`] trait decouples the orchestrator from the completion
//! backend. Tests use scripted clients that return canned responses without
//! touching the network.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// One completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub api_key: &'a str,
    pub system: &'a str,
    pub prompt: &'a str,
}

/// Abstraction over completion backends.
pub trait ModelClient {
    /// Return the generated text. Any non-success status or unexpected shape is an error.
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
pub struct ChatCompletionsClient {
    endpoint: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl ChatCompletionsClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            temperature,
            timeout,
        }
    }

    fn payload<'a>(&'a self, request: &CompletionRequest<'a>) -> ChatPayload<'a> {
        ChatPayload {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
        }
    }
}

impl ModelClient for ChatCompletionsClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = request.prompt.len()))]
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .context("build http client")?;

        debug!(endpoint = %self.endpoint, "requesting completion");
        let resp = client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", request.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&self.payload(request))
            .send()
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = resp.status();
        let body = resp.text().context("read completion response")?;
        if status.as_u16() != 200 {
            warn!(status = status.as_u16(), "completion request failed");
            return Err(anyhow!("model API failed ({}): {}", status.as_u16(), body));
        }

        let data: Value = serde_json::from_str(&body).context("parse completion response")?;
        extract_content(&data)
    }
}

/// Pull `choices[0].message.content` out of a chat completion response.
pub fn extract_content(data: &Value) -> Result<String> {
    data.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            let pretty = serde_json::to_string_pretty(data).unwrap_or_default();
            anyhow!("unexpected model response structure:\n{pretty}")
        })
}
