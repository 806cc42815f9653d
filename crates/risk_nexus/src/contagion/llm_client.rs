//! OpenAI-compatible chat-completions client.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::LlmConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmCompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

pub trait LlmCompletionClient {
    fn complete(&self, request: &LlmCompletionRequest)
        -> Result<LlmCompletionResult, LlmClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmCompletionResult {
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiChatCompletionClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiChatCompletionClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmClientError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|err| LlmClientError::BuildClient {
                message: err.to_string(),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmClientError {
    #[error("client build failed: {message}")]
    BuildClient { message: String },
    #[error("http request failed: {message}")]
    Http { message: String },
    #[error("http status {code}: {message}")]
    HttpStatus { code: u16, message: String },
    #[error("decode response failed: {message}")]
    DecodeResponse { message: String },
    #[error("empty completion choice")]
    EmptyChoice,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice; a choice without content reads as empty.
    fn into_output(self) -> Result<String, LlmClientError> {
        let first = self
            .choices
            .into_iter()
            .next()
            .ok_or(LlmClientError::EmptyChoice)?;
        Ok(first.message.content.unwrap_or_default())
    }
}

impl LlmCompletionClient for OpenAiChatCompletionClient {
    fn complete(
        &self,
        request: &LlmCompletionRequest,
    ) -> Result<LlmCompletionResult, LlmClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = ChatCompletionRequest {
            model: request.model.as_str(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system_prompt.as_str(),
                },
                ChatMessage {
                    role: "user",
                    content: request.user_prompt.as_str(),
                },
            ],
        };

        tracing::debug!(model = %request.model, url = %url, "sending completion request");
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|err| LlmClientError::Http {
                message: err.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().unwrap_or_else(|_| "<no body>".to_string());
            return Err(LlmClientError::HttpStatus {
                code: status.as_u16(),
                message,
            });
        }

        let decoded: ChatCompletionResponse =
            response.json().map_err(|err| LlmClientError::DecodeResponse {
                message: err.to_string(),
            })?;
        let output = decoded.into_output()?;
        tracing::debug!(chars = output.len(), "completion received");
        Ok(LlmCompletionResult { output })
    }
}

impl<C: LlmCompletionClient + ?Sized> LlmCompletionClient for Box<C> {
    fn complete(
        &self,
        request: &LlmCompletionRequest,
    ) -> Result<LlmCompletionResult, LlmClientError> {
        (**self).complete(request)
    }
}
