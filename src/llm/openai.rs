//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Completion, CompletionRequest, CompletionService, ToolCall, ToolDefinition};
use crate::config::OpenAiConfig;
use crate::errors::CompletionError;
use crate::session::ChatMessage;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(rename = "type")]
    kind: Option<String>,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Client for `POST {base_url}/chat/completions`
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(http: Client, config: &OpenAiConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: request.messages,
            tools: request.tools,
        };
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending completion request"
        );

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::Empty)?
            .message;

        let function_call = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .find(|call| call.kind.as_deref().map_or(true, |kind| kind == "function"));

        if let Some(call) = function_call {
            return Ok(Completion::ToolCall {
                call: ToolCall {
                    name: call.function.name,
                    arguments: call.function.arguments,
                },
                content: message.content.filter(|text| !text.trim().is_empty()),
            });
        }

        match message.content {
            Some(text) if !text.trim().is_empty() => Ok(Completion::Text(text)),
            _ => Err(CompletionError::Empty),
        }
    }
}
