//! Completion service protocol: role-tagged messages plus declared tools in,
//! free text or one structured tool call out.

pub mod openai;
pub mod tools;

use async_trait::async_trait;

use crate::errors::CompletionError;
use crate::session::ChatMessage;

pub use openai::OpenAiClient;
pub use tools::{ToolDefinition, ToolInvocation};

/// One completion request: the full prompt and the tools the model may call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// A tool invocation requested by the model, arguments still as raw JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: String,
}

/// What the model answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    ToolCall {
        call: ToolCall,
        /// Text the model sent alongside the call, if any
        content: Option<String>,
    },
}

/// An LLM completion backend
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError>;
}
